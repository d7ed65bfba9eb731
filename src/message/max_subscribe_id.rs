use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Grants the peer more subscribe IDs; the value must never decrease.
#[derive(Clone, Debug)]
pub struct MaxSubscribeId {
	pub subscribe_id: u64,
}

impl Decode for MaxSubscribeId {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
		})
	}
}

impl Encode for MaxSubscribeId {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)
	}
}

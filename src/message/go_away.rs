use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Sent to ask the peer to gracefully move to a new session.
#[derive(Clone, Debug)]
pub struct GoAway {
	/// Where to reconnect; empty means the current URI.
	pub uri: String,
}

impl Decode for GoAway {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			uri: String::decode(r)?,
		})
	}
}

impl Encode for GoAway {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.uri.encode(w)
	}
}

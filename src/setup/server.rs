use crate::coding::{Decode, DecodeError, Encode, EncodeError, Params};

use super::Version;

/// Sent by the server in response to [super::Client], selecting a version.
#[derive(Debug, Clone)]
pub struct Server {
	/// The selected version.
	pub version: Version,

	/// Setup parameters, ex. [super::MAX_SUBSCRIBE_ID].
	pub params: Params,
}

impl Server {
	pub const TYPE: u64 = 0x41;
}

impl Decode for Server {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let typ = u64::decode(r)?;
		if typ != Self::TYPE {
			return Err(DecodeError::InvalidMessage(typ));
		}

		let version = Version::decode(r)?;
		let params = Params::decode(r)?;

		Ok(Self { version, params })
	}
}

impl Encode for Server {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		Self::TYPE.encode(w)?;
		self.version.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

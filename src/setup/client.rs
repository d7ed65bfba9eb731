use crate::coding::{Decode, DecodeError, Encode, EncodeError, Params};

use super::Versions;

/// Sent by the client to start the session.
#[derive(Debug, Clone)]
pub struct Client {
	/// The list of supported versions in preferred order.
	pub versions: Versions,

	/// Setup parameters, ex. [super::MAX_SUBSCRIBE_ID].
	pub params: Params,
}

impl Client {
	pub const TYPE: u64 = 0x40;
}

impl Decode for Client {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let typ = u64::decode(r)?;
		if typ != Self::TYPE {
			return Err(DecodeError::InvalidMessage(typ));
		}

		let versions = Versions::decode(r)?;
		let params = Params::decode(r)?;

		Ok(Self { versions, params })
	}
}

impl Encode for Client {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		Self::TYPE.encode(w)?;
		self.versions.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::setup::Version;
	use bytes::BytesMut;

	#[test]
	fn client_coding() {
		let mut params = Params::new();
		params.set(0x2, 100u64).unwrap();

		let client = Client {
			versions: [Version::DRAFT_07].into(),
			params,
		};

		let mut buf = BytesMut::new();
		client.encode(&mut buf).unwrap();
		assert_eq!(
			buf.to_vec(),
			vec![
				0x40, 0x40, // type
				0x01, // version count
				0xc0, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x07, // draft-07
				0x01, // param count
				0x02, 0x02, 0x40, 0x64, // max subscribe id = 100
			]
		);

		let decoded = Client::decode(&mut buf).unwrap();
		assert_eq!(decoded.versions, client.versions);
		assert_eq!(decoded.params.get::<u64>(0x2).unwrap(), Some(100));
	}
}

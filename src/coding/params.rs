use std::collections::HashMap;
use std::io::Cursor;

use super::{Decode, DecodeError, Encode, EncodeError};

/// A list of key-value pairs, used by the setup and request messages.
#[derive(Default, Debug, Clone)]
pub struct Params(pub HashMap<u64, Vec<u8>>);

impl Decode for Params {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let mut params = HashMap::new();

		let count = u64::decode(r)?;
		for _ in 0..count {
			let kind = u64::decode(r)?;
			if params.contains_key(&kind) {
				return Err(DecodeError::DuplicateParameter);
			}

			let value = Vec::<u8>::decode(r)?;
			params.insert(kind, value);
		}

		Ok(Params(params))
	}
}

impl Encode for Params {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.0.len().encode(w)?;

		for (kind, value) in self.0.iter() {
			kind.encode(w)?;
			value.encode(w)?;
		}

		Ok(())
	}
}

impl Params {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set<P: Encode>(&mut self, kind: u64, p: P) -> Result<(), EncodeError> {
		let mut value = Vec::new();
		p.encode(&mut value)?;
		self.0.insert(kind, value);

		Ok(())
	}

	pub fn has(&self, kind: u64) -> bool {
		self.0.contains_key(&kind)
	}

	pub fn get<P: Decode>(&self, kind: u64) -> Result<Option<P>, DecodeError> {
		match self.0.get(&kind) {
			Some(value) => {
				let mut cursor = Cursor::new(value.as_slice());
				Ok(Some(P::decode(&mut cursor)?))
			}
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn roundtrip() {
		let mut params = Params::new();
		params.set(2, 100u64).unwrap();

		let mut buf = BytesMut::new();
		params.encode(&mut buf).unwrap();

		let decoded = Params::decode(&mut buf).unwrap();
		assert_eq!(decoded.get::<u64>(2).unwrap(), Some(100));
		assert_eq!(decoded.get::<u64>(3).unwrap(), None);
	}

	#[test]
	fn duplicate() {
		// count=2, kind=1 len=1 value=7, kind=1 again
		let mut buf = BytesMut::from(&[0x02, 0x01, 0x01, 0x07, 0x01, 0x01, 0x08][..]);
		assert!(matches!(Params::decode(&mut buf), Err(DecodeError::DuplicateParameter)));
	}
}

//! Headers and object records sent on unidirectional streams and datagrams.
mod datagram;
mod fetch;
mod object;
mod subgroup;

pub use datagram::*;
pub use fetch::*;
pub use object::*;
pub use subgroup::*;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// The first varint on every unidirectional stream or datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamType {
	Datagram,
	Subgroup,
	Fetch,
}

impl Decode for StreamType {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		match u64::decode(r)? {
			0x1 => Ok(Self::Datagram),
			0x4 => Ok(Self::Subgroup),
			0x5 => Ok(Self::Fetch),
			t => Err(DecodeError::InvalidStreamType(t)),
		}
	}
}

impl Encode for StreamType {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		let v: u64 = match self {
			Self::Datagram => 0x1,
			Self::Subgroup => 0x4,
			Self::Fetch => 0x5,
		};
		v.encode(w)
	}
}

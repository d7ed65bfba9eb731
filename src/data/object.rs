use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Whether an object carries a payload or marks a gap/boundary in the track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectStatus {
	#[default]
	Normal,
	ObjectNotExist,
	GroupNotExist,
	EndOfGroup,
	EndOfTrackAndGroup,
	EndOfSubgroup,
}

impl ObjectStatus {
	/// Only normal objects carry a payload.
	pub fn has_payload(&self) -> bool {
		matches!(self, Self::Normal)
	}
}

impl Decode for ObjectStatus {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		match u64::decode(r)? {
			0x0 => Ok(Self::Normal),
			0x1 => Ok(Self::ObjectNotExist),
			0x2 => Ok(Self::GroupNotExist),
			0x3 => Ok(Self::EndOfGroup),
			0x4 => Ok(Self::EndOfTrackAndGroup),
			0x5 => Ok(Self::EndOfSubgroup),
			s => Err(DecodeError::InvalidStatus(s)),
		}
	}
}

impl Encode for ObjectStatus {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		let v: u64 = match self {
			Self::Normal => 0x0,
			Self::ObjectNotExist => 0x1,
			Self::GroupNotExist => 0x2,
			Self::EndOfGroup => 0x3,
			Self::EndOfTrackAndGroup => 0x4,
			Self::EndOfSubgroup => 0x5,
		};
		v.encode(w)
	}
}

/// Everything about an object except its payload.
///
/// The track itself is implied by the stream or subscription the object
/// arrives on.
#[derive(Clone, Debug, Default)]
pub struct ObjectHeader {
	pub group: u64,
	pub subgroup: u64,
	pub object_id: u64,
	pub priority: u8,
	pub status: ObjectStatus,

	/// The payload size; required for datagrams.
	pub length: Option<u64>,
}

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

use super::ObjectStatus;

/// The header written at the start of every subgroup stream.
#[derive(Clone, Debug)]
pub struct SubgroupHeader {
	pub track_alias: u64,
	pub group: u64,
	pub subgroup: u64,
	pub publisher_priority: u8,
}

impl Decode for SubgroupHeader {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			track_alias: u64::decode(r)?,
			group: u64::decode(r)?,
			subgroup: u64::decode(r)?,
			publisher_priority: u8::decode(r)?,
		})
	}
}

impl Encode for SubgroupHeader {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.track_alias.encode(w)?;
		self.group.encode(w)?;
		self.subgroup.encode(w)?;
		self.publisher_priority.encode(w)?;

		Ok(())
	}
}

/// One object record within a subgroup stream, excluding the payload.
///
/// The status is only written on the wire when the length is zero.
#[derive(Clone, Debug)]
pub struct SubgroupObject {
	pub object_id: u64,
	pub length: u64,
	pub status: ObjectStatus,
}

impl Decode for SubgroupObject {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let object_id = u64::decode(r)?;
		let length = u64::decode(r)?;
		let status = match length {
			0 => ObjectStatus::decode(r)?,
			_ => ObjectStatus::Normal,
		};

		Ok(Self {
			object_id,
			length,
			status,
		})
	}
}

impl Encode for SubgroupObject {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.object_id.encode(w)?;
		self.length.encode(w)?;
		if self.length == 0 {
			self.status.encode(w)?;
		}

		Ok(())
	}
}

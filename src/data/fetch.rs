use crate::coding::{Decode, DecodeError, Encode, EncodeError};

use super::ObjectStatus;

/// The header written at the start of every fetch response stream.
#[derive(Clone, Debug)]
pub struct FetchHeader {
	pub subscribe_id: u64,
}

impl Decode for FetchHeader {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
		})
	}
}

impl Encode for FetchHeader {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)
	}
}

/// One object record within a fetch stream, excluding the payload.
///
/// Unlike a subgroup, each record carries its full position since a single
/// fetch stream spans groups.
#[derive(Clone, Debug)]
pub struct FetchObject {
	pub group: u64,
	pub subgroup: u64,
	pub object_id: u64,
	pub publisher_priority: u8,
	pub length: u64,
	pub status: ObjectStatus,
}

impl Decode for FetchObject {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let group = u64::decode(r)?;
		let subgroup = u64::decode(r)?;
		let object_id = u64::decode(r)?;
		let publisher_priority = u8::decode(r)?;
		let length = u64::decode(r)?;
		let status = match length {
			0 => ObjectStatus::decode(r)?,
			_ => ObjectStatus::Normal,
		};

		Ok(Self {
			group,
			subgroup,
			object_id,
			publisher_priority,
			length,
			status,
		})
	}
}

impl Encode for FetchObject {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.group.encode(w)?;
		self.subgroup.encode(w)?;
		self.object_id.encode(w)?;
		self.publisher_priority.encode(w)?;
		self.length.encode(w)?;
		if self.length == 0 {
			self.status.encode(w)?;
		}

		Ok(())
	}
}

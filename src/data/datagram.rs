use bytes::{Buf, Bytes};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

use super::{ObjectStatus, StreamType};

/// A complete object delivered as a single datagram.
#[derive(Clone, Debug)]
pub struct Datagram {
	pub track_alias: u64,
	pub group: u64,
	pub object_id: u64,
	pub priority: u8,
	pub status: ObjectStatus,
	pub payload: Bytes,
}

impl Decode for Datagram {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		match StreamType::decode(r)? {
			StreamType::Datagram => {}
			_ => return Err(DecodeError::InvalidValue),
		}

		let track_alias = u64::decode(r)?;
		let group = u64::decode(r)?;
		let object_id = u64::decode(r)?;
		let priority = u8::decode(r)?;
		let status = ObjectStatus::decode(r)?;
		let length = usize::decode(r)?;

		// The declared length must cover the rest of the datagram exactly.
		if r.remaining() != length {
			return Err(DecodeError::ExpectedEnd);
		}

		Ok(Self {
			track_alias,
			group,
			object_id,
			priority,
			status,
			payload: r.copy_to_bytes(length),
		})
	}
}

impl Encode for Datagram {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		StreamType::Datagram.encode(w)?;
		self.track_alias.encode(w)?;
		self.group.encode(w)?;
		self.object_id.encode(w)?;
		self.priority.encode(w)?;
		self.status.encode(w)?;
		self.payload.len().encode(w)?;
		w.put_slice(&self.payload);

		Ok(())
	}
}

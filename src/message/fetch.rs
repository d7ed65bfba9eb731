use crate::coding::{Decode, DecodeError, Encode, EncodeError, Params};

use super::{FullTrackName, GroupOrder, Location};

/// Sent by the subscriber to request a bounded range of past objects.
///
/// Unlike a subscription, the response is delivered over a single stream.
#[derive(Clone, Debug)]
pub struct Fetch {
	pub subscribe_id: u64,
	pub full_track_name: FullTrackName,
	pub subscriber_priority: u8,
	pub group_order: GroupOrder,
	pub start: Location,
	pub end: Location,
	pub params: Params,
}

impl Decode for Fetch {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
			full_track_name: FullTrackName::decode(r)?,
			subscriber_priority: u8::decode(r)?,
			group_order: GroupOrder::decode(r)?,
			start: Location::decode(r)?,
			end: Location::decode(r)?,
			params: Params::decode(r)?,
		})
	}
}

impl Encode for Fetch {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.full_track_name.encode(w)?;
		self.subscriber_priority.encode(w)?;
		self.group_order.encode(w)?;
		self.start.encode(w)?;
		self.end.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

/// Sent by the publisher to accept a fetch.
#[derive(Clone, Debug)]
pub struct FetchOk {
	pub subscribe_id: u64,

	/// The order groups will be delivered in; never [GroupOrder::Default].
	pub group_order: GroupOrder,

	/// Set when the end of the range is also the end of the track.
	pub end_of_track: bool,

	/// The largest position that will be delivered.
	pub largest: Location,

	pub params: Params,
}

impl Decode for FetchOk {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
			group_order: GroupOrder::decode(r)?,
			end_of_track: bool::decode(r)?,
			largest: Location::decode(r)?,
			params: Params::decode(r)?,
		})
	}
}

impl Encode for FetchOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.group_order.encode(w)?;
		self.end_of_track.encode(w)?;
		self.largest.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

/// Sent by the publisher to reject a fetch.
#[derive(Clone, Debug)]
pub struct FetchError {
	pub subscribe_id: u64,
	pub error_code: u64,
	pub reason: String,
}

impl FetchError {
	/// The requested range ends before it starts.
	pub const INVALID_RANGE: u64 = 0x5;
}

impl Decode for FetchError {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
			error_code: u64::decode(r)?,
			reason: String::decode(r)?,
		})
	}
}

impl Encode for FetchError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.error_code.encode(w)?;
		self.reason.encode(w)?;

		Ok(())
	}
}

/// Sent by the subscriber to abandon a fetch before it completes.
#[derive(Clone, Debug)]
pub struct FetchCancel {
	pub subscribe_id: u64,
}

impl Decode for FetchCancel {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
		})
	}
}

impl Encode for FetchCancel {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)
	}
}

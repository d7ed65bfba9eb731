use crate::coding::{Decode, DecodeError, Encode, EncodeError, Params};

use super::{FullTrackName, GroupOrder, Location};

/// Which objects of the track the subscriber wants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
	/// Objects from the start of the current group.
	LatestGroup,

	/// Objects from the current object onward.
	LatestObject,

	/// Objects from the given position onward.
	AbsoluteStart { start: Location },

	/// Objects between the start position and the end of the given group.
	AbsoluteRange { start: Location, end_group: u64 },
}

impl Decode for Filter {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		match u64::decode(r)? {
			0x1 => Ok(Self::LatestGroup),
			0x2 => Ok(Self::LatestObject),
			0x3 => Ok(Self::AbsoluteStart {
				start: Location::decode(r)?,
			}),
			0x4 => Ok(Self::AbsoluteRange {
				start: Location::decode(r)?,
				end_group: u64::decode(r)?,
			}),
			_ => Err(DecodeError::InvalidValue),
		}
	}
}

impl Encode for Filter {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		match self {
			Self::LatestGroup => 0x1u64.encode(w),
			Self::LatestObject => 0x2u64.encode(w),
			Self::AbsoluteStart { start } => {
				0x3u64.encode(w)?;
				start.encode(w)
			}
			Self::AbsoluteRange { start, end_group } => {
				0x4u64.encode(w)?;
				start.encode(w)?;
				end_group.encode(w)
			}
		}
	}
}

/// Sent by the subscriber to request all future objects for the given track.
///
/// Objects will use the track alias instead of the full track name, to save bytes.
#[derive(Clone, Debug)]
pub struct Subscribe {
	pub subscribe_id: u64,
	pub track_alias: u64,
	pub full_track_name: FullTrackName,
	pub subscriber_priority: u8,
	pub group_order: GroupOrder,
	pub filter: Filter,
	pub params: Params,
}

impl Decode for Subscribe {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
			track_alias: u64::decode(r)?,
			full_track_name: FullTrackName::decode(r)?,
			subscriber_priority: u8::decode(r)?,
			group_order: GroupOrder::decode(r)?,
			filter: Filter::decode(r)?,
			params: Params::decode(r)?,
		})
	}
}

impl Encode for Subscribe {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.track_alias.encode(w)?;
		self.full_track_name.encode(w)?;
		self.subscriber_priority.encode(w)?;
		self.group_order.encode(w)?;
		self.filter.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

/// Sent by the subscriber to narrow or reprioritize an active subscription.
#[derive(Clone, Debug)]
pub struct SubscribeUpdate {
	pub subscribe_id: u64,
	pub start: Location,
	pub end_group: u64,
	pub subscriber_priority: u8,
	pub params: Params,
}

impl Decode for SubscribeUpdate {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
			start: Location::decode(r)?,
			end_group: u64::decode(r)?,
			subscriber_priority: u8::decode(r)?,
			params: Params::decode(r)?,
		})
	}
}

impl Encode for SubscribeUpdate {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.start.encode(w)?;
		self.end_group.encode(w)?;
		self.subscriber_priority.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

/// Sent by the subscriber to terminate a subscription.
///
/// The publisher answers with [super::SubscribeDone].
#[derive(Clone, Debug)]
pub struct Unsubscribe {
	pub subscribe_id: u64,
}

impl Decode for Unsubscribe {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
		})
	}
}

impl Encode for Unsubscribe {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::TrackNamespace;
	use bytes::BytesMut;

	#[test]
	fn subscribe_coding() {
		let msg = Subscribe {
			subscribe_id: 7,
			track_alias: 7,
			full_track_name: FullTrackName::new(TrackNamespace::new(["live"]), "cam"),
			subscriber_priority: 128,
			group_order: GroupOrder::OldestFirst,
			filter: Filter::AbsoluteRange {
				start: Location { group: 10, object: 0 },
				end_group: 20,
			},
			params: Params::new(),
		};

		let mut buf = BytesMut::new();
		msg.encode(&mut buf).unwrap();

		let decoded = Subscribe::decode(&mut buf).unwrap();
		assert!(buf.is_empty());
		assert_eq!(decoded.subscribe_id, 7);
		assert_eq!(decoded.full_track_name, msg.full_track_name);
		assert_eq!(decoded.group_order, GroupOrder::OldestFirst);
		assert_eq!(decoded.filter, msg.filter);
	}
}

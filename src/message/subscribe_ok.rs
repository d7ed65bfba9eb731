use crate::coding::{Decode, DecodeError, Encode, EncodeError, Params};

use super::{GroupOrder, Location};

/// Sent by the publisher to accept a subscription.
#[derive(Clone, Debug)]
pub struct SubscribeOk {
	pub subscribe_id: u64,

	/// How long the subscription will remain active, in milliseconds. Zero means forever.
	pub expires: u64,

	/// The order the publisher will deliver groups in.
	pub group_order: GroupOrder,

	/// The largest position in the track, if any objects exist.
	pub largest: Option<Location>,

	pub params: Params,
}

impl Decode for SubscribeOk {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let subscribe_id = u64::decode(r)?;
		let expires = u64::decode(r)?;
		let group_order = GroupOrder::decode(r)?;
		let largest = match bool::decode(r)? {
			true => Some(Location::decode(r)?),
			false => None,
		};
		let params = Params::decode(r)?;

		Ok(Self {
			subscribe_id,
			expires,
			group_order,
			largest,
			params,
		})
	}
}

impl Encode for SubscribeOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.expires.encode(w)?;
		self.group_order.encode(w)?;
		match &self.largest {
			Some(largest) => {
				true.encode(w)?;
				largest.encode(w)?;
			}
			None => false.encode(w)?,
		}
		self.params.encode(w)?;

		Ok(())
	}
}

/// Sent by the publisher to reject a subscription.
#[derive(Clone, Debug)]
pub struct SubscribeError {
	pub subscribe_id: u64,
	pub error_code: u64,
	pub reason: String,

	/// The alias the subscriber proposed, echoed so it can be retired.
	pub track_alias: u64,
}

impl Decode for SubscribeError {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subscribe_id: u64::decode(r)?,
			error_code: u64::decode(r)?,
			reason: String::decode(r)?,
			track_alias: u64::decode(r)?,
		})
	}
}

impl Encode for SubscribeError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.error_code.encode(w)?;
		self.reason.encode(w)?;
		self.track_alias.encode(w)?;

		Ok(())
	}
}

/// Sent by the publisher when a subscription ends, gracefully or not.
#[derive(Clone, Debug)]
pub struct SubscribeDone {
	pub subscribe_id: u64,
	pub status_code: u64,
	pub reason: String,

	/// The final position delivered, if any.
	pub last: Option<Location>,
}

impl SubscribeDone {
	/// Status code used when the session is torn down underneath the subscription.
	pub const SESSION_CLOSED: u64 = 0x6;
}

impl Decode for SubscribeDone {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let subscribe_id = u64::decode(r)?;
		let status_code = u64::decode(r)?;
		let reason = String::decode(r)?;
		let last = match bool::decode(r)? {
			true => Some(Location::decode(r)?),
			false => None,
		};

		Ok(Self {
			subscribe_id,
			status_code,
			reason,
			last,
		})
	}
}

impl Encode for SubscribeDone {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.subscribe_id.encode(w)?;
		self.status_code.encode(w)?;
		self.reason.encode(w)?;
		match &self.last {
			Some(last) => {
				true.encode(w)?;
				last.encode(w)?;
			}
			None => false.encode(w)?,
		}

		Ok(())
	}
}

use crate::coding::{Decode, DecodeError, Encode, EncodeError, Params};

use super::TrackNamespace;

/// Sent by the subscriber to receive announces matching a namespace prefix.
#[derive(Clone, Debug)]
pub struct SubscribeAnnounces {
	pub prefix: TrackNamespace,
	pub params: Params,
}

impl Decode for SubscribeAnnounces {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			prefix: TrackNamespace::decode(r)?,
			params: Params::decode(r)?,
		})
	}
}

impl Encode for SubscribeAnnounces {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.prefix.encode(w)?;
		self.params.encode(w)?;

		Ok(())
	}
}

/// Sent by the publisher to accept an announce subscription.
#[derive(Clone, Debug)]
pub struct SubscribeAnnouncesOk {
	pub prefix: TrackNamespace,
}

impl Decode for SubscribeAnnouncesOk {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			prefix: TrackNamespace::decode(r)?,
		})
	}
}

impl Encode for SubscribeAnnouncesOk {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.prefix.encode(w)
	}
}

/// Sent by the publisher to reject an announce subscription.
#[derive(Clone, Debug)]
pub struct SubscribeAnnouncesError {
	pub prefix: TrackNamespace,
	pub error_code: u64,
	pub reason: String,
}

impl Decode for SubscribeAnnouncesError {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			prefix: TrackNamespace::decode(r)?,
			error_code: u64::decode(r)?,
			reason: String::decode(r)?,
		})
	}
}

impl Encode for SubscribeAnnouncesError {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.prefix.encode(w)?;
		self.error_code.encode(w)?;
		self.reason.encode(w)?;

		Ok(())
	}
}

/// Sent by the subscriber to stop receiving announces for a prefix.
#[derive(Clone, Debug)]
pub struct UnsubscribeAnnounces {
	pub prefix: TrackNamespace,
}

impl Decode for UnsubscribeAnnounces {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			prefix: TrackNamespace::decode(r)?,
		})
	}
}

impl Encode for UnsubscribeAnnounces {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.prefix.encode(w)
	}
}

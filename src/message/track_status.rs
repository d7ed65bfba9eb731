use crate::coding::{Decode, DecodeError, Encode, EncodeError};

use super::{FullTrackName, Location};

/// Sent to query the status of a track without subscribing.
#[derive(Clone, Debug)]
pub struct TrackStatusRequest {
	pub full_track_name: FullTrackName,
}

impl Decode for TrackStatusRequest {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			full_track_name: FullTrackName::decode(r)?,
		})
	}
}

impl Encode for TrackStatusRequest {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.full_track_name.encode(w)
	}
}

/// The response to [TrackStatusRequest].
#[derive(Clone, Debug)]
pub struct TrackStatus {
	pub full_track_name: FullTrackName,
	pub status_code: u64,

	/// The largest position in the track.
	pub last: Location,
}

impl Decode for TrackStatus {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			full_track_name: FullTrackName::decode(r)?,
			status_code: u64::decode(r)?,
			last: Location::decode(r)?,
		})
	}
}

impl Encode for TrackStatus {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.full_track_name.encode(w)?;
		self.status_code.encode(w)?;
		self.last.encode(w)?;

		Ok(())
	}
}

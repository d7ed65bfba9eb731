use std::fmt;
use std::ops::Deref;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// A track namespace: an ordered tuple of path segments.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackNamespace(Vec<String>);

impl TrackNamespace {
	pub fn new<T: ToString>(parts: impl IntoIterator<Item = T>) -> Self {
		Self(parts.into_iter().map(|p| p.to_string()).collect())
	}

	/// Returns true if this namespace starts with the given prefix.
	pub fn has_prefix(&self, prefix: &TrackNamespace) -> bool {
		self.0.len() >= prefix.0.len() && self.0.iter().zip(prefix.0.iter()).all(|(a, b)| a == b)
	}
}

impl Deref for TrackNamespace {
	type Target = [String];

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl fmt::Debug for TrackNamespace {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.join("/"))
	}
}

impl Decode for TrackNamespace {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self(Vec::<String>::decode(r)?))
	}
}

impl Encode for TrackNamespace {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.0.encode(w)
	}
}

/// A fully qualified track: a namespace plus a track name.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FullTrackName {
	pub namespace: TrackNamespace,
	pub name: String,
}

impl FullTrackName {
	pub fn new(namespace: TrackNamespace, name: &str) -> Self {
		Self {
			namespace,
			name: name.to_string(),
		}
	}
}

impl fmt::Debug for FullTrackName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}/{}", self.namespace, self.name)
	}
}

impl Decode for FullTrackName {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let namespace = TrackNamespace::decode(r)?;
		let name = String::decode(r)?;

		Ok(Self { namespace, name })
	}
}

impl Encode for FullTrackName {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.namespace.encode(w)?;
		self.name.encode(w)?;

		Ok(())
	}
}

/// The delivery preference for groups within a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupOrder {
	/// Use the publisher's preference.
	#[default]
	Default,
	OldestFirst,
	NewestFirst,
}

impl Decode for GroupOrder {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		match u8::decode(r)? {
			0x0 => Ok(Self::Default),
			0x1 => Ok(Self::OldestFirst),
			0x2 => Ok(Self::NewestFirst),
			_ => Err(DecodeError::InvalidValue),
		}
	}
}

impl Encode for GroupOrder {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		let v: u8 = match self {
			Self::Default => 0x0,
			Self::OldestFirst => 0x1,
			Self::NewestFirst => 0x2,
		};
		v.encode(w)
	}
}

/// A position within a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
	pub group: u64,
	pub object: u64,
}

impl Decode for Location {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let group = u64::decode(r)?;
		let object = u64::decode(r)?;

		Ok(Self { group, object })
	}
}

impl Encode for Location {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.group.encode(w)?;
		self.object.encode(w)?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefix() {
		let ns = TrackNamespace::new(["live", "events", "cam1"]);
		assert!(ns.has_prefix(&TrackNamespace::new(["live"])));
		assert!(ns.has_prefix(&TrackNamespace::new(["live", "events"])));
		assert!(!ns.has_prefix(&TrackNamespace::new(["vod"])));
		assert!(!ns.has_prefix(&TrackNamespace::new(["live", "events", "cam1", "hd"])));
	}
}

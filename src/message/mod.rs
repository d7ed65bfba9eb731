//! Control messages sent over the bidirectional control stream.
mod announce;
mod fetch;
mod go_away;
mod max_subscribe_id;
mod subscribe;
mod subscribe_announces;
mod subscribe_ok;
mod track;
mod track_status;

pub use announce::*;
pub use fetch::*;
pub use go_away::*;
pub use max_subscribe_id::*;
pub use subscribe::*;
pub use subscribe_announces::*;
pub use subscribe_ok::*;
pub use track::*;
pub use track_status::*;

use std::fmt;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};

// Use a macro to generate the message types rather than copy-paste.
// This implements a decode/encode method that uses the specified type ID.
macro_rules! message_types {
    {$($name:ident = $val:expr,)*} => {
		/// Any control message, prefixed with its varint type on the wire.
		#[derive(Clone)]
		pub enum Message {
			$($name($name)),*
		}

		impl Decode for Message {
			fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
				let t = u64::decode(r)?;

				$(if t == $val {
					return Ok(Self::$name($name::decode(r)?));
				})*

				Err(DecodeError::InvalidMessage(t))
			}
		}

		impl Encode for Message {
			fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
				match self {
					$(Self::$name(m) => {
						($val as u64).encode(w)?;
						m.encode(w)
					},)*
				}
			}
		}

		impl Message {
			pub fn id(&self) -> u64 {
				match self {
					$(Self::$name(_) => $val,)*
				}
			}

			pub fn name(&self) -> &'static str {
				match self {
					$(Self::$name(_) => stringify!($name),)*
				}
			}
		}

		$(impl From<$name> for Message {
			fn from(m: $name) -> Self {
				Message::$name(m)
			}
		})*

		impl fmt::Debug for Message {
			// Delegate to the message formatter
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				match self {
					$(Self::$name(ref m) => m.fmt(f),)*
				}
			}
		}
    }
}

// NOTE: ClientSetup (0x40) and ServerSetup (0x41) are not listed;
// they are only valid before the session is established and live in [crate::setup].
message_types! {
	SubscribeUpdate = 0x2,
	Subscribe = 0x3,
	SubscribeOk = 0x4,
	SubscribeError = 0x5,
	Announce = 0x6,
	AnnounceOk = 0x7,
	AnnounceError = 0x8,
	Unannounce = 0x9,
	Unsubscribe = 0xa,
	SubscribeDone = 0xb,
	AnnounceCancel = 0xc,
	TrackStatusRequest = 0xd,
	TrackStatus = 0xe,
	GoAway = 0x10,
	SubscribeAnnounces = 0x11,
	SubscribeAnnouncesOk = 0x12,
	SubscribeAnnouncesError = 0x13,
	UnsubscribeAnnounces = 0x14,
	MaxSubscribeId = 0x15,
	Fetch = 0x16,
	FetchCancel = 0x17,
	FetchOk = 0x18,
	FetchError = 0x19,
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::BytesMut;

	#[test]
	fn message_roundtrip() {
		let msg: Message = MaxSubscribeId { subscribe_id: 42 }.into();
		assert_eq!(msg.id(), 0x15);
		assert_eq!(msg.name(), "MaxSubscribeId");

		let mut buf = BytesMut::new();
		msg.encode(&mut buf).unwrap();
		assert_eq!(buf.to_vec(), vec![0x15, 0x2a]);

		match Message::decode(&mut buf).unwrap() {
			Message::MaxSubscribeId(m) => assert_eq!(m.subscribe_id, 42),
			other => panic!("wrong message: {:?}", other),
		}
	}

	#[test]
	fn message_unknown() {
		let mut buf = BytesMut::from(&[0x41, 0x00][..]);
		assert!(matches!(
			Message::decode(&mut buf),
			Err(DecodeError::InvalidMessage(0x100))
		));
	}
}

use crate::{coding, setup, transport::TransportError};

/// A fatal session error; tears down every stream and pending request.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SessionError {
	#[error("transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("decode error: {0}")]
	Decode(#[from] coding::DecodeError),

	#[error("encode error: {0}")]
	Encode(#[from] coding::EncodeError),

	#[error("unsupported versions: offered={0:?} supported={1:?}")]
	Version(setup::Versions, setup::Versions),

	/// No server setup arrived within the timeout.
	#[error("setup timed out")]
	SetupTimeout,

	/// The peer misbehaved and the session was closed.
	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),

	/// The peer used a subscribe ID beyond the issued maximum.
	#[error("too many subscribes")]
	TooManySubscribes,

	/// A stream ended mid-payload.
	#[error("payload size mismatch")]
	WrongSize,

	/// The session drained and closed cleanly.
	#[error("drained")]
	Drained,

	/// The session was closed before the operation completed.
	#[error("session closed")]
	Closed,

	#[error("internal error")]
	Internal,
}

impl SessionError {
	/// The 62-bit code used to close the underlying session.
	pub fn code(&self) -> u64 {
		match self {
			Self::Drained => 0x0,
			Self::Decode(_) | Self::Version(..) | Self::ProtocolViolation(_) | Self::WrongSize => 0x2,
			Self::TooManySubscribes => 0x3,
			_ => 0x1,
		}
	}
}

use crate::transport::TransportError;

/// A failure on the publish path.
///
/// These never close the session: [PublishError::Api] and
/// [PublishError::Blocked] are recoverable by the caller, the rest tear down
/// the affected stream only.
#[derive(thiserror::Error, Debug, Clone)]
pub enum PublishError {
	/// The caller violated the stream contract, ex. non-advancing object IDs.
	#[error("api misuse: {0}")]
	Api(&'static str),

	/// Out of stream credit; retry after awaiting credit.
	#[error("blocked: no stream credit")]
	Blocked,

	/// The transport write failed and the stream was reset.
	#[error("write error: {0}")]
	Write(#[from] TransportError),

	/// The stream or request was cancelled.
	#[error("cancelled")]
	Cancelled,
}

/// The error code used when a data stream is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetCode {
	Cancelled,
	InternalError,
	SessionClosed,
}

impl ResetCode {
	pub fn code(&self) -> u64 {
		match self {
			Self::Cancelled => 0x0,
			Self::InternalError => 0x1,
			Self::SessionClosed => 0x2,
		}
	}

	pub fn from_code(code: u64) -> Self {
		match code {
			0x0 => Self::Cancelled,
			0x2 => Self::SessionClosed,
			_ => Self::InternalError,
		}
	}
}

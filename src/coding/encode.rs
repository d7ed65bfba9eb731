use thiserror::Error;

pub trait Encode: Sized {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError>;
}

/// An encode error.
#[derive(Error, Debug, Clone)]
pub enum EncodeError {
	#[error("varint too large")]
	BoundsExceeded,

	#[error("invalid value")]
	InvalidValue,
}

impl Encode for String {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.as_str().encode(w)
	}
}

impl Encode for &str {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.len().encode(w)?;
		w.put(self.as_bytes());
		Ok(())
	}
}

impl Encode for Vec<u8> {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.len().encode(w)?;
		w.put_slice(self);
		Ok(())
	}
}

impl Encode for Vec<String> {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.len().encode(w)?;
		for part in self {
			part.encode(w)?;
		}
		Ok(())
	}
}

impl Encode for Option<u64> {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		self.map(|v| v + 1).unwrap_or(0).encode(w)
	}
}

impl Encode for bool {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
		(*self as u8).encode(w)
	}
}

use std::{cmp, io};

use bytes::{Buf, Bytes, BytesMut};

use crate::coding::{Decode, DecodeError};
use crate::transport::RecvStream;

use super::SessionError;

/// Decodes messages from a stream, buffering as needed.
#[derive(Debug)]
pub(super) struct Reader<R: RecvStream> {
	stream: R,
	buffer: BytesMut,
}

impl<R: RecvStream> Reader<R> {
	pub fn new(stream: R) -> Self {
		Self {
			stream,
			buffer: Default::default(),
		}
	}

	pub async fn decode<T: Decode>(&mut self) -> Result<T, SessionError> {
		loop {
			// Try to decode with the current buffer.
			let mut cursor = io::Cursor::new(&self.buffer[..]);
			let remain = match T::decode(&mut cursor) {
				Ok(msg) => {
					let size = cursor.position() as usize;
					self.buffer.advance(size);
					return Ok(msg);
				}
				Err(DecodeError::More(remain)) => remain, // Try again with more data
				Err(err) => return Err(err.into()),
			};

			// Otherwise read more data and retry.
			if self.stream.read_buf(&mut self.buffer).await?.is_none() {
				return Err(DecodeError::More(remain).into());
			}
		}
	}

	/// Read up to `max` bytes of payload.
	pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, SessionError> {
		while self.buffer.is_empty() {
			match self.stream.read_buf(&mut self.buffer).await? {
				Some(0) => continue,
				Some(_) => break,
				None => return Ok(None),
			}
		}

		let size = cmp::min(max, self.buffer.len());
		Ok(Some(self.buffer.split_to(size).freeze()))
	}

	/// Returns true once the stream has been finished and fully drained.
	pub async fn done(&mut self) -> Result<bool, SessionError> {
		while self.buffer.is_empty() {
			match self.stream.read_buf(&mut self.buffer).await? {
				Some(_) => continue,
				None => return Ok(true),
			}
		}

		Ok(false)
	}

	pub fn stop(&mut self, code: u64) {
		self.stream.stop(code)
	}
}

use bytes::BytesMut;

use crate::coding::Encode;
use crate::transport::SendStream;

use super::SessionError;

/// Encodes messages onto a stream, waiting for write credit in between.
#[derive(Debug)]
pub(super) struct Writer<W: SendStream> {
	stream: W,
	buffer: BytesMut,
}

impl<W: SendStream> Writer<W> {
	pub fn new(stream: W) -> Self {
		Self {
			stream,
			buffer: Default::default(),
		}
	}

	pub async fn encode<T: Encode>(&mut self, msg: &T) -> Result<(), SessionError> {
		self.buffer.clear();
		msg.encode(&mut self.buffer)?;

		self.stream.write(self.buffer.split().freeze(), false)?;
		self.stream.writable().await?;

		Ok(())
	}
}

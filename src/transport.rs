//! The interface the session consumes from a WebTransport-like substrate.
//!
//! The substrate provides bidirectional and unidirectional streams plus
//! datagrams. Writes are buffered by the implementation; [SendStream::writable]
//! applies backpressure. Stream priority is a 64-bit value where smaller
//! values are sent first, see [crate::session::stream_priority].
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

/// A transport-level failure.
#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
	/// The session is gone; no further streams or datagrams.
	#[error("session closed")]
	Closed,

	/// Out of stream credit; retry after [Transport::uni_credit].
	#[error("stream limit reached")]
	Blocked,

	/// The peer reset the stream with the given code.
	#[error("stream reset: code={0}")]
	Reset(u64),

	/// The peer sent a stop-sending with the given code.
	#[error("stream stopped: code={0}")]
	Stopped(u64),
}

#[async_trait]
pub trait Transport: Clone + Send + Sync + 'static {
	type SendStream: SendStream;
	type RecvStream: RecvStream;

	/// Create a bidirectional stream, used once for the control stream.
	async fn open_bi(&self) -> Result<(Self::SendStream, Self::RecvStream), TransportError>;

	/// Accept a bidirectional stream, used once for the control stream.
	async fn accept_bi(&self) -> Result<(Self::SendStream, Self::RecvStream), TransportError>;

	/// Create a unidirectional stream, failing with [TransportError::Blocked]
	/// when out of stream credit.
	fn open_uni(&self) -> Result<Self::SendStream, TransportError>;

	/// Accept a unidirectional stream.
	async fn accept_uni(&self) -> Result<Self::RecvStream, TransportError>;

	/// Resolves once [Transport::open_uni] may succeed again.
	async fn uni_credit(&self) -> Result<(), TransportError>;

	fn send_datagram(&self, payload: Bytes) -> Result<(), TransportError>;
	async fn recv_datagram(&self) -> Result<Bytes, TransportError>;

	/// Close the session with a 62-bit code.
	fn close(&self, code: u64, reason: &str);
}

#[async_trait]
pub trait SendStream: Send + 'static {
	/// Append data to the stream, optionally finishing it.
	///
	/// The data is buffered; use [SendStream::writable] for backpressure.
	/// Fails with [TransportError::Stopped] after a peer stop-sending.
	fn write(&mut self, data: Bytes, fin: bool) -> Result<(), TransportError>;

	/// Resolves while the stream has write credit.
	async fn writable(&mut self) -> Result<(), TransportError>;

	/// Abruptly terminate the stream with an error code.
	fn reset(&mut self, code: u64);

	/// Update the scheduling priority; smaller values are sent first.
	fn set_priority(&mut self, priority: u64);
}

#[async_trait]
pub trait RecvStream: Send + 'static {
	/// Read more data into the buffer, returning the size or None on FIN.
	async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<Option<usize>, TransportError>;

	/// Tell the peer to stop sending with an error code.
	fn stop(&mut self, code: u64);
}

/// An in-memory transport for tests: two connected endpoints with
/// unidirectional/bidirectional streams, datagrams and a uni-stream credit.
#[cfg(test)]
pub(crate) mod mock {
	use std::sync::Arc;

	use tokio::sync::{mpsc, Mutex, Notify};

	use crate::util::Lock;

	use super::*;

	enum Frame {
		Data { data: Bytes, fin: bool },
		Reset(u64),
	}

	#[derive(Default)]
	struct Shared {
		stopped: Option<u64>,
		priority: Option<u64>,
	}

	pub fn stream() -> (MockSend, MockRecv) {
		let (tx, rx) = mpsc::unbounded_channel();
		let shared = Lock::new(Shared::default());

		let send = MockSend {
			frames: tx,
			shared: shared.clone(),
		};
		let recv = MockRecv {
			frames: rx,
			shared,
			fin: false,
		};

		(send, recv)
	}

	pub struct MockSend {
		frames: mpsc::UnboundedSender<Frame>,
		shared: Lock<Shared>,
	}

	#[async_trait]
	impl SendStream for MockSend {
		fn write(&mut self, data: Bytes, fin: bool) -> Result<(), TransportError> {
			if let Some(code) = self.shared.lock().stopped {
				return Err(TransportError::Stopped(code));
			}
			self.frames
				.send(Frame::Data { data, fin })
				.map_err(|_| TransportError::Closed)
		}

		async fn writable(&mut self) -> Result<(), TransportError> {
			match self.shared.lock().stopped {
				Some(code) => Err(TransportError::Stopped(code)),
				None => Ok(()),
			}
		}

		fn reset(&mut self, code: u64) {
			self.frames.send(Frame::Reset(code)).ok();
		}

		fn set_priority(&mut self, priority: u64) {
			self.shared.lock().priority = Some(priority);
		}
	}

	pub struct MockRecv {
		frames: mpsc::UnboundedReceiver<Frame>,
		shared: Lock<Shared>,
		fin: bool,
	}

	impl MockRecv {
		/// The priority the sender assigned, if any.
		pub fn priority(&self) -> Option<u64> {
			self.shared.lock().priority
		}
	}

	#[async_trait]
	impl RecvStream for MockRecv {
		async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<Option<usize>, TransportError> {
			if self.fin {
				return Ok(None);
			}

			match self.frames.recv().await {
				// A dropped sender acts like a clean FIN for simplicity.
				None => Ok(None),
				Some(Frame::Reset(code)) => Err(TransportError::Reset(code)),
				Some(Frame::Data { data, fin }) => {
					self.fin = fin;
					if data.is_empty() {
						return match fin {
							true => Ok(None),
							false => Ok(Some(0)),
						};
					}
					buf.extend_from_slice(&data);
					Ok(Some(data.len()))
				}
			}
		}

		fn stop(&mut self, code: u64) {
			self.shared.lock().stopped = Some(code);
		}
	}

	struct Credit {
		remain: Lock<u64>,
		notify: Notify,
	}

	#[derive(Clone)]
	pub struct MockTransport {
		uni_tx: mpsc::UnboundedSender<MockRecv>,
		bi_tx: mpsc::UnboundedSender<(MockSend, MockRecv)>,
		dg_tx: mpsc::UnboundedSender<Bytes>,

		uni_rx: Arc<Mutex<mpsc::UnboundedReceiver<MockRecv>>>,
		bi_rx: Arc<Mutex<mpsc::UnboundedReceiver<(MockSend, MockRecv)>>>,
		dg_rx: Arc<Mutex<mpsc::UnboundedReceiver<Bytes>>>,

		uni_credit: Arc<Credit>,
		closed: Lock<Option<u64>>,
	}

	pub fn pair() -> (MockTransport, MockTransport) {
		let (uni_a, uni_b) = mpsc::unbounded_channel();
		let (uni_c, uni_d) = mpsc::unbounded_channel();
		let (bi_a, bi_b) = mpsc::unbounded_channel();
		let (bi_c, bi_d) = mpsc::unbounded_channel();
		let (dg_a, dg_b) = mpsc::unbounded_channel();
		let (dg_c, dg_d) = mpsc::unbounded_channel();

		let left = MockTransport {
			uni_tx: uni_a,
			bi_tx: bi_a,
			dg_tx: dg_a,
			uni_rx: Arc::new(Mutex::new(uni_d)),
			bi_rx: Arc::new(Mutex::new(bi_d)),
			dg_rx: Arc::new(Mutex::new(dg_d)),
			uni_credit: Arc::new(Credit {
				remain: Lock::new(1 << 20),
				notify: Notify::new(),
			}),
			closed: Lock::new(None),
		};
		let right = MockTransport {
			uni_tx: uni_c,
			bi_tx: bi_c,
			dg_tx: dg_c,
			uni_rx: Arc::new(Mutex::new(uni_b)),
			bi_rx: Arc::new(Mutex::new(bi_b)),
			dg_rx: Arc::new(Mutex::new(dg_b)),
			uni_credit: Arc::new(Credit {
				remain: Lock::new(1 << 20),
				notify: Notify::new(),
			}),
			closed: Lock::new(None),
		};

		(left, right)
	}

	impl MockTransport {
		pub fn set_uni_credit(&self, credit: u64) {
			*self.uni_credit.remain.lock() = credit;
			self.uni_credit.notify.notify_waiters();
		}

		pub fn close_code(&self) -> Option<u64> {
			*self.closed.lock()
		}
	}

	#[async_trait]
	impl Transport for MockTransport {
		type SendStream = MockSend;
		type RecvStream = MockRecv;

		async fn open_bi(&self) -> Result<(MockSend, MockRecv), TransportError> {
			let (local_send, peer_recv) = stream();
			let (peer_send, local_recv) = stream();

			self.bi_tx
				.send((peer_send, peer_recv))
				.map_err(|_| TransportError::Closed)?;

			Ok((local_send, local_recv))
		}

		async fn accept_bi(&self) -> Result<(MockSend, MockRecv), TransportError> {
			self.bi_rx.lock().await.recv().await.ok_or(TransportError::Closed)
		}

		fn open_uni(&self) -> Result<MockSend, TransportError> {
			if self.closed.lock().is_some() {
				return Err(TransportError::Closed);
			}

			{
				let mut remain = self.uni_credit.remain.lock();
				if *remain == 0 {
					return Err(TransportError::Blocked);
				}
				*remain -= 1;
			}

			let (send, recv) = stream();
			self.uni_tx.send(recv).map_err(|_| TransportError::Closed)?;

			Ok(send)
		}

		async fn accept_uni(&self) -> Result<MockRecv, TransportError> {
			self.uni_rx.lock().await.recv().await.ok_or(TransportError::Closed)
		}

		async fn uni_credit(&self) -> Result<(), TransportError> {
			loop {
				let notify = self.uni_credit.notify.notified();
				tokio::pin!(notify);
				notify.as_mut().enable();

				if *self.uni_credit.remain.lock() > 0 {
					return Ok(());
				}

				notify.await;
			}
		}

		fn send_datagram(&self, payload: Bytes) -> Result<(), TransportError> {
			self.dg_tx.send(payload).map_err(|_| TransportError::Closed)
		}

		async fn recv_datagram(&self) -> Result<Bytes, TransportError> {
			self.dg_rx.lock().await.recv().await.ok_or(TransportError::Closed)
		}

		fn close(&self, code: u64, _reason: &str) {
			let mut closed = self.closed.lock();
			if closed.is_none() {
				*closed = Some(code);
			}
		}
	}
}

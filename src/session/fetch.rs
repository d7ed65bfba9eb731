use crate::error::{PublishError, ResetCode};
use crate::message::GroupOrder;
use crate::transport::{SendStream, Transport, TransportError};
use crate::util::Lock;

use super::{stream_priority, Parent, Publisher, StreamPublisher};

/// Publishes one fetch response over a single stream.
#[derive(Debug)]
pub(super) struct FetchPublisher<T: Transport> {
	state: Lock<State<T>>,
}

impl<T: Transport> Clone for FetchPublisher<T> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
		}
	}
}

#[derive(Debug)]
struct State<T: Transport> {
	// Dropped once the response stream completes.
	session: Option<Publisher<T>>,

	subscribe_id: u64,
	subscriber_priority: u8,
	group_order: GroupOrder,

	stream: Option<StreamPublisher<T>>,
}

impl<T: Transport> FetchPublisher<T> {
	pub fn new(session: Publisher<T>, subscribe_id: u64, subscriber_priority: u8, group_order: GroupOrder) -> Self {
		Self {
			state: Lock::new(State {
				session: Some(session),
				subscribe_id,
				subscriber_priority,
				group_order,
				stream: None,
			}),
		}
	}

	/// Open the response stream; called when the application accepts the fetch.
	pub fn begin_fetch(&self, group_order: GroupOrder) -> Result<StreamPublisher<T>, PublishError> {
		let mut state = self.state.lock();

		let session = state
			.session
			.clone()
			.ok_or(PublishError::Api("publish after fetch_cancel"))?;

		let mut stream = session.transport().open_uni().map_err(|err| match err {
			TransportError::Blocked => PublishError::Blocked,
			err => PublishError::Write(err),
		})?;

		state.group_order = group_order;

		// The fetch priority uses group=0; objects share one stream anyway.
		stream.set_priority(stream_priority(0, 0, state.subscriber_priority, 0, state.group_order));

		log::debug!("new fetch stream: id={}", state.subscribe_id);

		let publisher = StreamPublisher::fetch(Parent::Fetch(self.clone()), stream, state.subscribe_id);
		state.stream = Some(publisher.clone());

		Ok(publisher)
	}

	pub fn on_stream_complete(&self) {
		let (session, subscribe_id) = {
			let mut state = self.state.lock();
			state.stream = None;
			(state.session.take(), state.subscribe_id)
		};

		if let Some(session) = session {
			session.fetch_complete(subscribe_id);
		}
	}

	pub fn reset(&self, code: ResetCode) {
		let stream = self.state.lock().stream.take();

		if let Some(stream) = stream {
			stream.reset(code);
		}
	}
}

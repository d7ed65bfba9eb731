use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::consumers::FetchConsumer;
use crate::error::ResetCode;
use crate::message::{self, Message, TrackNamespace};
use crate::transport::Transport;
use crate::util::{Lock, Queue};

use super::{ControlMessage, FetchPublisher, SessionError, TrackPublisher};

/// The publish half of the session: answers the peer's subscribe and fetch
/// requests, and owns the subscribe-ID credit we issue.
#[derive(Debug)]
pub struct Publisher<T: Transport> {
	transport: T,
	outgoing: Queue<Message, SessionError>,
	control: Queue<ControlMessage, SessionError>,
	state: Lock<State<T>>,
}

impl<T: Transport> Clone for Publisher<T> {
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			outgoing: self.outgoing.clone(),
			control: self.control.clone(),
			state: self.state.clone(),
		}
	}
}

#[derive(Debug)]
pub(super) enum PubTrack<T: Transport> {
	Track(TrackPublisher<T>),
	Fetch(FetchPublisher<T>),
}

impl<T: Transport> Clone for PubTrack<T> {
	fn clone(&self) -> Self {
		match self {
			Self::Track(track) => Self::Track(track.clone()),
			Self::Fetch(fetch) => Self::Fetch(fetch.clone()),
		}
	}
}

impl<T: Transport> PubTrack<T> {
	fn reset(&self, code: ResetCode) {
		match self {
			Self::Track(track) => track.reset(code),
			Self::Fetch(fetch) => fetch.reset(code),
		}
	}
}

#[derive(Debug)]
struct State<T: Transport> {
	pub_tracks: HashMap<u64, PubTrack<T>>,
	pending_announces: HashMap<TrackNamespace, oneshot::Sender<Result<message::AnnounceOk, message::AnnounceError>>>,

	// The subscribe-ID window we issue to the peer.
	max_subscribe_id: u64,
	max_concurrent: u64,
	closed_subscribes: u64,
}

impl<T: Transport> Publisher<T> {
	pub(super) fn new(
		transport: T,
		outgoing: Queue<Message, SessionError>,
		control: Queue<ControlMessage, SessionError>,
		max_subscribes: u64,
	) -> Self {
		Self {
			transport,
			outgoing,
			control,
			state: Lock::new(State {
				pub_tracks: HashMap::new(),
				pending_announces: HashMap::new(),
				max_subscribe_id: max_subscribes,
				max_concurrent: max_subscribes,
				closed_subscribes: 0,
			}),
		}
	}

	pub(super) fn transport(&self) -> &T {
		&self.transport
	}

	fn send_message<M: Into<Message>>(&self, msg: M) -> Result<(), SessionError> {
		let msg = msg.into();
		log::debug!("sending message: {:?}", msg);
		self.outgoing.push(msg)
	}

	// Every incoming request ID must be below the window we issued.
	fn validate_subscribe_id(&self, subscribe_id: u64) -> Result<(), SessionError> {
		if subscribe_id >= self.state.lock().max_subscribe_id {
			log::warn!("subscribe id out of range: id={}", subscribe_id);
			return Err(SessionError::TooManySubscribes);
		}
		Ok(())
	}

	// Slide the window forward once enough requests have retired.
	fn retire_subscribe_id(&self) {
		let grant = {
			let mut state = self.state.lock();
			state.closed_subscribes += 1;

			if state.closed_subscribes >= state.max_concurrent / 2 {
				state.max_subscribe_id += state.closed_subscribes;
				state.closed_subscribes = 0;
				Some(state.max_subscribe_id)
			} else {
				None
			}
		};

		if let Some(max) = grant {
			log::debug!("issuing new max subscribe id: {}", max);
			self.send_message(message::MaxSubscribeId { subscribe_id: max }).ok();
		}
	}

	pub(super) fn recv_subscribe(&self, msg: message::Subscribe) -> Result<(), SessionError> {
		self.validate_subscribe_id(msg.subscribe_id)?;

		{
			let mut state = self.state.lock();
			if state.pub_tracks.contains_key(&msg.subscribe_id) {
				drop(state);
				log::warn!("duplicate subscribe id: {}", msg.subscribe_id);
				return self.send_message(message::SubscribeError {
					subscribe_id: msg.subscribe_id,
					error_code: 400,
					reason: "duplicate subscribe id".to_string(),
					track_alias: msg.track_alias,
				});
			}

			let track = TrackPublisher::new(
				self.clone(),
				msg.subscribe_id,
				msg.track_alias,
				msg.subscriber_priority,
				msg.group_order,
			);
			state.pub_tracks.insert(msg.subscribe_id, PubTrack::Track(track));
		}

		self.control.push(ControlMessage::Subscribe(msg))
	}

	pub(super) fn recv_subscribe_update(&self, msg: message::SubscribeUpdate) -> Result<(), SessionError> {
		self.validate_subscribe_id(msg.subscribe_id)?;

		let track = self.state.lock().pub_tracks.get(&msg.subscribe_id).cloned();
		match track {
			Some(PubTrack::Track(track)) => track.set_subscriber_priority(msg.subscriber_priority),
			_ => {
				log::warn!("subscribe update for unknown id: {}", msg.subscribe_id);
				return Ok(());
			}
		}

		self.control.push(ControlMessage::SubscribeUpdate(msg))
	}

	pub(super) fn recv_unsubscribe(&self, msg: message::Unsubscribe) -> Result<(), SessionError> {
		// The application answers with subscribe_done on its publisher.
		self.control.push(ControlMessage::Unsubscribe(msg))
	}

	pub(super) fn recv_fetch(&self, msg: message::Fetch) -> Result<(), SessionError> {
		self.validate_subscribe_id(msg.subscribe_id)?;

		if msg.end < msg.start {
			log::warn!("fetch with an invalid range: id={}", msg.subscribe_id);
			return self.send_message(message::FetchError {
				subscribe_id: msg.subscribe_id,
				error_code: message::FetchError::INVALID_RANGE,
				reason: "end must be after start".to_string(),
			});
		}

		{
			let mut state = self.state.lock();
			if state.pub_tracks.contains_key(&msg.subscribe_id) {
				drop(state);
				log::warn!("duplicate subscribe id: {}", msg.subscribe_id);
				return self.send_message(message::FetchError {
					subscribe_id: msg.subscribe_id,
					error_code: 400,
					reason: "duplicate subscribe id".to_string(),
				});
			}

			let fetch = FetchPublisher::new(
				self.clone(),
				msg.subscribe_id,
				msg.subscriber_priority,
				msg.group_order,
			);
			state.pub_tracks.insert(msg.subscribe_id, PubTrack::Fetch(fetch));
		}

		self.control.push(ControlMessage::Fetch(msg))
	}

	pub(super) fn recv_fetch_cancel(&self, msg: message::FetchCancel) -> Result<(), SessionError> {
		let track = self.state.lock().pub_tracks.get(&msg.subscribe_id).cloned();

		match track {
			// The fetch already completed, or never existed; a no-op is fine.
			None => log::debug!("fetch cancel for unknown id: {}", msg.subscribe_id),
			// The ID belongs to a subscription; only an unsubscribe may end it.
			Some(PubTrack::Track(_)) => {
				log::warn!("fetch cancel for a subscribe id: {}", msg.subscribe_id)
			}
			Some(PubTrack::Fetch(fetch)) => {
				// Resetting an open response stream retires the ID itself.
				fetch.reset(ResetCode::Cancelled);

				if self.state.lock().pub_tracks.remove(&msg.subscribe_id).is_some() {
					self.retire_subscribe_id();
				}
			}
		}

		Ok(())
	}

	/// Accept a subscription, returning the publisher for its track.
	pub fn subscribe_ok(&mut self, msg: message::SubscribeOk) -> Result<TrackPublisher<T>, SessionError> {
		let track = self.state.lock().pub_tracks.get(&msg.subscribe_id).cloned();

		let track = match track {
			Some(PubTrack::Track(track)) => track,
			Some(PubTrack::Fetch(_)) => {
				log::warn!("subscribe id maps to a fetch: {}", msg.subscribe_id);
				self.send_message(message::SubscribeError {
					subscribe_id: msg.subscribe_id,
					error_code: 500,
					reason: "subscribe id maps to a fetch".to_string(),
					track_alias: 0,
				})?;
				return Err(SessionError::Internal);
			}
			None => {
				log::warn!("subscribe ok for unknown id: {}", msg.subscribe_id);
				return Err(SessionError::Internal);
			}
		};

		track.set_group_order(msg.group_order);
		self.send_message(msg)?;

		Ok(track)
	}

	/// Reject a subscription.
	pub fn subscribe_error(&mut self, msg: message::SubscribeError) -> Result<(), SessionError> {
		if self.state.lock().pub_tracks.remove(&msg.subscribe_id).is_none() {
			log::warn!("subscribe error for unknown id: {}", msg.subscribe_id);
			return Ok(());
		}

		self.send_message(msg)?;
		self.retire_subscribe_id();

		Ok(())
	}

	/// Accept a fetch, returning the consumer for its response stream.
	pub fn fetch_ok(&mut self, msg: message::FetchOk) -> Result<Box<dyn FetchConsumer>, SessionError> {
		let fetch = self.state.lock().pub_tracks.get(&msg.subscribe_id).cloned();

		let fetch = match fetch {
			Some(PubTrack::Fetch(fetch)) => fetch,
			Some(PubTrack::Track(_)) => {
				log::warn!("subscribe id maps to a subscribe: {}", msg.subscribe_id);
				self.fetch_error(message::FetchError {
					subscribe_id: msg.subscribe_id,
					error_code: 500,
					reason: "subscribe id maps to a subscribe".to_string(),
				})?;
				return Err(SessionError::Internal);
			}
			None => {
				log::warn!("fetch ok for unknown id: {}", msg.subscribe_id);
				return Err(SessionError::Internal);
			}
		};

		let stream = match fetch.begin_fetch(msg.group_order) {
			Ok(stream) => stream,
			Err(err) => {
				log::warn!("begin fetch failed: id={} err={}", msg.subscribe_id, err);
				self.fetch_error(message::FetchError {
					subscribe_id: msg.subscribe_id,
					error_code: 500,
					reason: "failed to open the response stream".to_string(),
				})?;
				return Err(SessionError::Internal);
			}
		};

		self.send_message(msg)?;

		Ok(Box::new(stream))
	}

	/// Reject a fetch.
	pub fn fetch_error(&mut self, msg: message::FetchError) -> Result<(), SessionError> {
		let removed = self.state.lock().pub_tracks.remove(&msg.subscribe_id).is_some();

		self.send_message(msg)?;

		if removed {
			self.retire_subscribe_id();
		}

		Ok(())
	}

	// Called by TrackPublisher::subscribe_done with the ID filled in.
	pub(super) fn send_subscribe_done(&self, msg: message::SubscribeDone) -> Result<(), SessionError> {
		if self.state.lock().pub_tracks.remove(&msg.subscribe_id).is_none() {
			log::warn!("subscribe done for unknown id: {}", msg.subscribe_id);
			return Ok(());
		}

		self.send_message(msg)?;
		self.retire_subscribe_id();

		Ok(())
	}

	// Called once a fetch response stream finishes or is reset.
	pub(super) fn fetch_complete(&self, subscribe_id: u64) {
		if self.state.lock().pub_tracks.remove(&subscribe_id).is_some() {
			self.retire_subscribe_id();
		}
	}

	/// Offer a namespace, waiting for the peer's verdict.
	pub async fn announce(&mut self, msg: message::Announce) -> Result<message::AnnounceOk, message::AnnounceError> {
		let namespace = msg.namespace.clone();

		let rx = {
			let mut state = self.state.lock();
			if state.pending_announces.contains_key(&namespace) {
				return Err(message::AnnounceError {
					namespace,
					error_code: 400,
					reason: "duplicate announce".to_string(),
				});
			}

			let (tx, rx) = oneshot::channel();
			state.pending_announces.insert(namespace.clone(), tx);
			rx
		};

		if self.send_message(msg).is_err() {
			self.state.lock().pending_announces.remove(&namespace);
			return Err(message::AnnounceError {
				namespace,
				error_code: 500,
				reason: "local write failed".to_string(),
			});
		}

		match rx.await {
			Ok(res) => res,
			Err(_) => Err(message::AnnounceError {
				namespace,
				error_code: 500,
				reason: "session closed".to_string(),
			}),
		}
	}

	/// Withdraw a namespace.
	pub fn unannounce(&mut self, msg: message::Unannounce) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	pub(super) fn recv_announce_ok(&self, msg: message::AnnounceOk) {
		match self.state.lock().pending_announces.remove(&msg.namespace) {
			Some(tx) => {
				tx.send(Ok(msg)).ok();
			}
			None => log::warn!("unmatched announce ok: namespace={:?}", msg.namespace),
		}
	}

	pub(super) fn recv_announce_error(&self, msg: message::AnnounceError) {
		match self.state.lock().pending_announces.remove(&msg.namespace) {
			Some(tx) => {
				tx.send(Err(msg)).ok();
			}
			None => log::warn!("unmatched announce error: namespace={:?}", msg.namespace),
		}
	}

	/// Accept a peer's announce subscription.
	pub fn subscribe_announces_ok(&mut self, msg: message::SubscribeAnnouncesOk) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Reject a peer's announce subscription.
	pub fn subscribe_announces_error(&mut self, msg: message::SubscribeAnnouncesError) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Answer a track status request.
	pub fn track_status(&mut self, msg: message::TrackStatus) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Ask the peer to move to a new session.
	pub fn goaway(&mut self, uri: &str) -> Result<(), SessionError> {
		self.send_message(message::GoAway { uri: uri.to_string() })
	}

	pub(super) fn shutdown(&self, err: SessionError) {
		log::debug!("closing publisher: {}", err);

		let (tracks, announces) = {
			let mut state = self.state.lock();
			let tracks: Vec<_> = state.pub_tracks.drain().map(|(_, track)| track).collect();
			let announces: Vec<_> = state.pending_announces.drain().collect();
			(tracks, announces)
		};

		for track in tracks {
			track.reset(ResetCode::SessionClosed);
		}

		for (namespace, tx) in announces {
			tx.send(Err(message::AnnounceError {
				namespace,
				error_code: 500,
				reason: "session closed".to_string(),
			}))
			.ok();
		}
	}
}

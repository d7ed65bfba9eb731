use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::coding::Decode;
use crate::consumers::{FetchConsumer, TrackConsumer};
use crate::data::{self, ObjectHeader};
use crate::message::{self, Message, TrackNamespace};
use crate::transport::Transport;
use crate::util::{Lock, Queue};

use super::{FetchRecv, SessionError, SubscribeRecv};

/// The consume half of the session: issues subscribe/fetch requests and
/// routes incoming objects to the application callbacks.
#[derive(Debug)]
pub struct Subscriber<T: Transport> {
	outgoing: Queue<Message, SessionError>,
	state: Lock<State>,

	_transport: std::marker::PhantomData<T>,
}

impl<T: Transport> Clone for Subscriber<T> {
	fn clone(&self) -> Self {
		Self {
			outgoing: self.outgoing.clone(),
			state: self.state.clone(),
			_transport: std::marker::PhantomData,
		}
	}
}

#[derive(Debug)]
struct State {
	// Active subscriptions, by track alias.
	sub_tracks: HashMap<u64, Lock<SubscribeRecv>>,
	sub_id_to_alias: HashMap<u64, u64>,

	// Active fetches, by subscribe ID.
	fetches: HashMap<u64, Lock<FetchRecv>>,

	pending_subscribe_announces:
		HashMap<TrackNamespace, oneshot::Sender<Result<message::SubscribeAnnouncesOk, message::SubscribeAnnouncesError>>>,

	next_subscribe_id: u64,
	peer_max_subscribe_id: u64,
	draining: bool,
}

impl<T: Transport> Subscriber<T> {
	pub(super) fn new(outgoing: Queue<Message, SessionError>, peer_max_subscribe_id: u64) -> Self {
		Self {
			outgoing,
			state: Lock::new(State {
				sub_tracks: HashMap::new(),
				sub_id_to_alias: HashMap::new(),
				fetches: HashMap::new(),
				pending_subscribe_announces: HashMap::new(),
				next_subscribe_id: 0,
				peer_max_subscribe_id,
				draining: false,
			}),
			_transport: std::marker::PhantomData,
		}
	}

	fn send_message<M: Into<Message>>(&self, msg: M) -> Result<(), SessionError> {
		let msg = msg.into();
		log::debug!("sending message: {:?}", msg);
		self.outgoing.push(msg)
	}

	/// Subscribe to a track, delivering its objects to the callback.
	///
	/// The subscribe ID and track alias are allocated here; any values in the
	/// request are overwritten.
	pub async fn subscribe(
		&mut self,
		mut msg: message::Subscribe,
		callback: Box<dyn TrackConsumer>,
	) -> Result<message::SubscribeOk, message::SubscribeError> {
		let rx = {
			let mut state = self.state.lock();

			let subscribe_id = state.next_subscribe_id;
			state.next_subscribe_id += 1;

			if subscribe_id >= state.peer_max_subscribe_id {
				// The peer will reject this, but it gets to say so.
				log::warn!(
					"issuing a subscribe beyond the peer's limit: id={} max={}",
					subscribe_id,
					state.peer_max_subscribe_id
				);
			}

			msg.subscribe_id = subscribe_id;
			msg.track_alias = subscribe_id;

			let (recv, rx) = SubscribeRecv::new(msg.full_track_name.clone(), subscribe_id, callback);
			state.sub_id_to_alias.insert(subscribe_id, msg.track_alias);
			state.sub_tracks.insert(msg.track_alias, Lock::new(recv));
			rx
		};

		let (subscribe_id, track_alias) = (msg.subscribe_id, msg.track_alias);

		if self.send_message(msg).is_err() {
			let mut state = self.state.lock();
			state.sub_id_to_alias.remove(&subscribe_id);
			state.sub_tracks.remove(&track_alias);

			return Err(message::SubscribeError {
				subscribe_id,
				error_code: 500,
				reason: "local write failed".to_string(),
				track_alias,
			});
		}

		match rx.await {
			Ok(res) => res,
			Err(_) => Err(message::SubscribeError {
				subscribe_id,
				error_code: 500,
				reason: "session closed".to_string(),
				track_alias,
			}),
		}
	}

	/// Stop a subscription; the entry is evicted once the peer's
	/// SubscribeDone arrives.
	pub fn unsubscribe(&mut self, subscribe_id: u64) -> Result<(), SessionError> {
		let track = {
			let state = self.state.lock();
			state
				.sub_id_to_alias
				.get(&subscribe_id)
				.and_then(|alias| state.sub_tracks.get(alias))
				.cloned()
		};

		let track = match track {
			Some(track) => track,
			None => {
				log::warn!("unsubscribe for unknown id: {}", subscribe_id);
				return Ok(());
			}
		};

		// No more callbacks after unsubscribe; objects in flight are drained.
		let mut track = track.lock();
		log::debug!("unsubscribing from track: {:?}", track.full_track_name());
		track.cancel();
		drop(track);

		self.send_message(message::Unsubscribe { subscribe_id })
	}

	pub fn subscribe_update(&mut self, msg: message::SubscribeUpdate) -> Result<(), SessionError> {
		if !self.state.lock().sub_id_to_alias.contains_key(&msg.subscribe_id) {
			log::warn!("subscribe update for unknown id: {}", msg.subscribe_id);
			return Ok(());
		}

		self.send_message(msg)
	}

	/// Fetch a range of a track, delivering its objects to the callback.
	///
	/// The future resolves once the peer accepts or rejects the fetch; the
	/// data keeps flowing to the callback afterwards.
	pub async fn fetch(
		&mut self,
		mut msg: message::Fetch,
		callback: Box<dyn FetchConsumer>,
	) -> Result<message::FetchOk, message::FetchError> {
		let rx = {
			let mut state = self.state.lock();

			let subscribe_id = state.next_subscribe_id;
			state.next_subscribe_id += 1;

			if subscribe_id >= state.peer_max_subscribe_id {
				log::warn!(
					"issuing a fetch beyond the peer's limit: id={} max={}",
					subscribe_id,
					state.peer_max_subscribe_id
				);
			}

			msg.subscribe_id = subscribe_id;

			let (recv, rx) = FetchRecv::new(msg.full_track_name.clone(), subscribe_id, callback);
			state.fetches.insert(subscribe_id, Lock::new(recv));
			rx
		};

		let subscribe_id = msg.subscribe_id;

		if self.send_message(msg).is_err() {
			self.state.lock().fetches.remove(&subscribe_id);

			return Err(message::FetchError {
				subscribe_id,
				error_code: 500,
				reason: "local write failed".to_string(),
			});
		}

		match rx.await {
			Ok(res) => res,
			Err(_) => Err(message::FetchError {
				subscribe_id,
				error_code: 500,
				reason: "session closed".to_string(),
			}),
		}
	}

	/// Abandon a fetch before its data completes.
	pub fn fetch_cancel(&mut self, subscribe_id: u64) -> Result<(), SessionError> {
		let fetch = self.state.lock().fetches.get(&subscribe_id).cloned();

		let fetch = match fetch {
			Some(fetch) => fetch,
			None => {
				log::warn!("fetch cancel for unknown id: {}", subscribe_id);
				return Ok(());
			}
		};

		let mut fetch = fetch.lock();
		log::debug!("cancelling fetch: {:?}", fetch.full_track_name());
		fetch.cancel();
		drop(fetch);

		self.fetch_stream_done(subscribe_id);

		self.send_message(message::FetchCancel { subscribe_id })
	}

	/// Receive announces matching a namespace prefix, via the control channel.
	pub async fn subscribe_announces(
		&mut self,
		msg: message::SubscribeAnnounces,
	) -> Result<message::SubscribeAnnouncesOk, message::SubscribeAnnouncesError> {
		let prefix = msg.prefix.clone();

		let rx = {
			let mut state = self.state.lock();
			if state.pending_subscribe_announces.contains_key(&prefix) {
				return Err(message::SubscribeAnnouncesError {
					prefix,
					error_code: 400,
					reason: "duplicate prefix".to_string(),
				});
			}

			let (tx, rx) = oneshot::channel();
			state.pending_subscribe_announces.insert(prefix.clone(), tx);
			rx
		};

		if self.send_message(msg).is_err() {
			self.state.lock().pending_subscribe_announces.remove(&prefix);
			return Err(message::SubscribeAnnouncesError {
				prefix,
				error_code: 500,
				reason: "local write failed".to_string(),
			});
		}

		match rx.await {
			Ok(res) => res,
			Err(_) => Err(message::SubscribeAnnouncesError {
				prefix,
				error_code: 500,
				reason: "session closed".to_string(),
			}),
		}
	}

	pub fn unsubscribe_announces(&mut self, prefix: TrackNamespace) -> Result<(), SessionError> {
		self.send_message(message::UnsubscribeAnnounces { prefix })
	}

	/// Accept a peer's announce.
	pub fn announce_ok(&mut self, msg: message::AnnounceOk) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Reject a peer's announce.
	pub fn announce_error(&mut self, msg: message::AnnounceError) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Revoke a previously accepted announce.
	pub fn announce_cancel(&mut self, msg: message::AnnounceCancel) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Query a track's status; the answer arrives on the control channel.
	pub fn track_status_request(&mut self, msg: message::TrackStatusRequest) -> Result<(), SessionError> {
		self.send_message(msg)
	}

	/// Close the session immediately; pending work fails with `session closed`.
	pub fn close(&mut self) {
		self.outgoing.close(SessionError::Closed).ok();
	}

	/// Stop once all subscriptions and fetches have finished.
	pub fn drain(&mut self) {
		log::debug!("draining session");
		self.state.lock().draining = true;
		self.check_drain();
	}

	fn check_drain(&self) {
		let done = {
			let state = self.state.lock();
			state.draining && state.fetches.is_empty() && state.sub_tracks.is_empty()
		};

		if done {
			log::debug!("session drained");
			self.outgoing.close(SessionError::Drained).ok();
		}
	}

	pub(super) fn get_subscribe(&self, track_alias: u64) -> Option<Lock<SubscribeRecv>> {
		self.state.lock().sub_tracks.get(&track_alias).cloned()
	}

	pub(super) fn get_fetch(&self, subscribe_id: u64) -> Option<Lock<FetchRecv>> {
		self.state.lock().fetches.get(&subscribe_id).cloned()
	}

	// A fetch is evicted only once the OK arrived AND its stream ended.
	pub(super) fn fetch_stream_done(&self, subscribe_id: u64) {
		let removed = {
			let mut state = self.state.lock();
			match state.fetches.get(&subscribe_id) {
				Some(fetch) if fetch.lock().done() => state.fetches.remove(&subscribe_id).is_some(),
				_ => false,
			}
		};

		if removed {
			self.check_drain();
		}
	}

	pub(super) fn recv_subscribe_ok(&self, msg: message::SubscribeOk) {
		let track = {
			let state = self.state.lock();
			state
				.sub_id_to_alias
				.get(&msg.subscribe_id)
				.and_then(|alias| state.sub_tracks.get(alias))
				.cloned()
		};

		match track {
			Some(track) => track.lock().recv_ok(msg),
			None => log::warn!("unmatched subscribe ok: id={}", msg.subscribe_id),
		}
	}

	pub(super) fn recv_subscribe_error(&self, msg: message::SubscribeError) {
		let track = {
			let mut state = self.state.lock();
			match state.sub_id_to_alias.remove(&msg.subscribe_id) {
				Some(alias) => state.sub_tracks.remove(&alias),
				None => None,
			}
		};

		match track {
			Some(track) => {
				track.lock().recv_error(msg);
				self.check_drain();
			}
			None => log::warn!("unmatched subscribe error: id={}", msg.subscribe_id),
		}
	}

	pub(super) fn recv_subscribe_done(&self, msg: message::SubscribeDone) {
		let track = {
			let mut state = self.state.lock();
			match state.sub_id_to_alias.remove(&msg.subscribe_id) {
				Some(alias) => state.sub_tracks.remove(&alias),
				None => None,
			}
		};

		match track {
			Some(track) => {
				log::debug!(
					"subscribe done: id={} code={} reason={}",
					msg.subscribe_id,
					msg.status_code,
					msg.reason
				);
				track.lock().subscribe_done(msg);
				self.check_drain();
			}
			None => log::warn!("unmatched subscribe done: id={}", msg.subscribe_id),
		}
	}

	pub(super) fn recv_fetch_ok(&self, msg: message::FetchOk) {
		let subscribe_id = msg.subscribe_id;
		let fetch = self.get_fetch(subscribe_id);

		match fetch {
			Some(fetch) => {
				fetch.lock().recv_ok(msg);
				// The data stream may have already finished.
				self.fetch_stream_done(subscribe_id);
			}
			None => log::warn!("unmatched fetch ok: id={}", subscribe_id),
		}
	}

	pub(super) fn recv_fetch_error(&self, msg: message::FetchError) {
		let fetch = self.state.lock().fetches.remove(&msg.subscribe_id);

		match fetch {
			Some(fetch) => {
				fetch.lock().recv_error(msg);
				self.check_drain();
			}
			None => log::warn!("unmatched fetch error: id={}", msg.subscribe_id),
		}
	}

	pub(super) fn recv_max_subscribe_id(&self, msg: message::MaxSubscribeId) -> Result<(), SessionError> {
		let mut state = self.state.lock();

		if msg.subscribe_id <= state.peer_max_subscribe_id {
			log::warn!(
				"max subscribe id did not increase: new={} current={}",
				msg.subscribe_id,
				state.peer_max_subscribe_id
			);
			return Err(SessionError::ProtocolViolation("max subscribe id did not increase"));
		}

		log::debug!(
			"peer max subscribe id: {} -> {}",
			state.peer_max_subscribe_id,
			msg.subscribe_id
		);
		state.peer_max_subscribe_id = msg.subscribe_id;

		Ok(())
	}

	pub(super) fn recv_subscribe_announces_ok(&self, msg: message::SubscribeAnnouncesOk) {
		match self.state.lock().pending_subscribe_announces.remove(&msg.prefix) {
			Some(tx) => {
				tx.send(Ok(msg)).ok();
			}
			None => log::warn!("unmatched subscribe announces ok: prefix={:?}", msg.prefix),
		}
	}

	pub(super) fn recv_subscribe_announces_error(&self, msg: message::SubscribeAnnouncesError) {
		match self.state.lock().pending_subscribe_announces.remove(&msg.prefix) {
			Some(tx) => {
				tx.send(Err(msg)).ok();
			}
			None => log::warn!("unmatched subscribe announces error: prefix={:?}", msg.prefix),
		}
	}

	// Any malformed datagram closes the session.
	pub(super) fn recv_datagram(&self, payload: Bytes) -> Result<(), SessionError> {
		let mut buf = payload;
		let datagram = data::Datagram::decode(&mut buf)?;

		let track = match self.get_subscribe(datagram.track_alias) {
			Some(track) => track,
			None => {
				log::warn!("datagram for unknown track alias={}", datagram.track_alias);
				return Ok(());
			}
		};

		log::trace!("received datagram: {:?}", datagram);

		let header = ObjectHeader {
			group: datagram.group,
			// Datagrams carry no subgroup; mirror the object id.
			subgroup: datagram.object_id,
			object_id: datagram.object_id,
			priority: datagram.priority,
			status: datagram.status,
			length: Some(datagram.payload.len() as u64),
		};

		track.lock().datagram(&header, datagram.payload);
		Ok(())
	}

	pub(super) fn shutdown(&self, err: SessionError) {
		log::debug!("closing subscriber: {}", err);

		let (tracks, fetches, pending) = {
			let mut state = self.state.lock();
			state.sub_id_to_alias.clear();
			let tracks: Vec<_> = state.sub_tracks.drain().map(|(_, track)| track).collect();
			let fetches: Vec<_> = state.fetches.drain().map(|(_, fetch)| fetch).collect();
			let pending: Vec<_> = state.pending_subscribe_announces.drain().collect();
			(tracks, fetches, pending)
		};

		for track in tracks {
			let mut track = track.lock();
			track.recv_error(message::SubscribeError {
				subscribe_id: 0, // filled in by the receive state
				error_code: 500,
				reason: "session closed".to_string(),
				track_alias: 0,
			});
			track.cancel();
		}

		for fetch in fetches {
			let mut fetch = fetch.lock();
			fetch.recv_error(message::FetchError {
				subscribe_id: 0, // filled in by the receive state
				error_code: 500,
				reason: "session closed".to_string(),
			});
			fetch.cancel();
		}

		for (prefix, tx) in pending {
			tx.send(Err(message::SubscribeAnnouncesError {
				prefix,
				error_code: 500,
				reason: "session closed".to_string(),
			}))
			.ok();
		}
	}
}

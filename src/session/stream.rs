use std::sync::MutexGuard;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::coding::Encode;
use crate::consumers::{FetchConsumer, ObjectPublishStatus, SubgroupConsumer};
use crate::data::{self, ObjectStatus, StreamType};
use crate::error::{PublishError, ResetCode};
use crate::transport::{SendStream, Transport, TransportError};
use crate::util::{Lock, LockWeak};

use super::{FetchPublisher, TrackPublisher};

/// Serializes one data stream: a subgroup or a fetch response.
///
/// The same object implements both consumer interfaces; it is only handed to
/// the application as the one matching how it was constructed.
pub struct StreamPublisher<T: Transport> {
	state: Lock<State<T>>,
}

impl<T: Transport> Clone for StreamPublisher<T> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
		}
	}
}

/// A non-owning handle, kept by the track for reset fan-out.
pub(super) struct StreamWeak<T: Transport> {
	state: LockWeak<State<T>>,
}

impl<T: Transport> StreamWeak<T> {
	pub fn upgrade(&self) -> Option<StreamPublisher<T>> {
		self.state.upgrade().map(|state| StreamPublisher { state })
	}
}

/// The owner notified when the stream finishes or is reset.
pub(super) enum Parent<T: Transport> {
	Track(TrackPublisher<T>),
	Fetch(FetchPublisher<T>),
}

impl<T: Transport> Clone for Parent<T> {
	fn clone(&self) -> Self {
		match self {
			Self::Track(track) => Self::Track(track.clone()),
			Self::Fetch(fetch) => Self::Fetch(fetch.clone()),
		}
	}
}

impl<T: Transport> Parent<T> {
	fn on_stream_complete(&self, group: u64, subgroup: u64) {
		match self {
			Self::Track(track) => track.on_stream_complete(group, subgroup),
			Self::Fetch(fetch) => fetch.on_stream_complete(),
		}
	}
}

// The write half, absent while awaiting writability or after close.
enum Slot<S> {
	Open(S),
	Busy,
	Closed,
}

struct State<T: Transport> {
	parent: Parent<T>,
	slot: Slot<T::SendStream>,
	pending_reset: Option<ResetCode>,

	stream_type: StreamType,
	group: u64,
	subgroup: u64,
	object_id: Option<u64>,
	priority: u8,

	length_remaining: Option<u64>,
	buffer: BytesMut,
	notify_complete: bool,
}

impl<T: Transport> State<T> {
	fn new(parent: Parent<T>, stream: T::SendStream, stream_type: StreamType) -> Self {
		Self {
			parent,
			slot: Slot::Open(stream),
			pending_reset: None,
			stream_type,
			group: 0,
			subgroup: 0,
			object_id: None,
			priority: 0,
			length_remaining: None,
			buffer: BytesMut::new(),
			notify_complete: false,
		}
	}

	fn validate_publish(&mut self, object_id: u64) -> Result<(), PublishError> {
		if self.length_remaining.is_some() {
			log::warn!("still publishing previous object");
			self.terminate(ResetCode::InternalError);
			return Err(PublishError::Api("previous object incomplete"));
		}

		if let Some(last) = self.object_id {
			if object_id <= last {
				log::warn!("object id not advancing: last={} next={}", last, object_id);
				self.terminate(ResetCode::InternalError);
				return Err(PublishError::Api("object id not advancing"));
			}
		}

		match self.slot {
			Slot::Open(_) => Ok(()),
			Slot::Busy => Err(PublishError::Api("await_ready in progress")),
			Slot::Closed => Err(PublishError::Api("stream closed")),
		}
	}

	fn validate_payload(&mut self, size: usize, fin: bool) -> Result<ObjectPublishStatus, PublishError> {
		let remain = match self.length_remaining {
			Some(remain) => remain,
			None => return Err(PublishError::Api("no object in progress")),
		};

		let size = size as u64;
		if size > remain {
			log::warn!("payload exceeds object length: size={} remain={}", size, remain);
			self.terminate(ResetCode::InternalError);
			return Err(PublishError::Api("payload exceeds object length"));
		}

		let remain = remain - size;
		if remain == 0 {
			self.length_remaining = None;
			return Ok(ObjectPublishStatus::Done);
		}

		if fin {
			log::warn!("fin with object length remaining: {}", remain);
			self.terminate(ResetCode::InternalError);
			return Err(PublishError::Api("fin with an open object"));
		}

		self.length_remaining = Some(remain);
		Ok(ObjectPublishStatus::InProgress)
	}

	fn encode_object(
		&mut self,
		object_id: u64,
		status: ObjectStatus,
		length: u64,
		payload: &[u8],
	) -> Result<(), PublishError> {
		self.object_id = Some(object_id);

		let res = match self.stream_type {
			StreamType::Fetch => data::FetchObject {
				group: self.group,
				subgroup: self.subgroup,
				object_id,
				publisher_priority: self.priority,
				length,
				status,
			}
			.encode(&mut self.buffer),
			_ => data::SubgroupObject {
				object_id,
				length,
				status,
			}
			.encode(&mut self.buffer),
		};
		res.map_err(|_| PublishError::Api("value too large"))?;

		self.buffer.extend_from_slice(payload);
		Ok(())
	}

	fn flush(&mut self, fin: bool) -> Result<(), PublishError> {
		let mut stream = match std::mem::replace(&mut self.slot, Slot::Closed) {
			Slot::Open(stream) => stream,
			Slot::Busy => return Err(PublishError::Api("await_ready in progress")),
			Slot::Closed => return Err(PublishError::Api("stream closed")),
		};

		let data = self.buffer.split().freeze();
		match stream.write(data, fin) {
			Ok(()) => {
				if fin {
					self.notify_complete = true;
				} else {
					self.slot = Slot::Open(stream);
				}
				Ok(())
			}
			Err(err) => {
				log::warn!("stream write failed: {}", err);
				let code = match &err {
					TransportError::Stopped(_) => ResetCode::Cancelled,
					_ => ResetCode::InternalError,
				};
				stream.reset(code.code());
				self.notify_complete = true;
				match code {
					ResetCode::Cancelled => Err(PublishError::Cancelled),
					_ => Err(PublishError::Write(err)),
				}
			}
		}
	}

	// Reset the stream, if it is still open. Idempotent.
	fn terminate(&mut self, code: ResetCode) {
		self.length_remaining = None;

		match std::mem::replace(&mut self.slot, Slot::Closed) {
			Slot::Open(mut stream) => {
				if !self.buffer.is_empty() {
					log::warn!("stream header still pending on reset");
					self.buffer.clear();
				}
				stream.reset(code.code());
				self.notify_complete = true;
			}
			Slot::Busy => {
				// await_ready holds the stream; it applies the reset on return.
				self.pending_reset = Some(code);
				self.notify_complete = true;
			}
			Slot::Closed => {}
		}
	}

	// Only fetch streams span groups; the position may only advance.
	fn fetch_position(&mut self, group: u64, subgroup: u64) -> Result<(), PublishError> {
		if group < self.group {
			return Err(PublishError::Api("group moved backwards"));
		}

		if group > self.group {
			// A new group resets the expected object id.
			self.object_id = None;
			self.group = group;
			self.subgroup = subgroup;
			return Ok(());
		}

		if subgroup < self.subgroup {
			return Err(PublishError::Api("subgroup moved backwards"));
		}

		self.subgroup = subgroup;
		Ok(())
	}
}

impl<T: Transport> StreamPublisher<T> {
	pub(super) fn subgroup(
		parent: Parent<T>,
		stream: T::SendStream,
		track_alias: u64,
		group: u64,
		subgroup: u64,
		priority: u8,
	) -> Self {
		let mut state = State::new(parent, stream, StreamType::Subgroup);
		state.group = group;
		state.subgroup = subgroup;
		state.priority = priority;

		StreamType::Subgroup.encode(&mut state.buffer).ok();
		data::SubgroupHeader {
			track_alias,
			group,
			subgroup,
			publisher_priority: priority,
		}
		.encode(&mut state.buffer)
		.ok();

		Self {
			state: Lock::new(state),
		}
	}

	pub(super) fn fetch(parent: Parent<T>, stream: T::SendStream, subscribe_id: u64) -> Self {
		let mut state = State::new(parent, stream, StreamType::Fetch);

		StreamType::Fetch.encode(&mut state.buffer).ok();
		data::FetchHeader { subscribe_id }.encode(&mut state.buffer).ok();

		Self {
			state: Lock::new(state),
		}
	}

	pub(super) fn downgrade(&self) -> StreamWeak<T> {
		StreamWeak {
			state: self.state.downgrade(),
		}
	}

	// Notify the parent outside the lock, at most once per stream.
	fn complete(&self, mut state: MutexGuard<'_, State<T>>) {
		if !state.notify_complete {
			return;
		}
		state.notify_complete = false;

		let parent = state.parent.clone();
		let (group, subgroup) = (state.group, state.subgroup);
		drop(state);

		parent.on_stream_complete(group, subgroup);
	}

	fn write_object(
		&self,
		object_id: u64,
		status: ObjectStatus,
		payload: Bytes,
		fin: bool,
	) -> Result<(), PublishError> {
		let mut state = self.state.lock();
		let res = (|| {
			state.validate_publish(object_id)?;
			state.encode_object(object_id, status, payload.len() as u64, &payload)?;
			state.flush(fin)
		})();
		self.complete(state);
		res
	}

	pub(super) fn publish_status(&self, object_id: u64, status: ObjectStatus, fin: bool) -> Result<(), PublishError> {
		self.write_object(object_id, status, Bytes::new(), fin)
	}

	fn begin_object_inner(&self, object_id: u64, length: u64, initial: Bytes) -> Result<(), PublishError> {
		let mut state = self.state.lock();
		let res = (|| {
			state.validate_publish(object_id)?;
			state.length_remaining = Some(length);
			state.validate_payload(initial.len(), false)?;
			state.encode_object(object_id, ObjectStatus::Normal, length, &initial)?;
			state.flush(false)
		})();
		self.complete(state);
		res
	}

	fn object_payload_inner(&self, payload: Bytes, fin: bool) -> Result<ObjectPublishStatus, PublishError> {
		let mut state = self.state.lock();
		let res = (|| {
			let status = state.validate_payload(payload.len(), fin)?;
			state.buffer.extend_from_slice(&payload);
			state.flush(fin)?;
			Ok(status)
		})();
		self.complete(state);
		res
	}

	fn end_inner(&self) -> Result<(), PublishError> {
		let mut state = self.state.lock();
		let res = (|| {
			if state.length_remaining.is_some() {
				state.terminate(ResetCode::InternalError);
				return Err(PublishError::Api("previous object incomplete"));
			}
			if !state.buffer.is_empty() {
				log::warn!("closing a stream with no objects published");
			}
			state.flush(true)
		})();
		self.complete(state);
		res
	}

	fn set_fetch_position(&self, group: u64, subgroup: u64) -> Result<(), PublishError> {
		self.state.lock().fetch_position(group, subgroup)
	}

	fn is_closed(&self) -> bool {
		matches!(self.state.lock().slot, Slot::Closed)
	}

	pub(super) fn reset(&self, code: ResetCode) {
		let mut state = self.state.lock();
		state.terminate(code);
		self.complete(state);
	}

	/// Resolves while the stream has write credit.
	pub(super) async fn ready(&self) -> Result<(), PublishError> {
		let mut stream = {
			let mut state = self.state.lock();
			match std::mem::replace(&mut state.slot, Slot::Busy) {
				Slot::Open(stream) => stream,
				Slot::Busy => return Err(PublishError::Api("await_ready in progress")),
				Slot::Closed => {
					state.slot = Slot::Closed;
					return Err(PublishError::Cancelled);
				}
			}
		};

		let res = stream.writable().await;

		let mut state = self.state.lock();
		if let Some(code) = state.pending_reset.take() {
			// Reset raced with the wait; the terminate already notified.
			stream.reset(code.code());
			return Err(PublishError::Cancelled);
		}

		match res {
			Ok(()) => {
				state.slot = Slot::Open(stream);
				Ok(())
			}
			Err(err) => {
				let code = match &err {
					TransportError::Stopped(_) => ResetCode::Cancelled,
					_ => ResetCode::InternalError,
				};
				stream.reset(code.code());
				state.slot = Slot::Closed;
				state.notify_complete = true;
				let res = match code {
					ResetCode::Cancelled => Err(PublishError::Cancelled),
					_ => Err(PublishError::Write(err)),
				};
				self.complete(state);
				res
			}
		}
	}
}

impl<T: Transport> SubgroupConsumer for StreamPublisher<T> {
	fn object(&mut self, object_id: u64, payload: Bytes, fin_stream: bool) -> Result<(), PublishError> {
		self.write_object(object_id, ObjectStatus::Normal, payload, fin_stream)
	}

	fn object_not_exists(&mut self, object_id: u64, fin_stream: bool) -> Result<(), PublishError> {
		self.publish_status(object_id, ObjectStatus::ObjectNotExist, fin_stream)
	}

	fn begin_object(&mut self, object_id: u64, length: u64, initial: Bytes) -> Result<(), PublishError> {
		self.begin_object_inner(object_id, length, initial)
	}

	fn object_payload(&mut self, payload: Bytes, fin_stream: bool) -> Result<ObjectPublishStatus, PublishError> {
		self.object_payload_inner(payload, fin_stream)
	}

	fn end_of_group(&mut self, object_id: u64) -> Result<(), PublishError> {
		self.publish_status(object_id, ObjectStatus::EndOfGroup, true)
	}

	fn end_of_track_and_group(&mut self, object_id: u64) -> Result<(), PublishError> {
		self.publish_status(object_id, ObjectStatus::EndOfTrackAndGroup, true)
	}

	fn end_of_subgroup(&mut self) -> Result<(), PublishError> {
		self.end_inner()
	}

	fn reset(&mut self, code: ResetCode) {
		StreamPublisher::reset(self, code)
	}
}

#[async_trait]
impl<T: Transport> FetchConsumer for StreamPublisher<T> {
	fn object(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		payload: Bytes,
		fin_fetch: bool,
	) -> Result<(), PublishError> {
		self.set_fetch_position(group, subgroup)?;
		self.write_object(object_id, ObjectStatus::Normal, payload, fin_fetch)
	}

	fn object_not_exists(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		fin_fetch: bool,
	) -> Result<(), PublishError> {
		self.set_fetch_position(group, subgroup)?;
		self.publish_status(object_id, ObjectStatus::ObjectNotExist, fin_fetch)
	}

	fn group_not_exists(&mut self, group: u64, subgroup: u64, fin_fetch: bool) -> Result<(), PublishError> {
		self.set_fetch_position(group, subgroup)?;
		self.publish_status(0, ObjectStatus::GroupNotExist, fin_fetch)
	}

	fn begin_object(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		length: u64,
		initial: Bytes,
	) -> Result<(), PublishError> {
		self.set_fetch_position(group, subgroup)?;
		self.begin_object_inner(object_id, length, initial)
	}

	fn object_payload(&mut self, payload: Bytes, fin_fetch: bool) -> Result<ObjectPublishStatus, PublishError> {
		self.object_payload_inner(payload, fin_fetch)
	}

	fn end_of_group(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		fin_fetch: bool,
	) -> Result<(), PublishError> {
		self.set_fetch_position(group, subgroup)?;
		self.publish_status(object_id, ObjectStatus::EndOfGroup, fin_fetch)
	}

	fn end_of_track_and_group(&mut self, group: u64, subgroup: u64, object_id: u64) -> Result<(), PublishError> {
		self.set_fetch_position(group, subgroup)?;
		self.publish_status(object_id, ObjectStatus::EndOfTrackAndGroup, true)
	}

	fn end_of_fetch(&mut self) -> Result<(), PublishError> {
		if self.is_closed() {
			return Err(PublishError::Cancelled);
		}
		self.end_inner()
	}

	fn reset(&mut self, code: ResetCode) {
		StreamPublisher::reset(self, code)
	}

	async fn await_ready(&mut self) -> Result<(), PublishError> {
		self.ready().await
	}
}

#[cfg(test)]
mod tests {
	use bytes::{Buf, BytesMut};

	use crate::coding::Decode;
	use crate::consumers::TrackConsumer;
	use crate::message::GroupOrder;
	use crate::session::Publisher;
	use crate::transport::{mock, RecvStream as _};
	use crate::util::Queue;

	use super::super::TrackPublisher;
	use super::*;

	fn new_track() -> (TrackPublisher<mock::MockTransport>, mock::MockTransport) {
		let (transport, peer) = mock::pair();
		let publisher = Publisher::new(transport, Queue::default(), Queue::default(), 100);
		let track = TrackPublisher::new(publisher, 0, 7, 0x10, GroupOrder::OldestFirst);
		(track, peer)
	}

	// Read the peer's next unidirectional stream to completion.
	async fn read_stream(peer: &mock::MockTransport) -> Result<BytesMut, u64> {
		let recv = peer.accept_uni().await.unwrap();
		read_all(recv).await
	}

	async fn read_all(mut recv: mock::MockRecv) -> Result<BytesMut, u64> {
		let mut buf = BytesMut::new();

		loop {
			match recv.read_buf(&mut buf).await {
				Ok(Some(_)) => continue,
				Ok(None) => return Ok(buf),
				Err(TransportError::Reset(code)) => return Err(code),
				Err(err) => panic!("unexpected read error: {}", err),
			}
		}
	}

	#[tokio::test]
	async fn subgroup_wire_format() {
		let (mut track, peer) = new_track();

		let mut subgroup = track.begin_subgroup(5, 3, 128).unwrap();
		subgroup.object(0, Bytes::from_static(b"a"), false).unwrap();
		subgroup.begin_object(1, 4, Bytes::from_static(b"bc")).unwrap();
		assert_eq!(
			subgroup.object_payload(Bytes::from_static(b"de"), false).unwrap(),
			ObjectPublishStatus::Done
		);
		subgroup.end_of_group(2).unwrap();

		let recv = peer.accept_uni().await.unwrap();
		assert_eq!(
			recv.priority(),
			Some(crate::session::stream_priority(5, 3, 0x10, 128, GroupOrder::OldestFirst))
		);

		let mut buf = read_all(recv).await.unwrap();

		assert_eq!(data::StreamType::decode(&mut buf).unwrap(), data::StreamType::Subgroup);

		let header = data::SubgroupHeader::decode(&mut buf).unwrap();
		assert_eq!(header.track_alias, 7);
		assert_eq!(header.group, 5);
		assert_eq!(header.subgroup, 3);
		assert_eq!(header.publisher_priority, 128);

		let object = data::SubgroupObject::decode(&mut buf).unwrap();
		assert_eq!((object.object_id, object.length), (0, 1));
		assert_eq!(&buf[..1], b"a");
		buf.advance(1);

		let object = data::SubgroupObject::decode(&mut buf).unwrap();
		assert_eq!((object.object_id, object.length), (1, 4));
		assert_eq!(&buf[..4], b"bcde");
		buf.advance(4);

		let object = data::SubgroupObject::decode(&mut buf).unwrap();
		assert_eq!(object.object_id, 2);
		assert_eq!(object.status, ObjectStatus::EndOfGroup);
		assert!(buf.is_empty());
	}

	#[tokio::test]
	async fn object_ids_must_advance() {
		let (mut track, peer) = new_track();

		let mut subgroup = track.begin_subgroup(0, 0, 0).unwrap();
		subgroup.object(1, Bytes::from_static(b"a"), false).unwrap();

		assert!(matches!(
			subgroup.object(1, Bytes::from_static(b"b"), false),
			Err(PublishError::Api(_))
		));

		// The violation reset the stream; later calls fail too.
		assert!(matches!(
			subgroup.object(2, Bytes::from_static(b"c"), false),
			Err(PublishError::Api(_))
		));

		assert_eq!(read_stream(&peer).await, Err(ResetCode::InternalError.code()));
	}

	#[tokio::test]
	async fn payload_must_match_length() {
		let (mut track, _peer) = new_track();

		let mut subgroup = track.begin_subgroup(0, 0, 0).unwrap();
		subgroup.begin_object(0, 10, Bytes::from_static(b"abc")).unwrap();

		// More payload than declared.
		assert!(matches!(
			subgroup.object_payload(Bytes::from_static(b"0123456789"), false),
			Err(PublishError::Api(_))
		));
	}

	#[tokio::test]
	async fn fin_requires_complete_object() {
		let (mut track, _peer) = new_track();

		let mut subgroup = track.begin_subgroup(0, 0, 0).unwrap();
		subgroup.begin_object(0, 10, Bytes::from_static(b"abc")).unwrap();

		assert!(matches!(
			subgroup.object_payload(Bytes::from_static(b"de"), true),
			Err(PublishError::Api(_))
		));
	}

	#[tokio::test]
	async fn fin_closes_once() {
		let (mut track, peer) = new_track();

		let mut subgroup = track.begin_subgroup(0, 0, 0).unwrap();
		subgroup.object(0, Bytes::from_static(b"x"), true).unwrap();

		assert!(matches!(
			subgroup.object(1, Bytes::from_static(b"y"), false),
			Err(PublishError::Api(_))
		));

		// The stream finished cleanly despite the late call.
		assert!(read_stream(&peer).await.is_ok());
	}

	#[tokio::test]
	async fn empty_subgroup_allowed() {
		let (mut track, peer) = new_track();

		let mut subgroup = track.begin_subgroup(0, 0, 0).unwrap();
		subgroup.end_of_subgroup().unwrap();

		let mut buf = read_stream(&peer).await.unwrap();
		assert_eq!(data::StreamType::decode(&mut buf).unwrap(), data::StreamType::Subgroup);
		data::SubgroupHeader::decode(&mut buf).unwrap();
		assert!(buf.is_empty());
	}

	#[tokio::test]
	async fn blocked_without_stream_credit() {
		let (transport, _peer) = mock::pair();
		transport.set_uni_credit(0);

		let publisher = Publisher::new(transport.clone(), Queue::default(), Queue::default(), 100);
		let mut track = TrackPublisher::new(publisher, 0, 7, 0x10, GroupOrder::OldestFirst);

		assert!(matches!(track.begin_subgroup(0, 0, 0), Err(PublishError::Blocked)));

		// Once credit returns the caller can retry.
		transport.set_uni_credit(1);
		track.await_stream_credit().await.unwrap();
		track.begin_subgroup(0, 0, 0).unwrap();
	}

	#[tokio::test]
	async fn fetch_groups_must_advance() {
		let (transport, peer) = mock::pair();
		let publisher = Publisher::new(transport, Queue::default(), Queue::default(), 100);
		let fetch = super::super::FetchPublisher::new(publisher, 9, 0x10, GroupOrder::OldestFirst);

		let mut stream = fetch.begin_fetch(GroupOrder::OldestFirst).unwrap();

		FetchConsumer::object(&mut stream, 2, 0, 0, Bytes::from_static(b"a"), false).unwrap();
		FetchConsumer::object(&mut stream, 2, 1, 1, Bytes::from_static(b"b"), false).unwrap();

		// The group may not move backwards.
		assert!(matches!(
			FetchConsumer::object(&mut stream, 1, 0, 2, Bytes::from_static(b"c"), false),
			Err(PublishError::Api(_))
		));

		// Nor the subgroup, within the same group.
		assert!(matches!(
			FetchConsumer::object(&mut stream, 2, 0, 2, Bytes::from_static(b"d"), false),
			Err(PublishError::Api(_))
		));

		// Advancing the group resets the expected object id.
		FetchConsumer::object(&mut stream, 3, 0, 0, Bytes::from_static(b"e"), false).unwrap();

		FetchConsumer::await_ready(&mut stream).await.unwrap();
		FetchConsumer::end_of_fetch(&mut stream).unwrap();

		let mut buf = read_stream(&peer).await.unwrap();
		assert_eq!(data::StreamType::decode(&mut buf).unwrap(), data::StreamType::Fetch);

		let header = data::FetchHeader::decode(&mut buf).unwrap();
		assert_eq!(header.subscribe_id, 9);

		let mut groups = Vec::new();
		while !buf.is_empty() {
			let object = data::FetchObject::decode(&mut buf).unwrap();
			groups.push(object.group);
			buf.advance(object.length as usize);
		}
		assert_eq!(groups, vec![2, 2, 3]);
	}
}

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::coding::Encode;
use crate::consumers::{SubgroupConsumer, TrackConsumer};
use crate::data::{self, ObjectHeader, ObjectStatus};
use crate::error::{PublishError, ResetCode};
use crate::message::{GroupOrder, SubscribeDone};
use crate::transport::{SendStream, Transport, TransportError};
use crate::util::Lock;

use super::{stream_priority, Parent, Publisher, StreamPublisher, StreamWeak};

/// Publishes one track: subgroup streams on demand plus datagrams.
///
/// Handed to the application once it accepts a subscription.
#[derive(Debug)]
pub struct TrackPublisher<T: Transport> {
	state: Lock<State<T>>,
}

impl<T: Transport> Clone for TrackPublisher<T> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
		}
	}
}

#[derive(Debug)]
struct State<T: Transport> {
	// Dropped on subscribe_done so late publishes fail instead of write.
	session: Option<Publisher<T>>,

	subscribe_id: u64,
	track_alias: u64,
	subscriber_priority: u8,
	group_order: GroupOrder,

	// Open subgroup streams, for reset fan-out on close.
	subgroups: HashMap<(u64, u64), StreamWeak<T>>,
}

impl<T: Transport> TrackPublisher<T> {
	pub(super) fn new(
		session: Publisher<T>,
		subscribe_id: u64,
		track_alias: u64,
		subscriber_priority: u8,
		group_order: GroupOrder,
	) -> Self {
		Self {
			state: Lock::new(State {
				session: Some(session),
				subscribe_id,
				track_alias,
				subscriber_priority,
				group_order,
				subgroups: HashMap::new(),
			}),
		}
	}

	pub(super) fn set_subscriber_priority(&self, priority: u8) {
		self.state.lock().subscriber_priority = priority;
	}

	pub(super) fn set_group_order(&self, order: GroupOrder) {
		self.state.lock().group_order = order;
	}

	fn begin_subgroup_inner(
		&self,
		group: u64,
		subgroup: u64,
		priority: u8,
	) -> Result<StreamPublisher<T>, PublishError> {
		let mut state = self.state.lock();

		let session = state
			.session
			.clone()
			.ok_or(PublishError::Api("publish after subscribe_done"))?;

		let mut stream = session.transport().open_uni().map_err(|err| match err {
			TransportError::Blocked => PublishError::Blocked,
			err => PublishError::Write(err),
		})?;

		stream.set_priority(stream_priority(
			group,
			subgroup,
			state.subscriber_priority,
			priority,
			state.group_order,
		));

		log::debug!(
			"new subgroup stream: alias={} group={} subgroup={}",
			state.track_alias,
			group,
			subgroup
		);

		let publisher = StreamPublisher::subgroup(
			Parent::Track(self.clone()),
			stream,
			state.track_alias,
			group,
			subgroup,
			priority,
		);
		state.subgroups.insert((group, subgroup), publisher.downgrade());

		Ok(publisher)
	}

	pub(super) fn on_stream_complete(&self, group: u64, subgroup: u64) {
		self.state.lock().subgroups.remove(&(group, subgroup));
	}

	// Reset every open subgroup, used on session teardown.
	pub(super) fn reset(&self, code: ResetCode) {
		let streams: Vec<_> = {
			let mut state = self.state.lock();
			state.session = None;
			let streams = state.subgroups.values().filter_map(|weak| weak.upgrade()).collect();
			state.subgroups.clear();
			streams
		};

		for stream in streams {
			stream.reset(code);
		}
	}
}

#[async_trait]
impl<T: Transport> TrackConsumer for TrackPublisher<T> {
	fn begin_subgroup(
		&mut self,
		group: u64,
		subgroup: u64,
		priority: u8,
	) -> Result<Box<dyn SubgroupConsumer>, PublishError> {
		let publisher = self.begin_subgroup_inner(group, subgroup, priority)?;
		Ok(Box::new(publisher))
	}

	async fn await_stream_credit(&mut self) -> Result<(), PublishError> {
		let session = self
			.state
			.lock()
			.session
			.clone()
			.ok_or(PublishError::Api("publish after subscribe_done"))?;

		session.transport().uni_credit().await?;
		Ok(())
	}

	fn object_stream(&mut self, header: &ObjectHeader, payload: Bytes) -> Result<(), PublishError> {
		if !header.status.has_payload() && !payload.is_empty() {
			return Err(PublishError::Api("payload on a status object"));
		}

		let mut subgroup = self.begin_subgroup_inner(header.group, header.subgroup, header.priority)?;

		match header.status {
			ObjectStatus::Normal => SubgroupConsumer::object(&mut subgroup, header.object_id, payload, true),
			ObjectStatus::ObjectNotExist => SubgroupConsumer::object_not_exists(&mut subgroup, header.object_id, true),
			ObjectStatus::GroupNotExist => subgroup.publish_status(header.object_id, ObjectStatus::GroupNotExist, true),
			ObjectStatus::EndOfGroup => SubgroupConsumer::end_of_group(&mut subgroup, header.object_id),
			ObjectStatus::EndOfTrackAndGroup => {
				SubgroupConsumer::end_of_track_and_group(&mut subgroup, header.object_id)
			}
			ObjectStatus::EndOfSubgroup => SubgroupConsumer::end_of_subgroup(&mut subgroup),
		}
	}

	fn group_not_exists(&mut self, group: u64, subgroup: u64, priority: u8) -> Result<(), PublishError> {
		self.object_stream(
			&ObjectHeader {
				group,
				subgroup,
				object_id: 0,
				priority,
				status: ObjectStatus::GroupNotExist,
				length: None,
			},
			Bytes::new(),
		)
	}

	fn datagram(&mut self, header: &ObjectHeader, payload: Bytes) -> Result<(), PublishError> {
		let (session, track_alias) = {
			let state = self.state.lock();
			let session = state
				.session
				.clone()
				.ok_or(PublishError::Api("publish after subscribe_done"))?;
			(session, state.track_alias)
		};

		match header.length {
			Some(length) if length == payload.len() as u64 => {}
			_ => return Err(PublishError::Api("datagram length required")),
		}

		let datagram = data::Datagram {
			track_alias,
			group: header.group,
			object_id: header.object_id,
			priority: header.priority,
			status: header.status,
			payload,
		};

		let mut buf = BytesMut::new();
		datagram
			.encode(&mut buf)
			.map_err(|_| PublishError::Api("value too large"))?;

		session
			.transport()
			.send_datagram(buf.freeze())
			.map_err(PublishError::Write)?;

		Ok(())
	}

	fn subscribe_done(&mut self, mut done: SubscribeDone) -> Result<(), PublishError> {
		let (session, subscribe_id) = {
			let mut state = self.state.lock();
			let session = state
				.session
				.take()
				.ok_or(PublishError::Api("subscription already done"))?;
			(session, state.subscribe_id)
		};

		done.subscribe_id = subscribe_id;
		session.send_subscribe_done(done).map_err(|_| PublishError::Cancelled)?;

		Ok(())
	}
}

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::consumers::{FetchConsumer, ObjectPublishStatus, SubgroupConsumer, TrackConsumer};
use crate::data::ObjectHeader;
use crate::error::{PublishError, ResetCode};
use crate::message::{
	FetchError, FetchOk, FullTrackName, SubscribeDone, SubscribeError, SubscribeOk,
};

/// Everything the subscriber holds for one pending/active subscription:
/// the application callback plus the one-shot response promise.
pub(super) struct SubscribeRecv {
	full_track_name: FullTrackName,
	subscribe_id: u64,

	callback: Option<Box<dyn TrackConsumer>>,
	pending: Option<oneshot::Sender<Result<SubscribeOk, SubscribeError>>>,
}

impl std::fmt::Debug for SubscribeRecv {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubscribeRecv")
			.field("full_track_name", &self.full_track_name)
			.field("subscribe_id", &self.subscribe_id)
			.field("callback", &self.callback.as_ref().map(|_| "..."))
			.field("pending", &self.pending.as_ref().map(|_| "..."))
			.finish()
	}
}

impl SubscribeRecv {
	pub fn new(
		full_track_name: FullTrackName,
		subscribe_id: u64,
		callback: Box<dyn TrackConsumer>,
	) -> (Self, oneshot::Receiver<Result<SubscribeOk, SubscribeError>>) {
		let (tx, rx) = oneshot::channel();

		let recv = Self {
			full_track_name,
			subscribe_id,
			callback: Some(callback),
			pending: Some(tx),
		};

		(recv, rx)
	}

	pub fn full_track_name(&self) -> &FullTrackName {
		&self.full_track_name
	}

	pub fn recv_ok(&mut self, ok: SubscribeOk) {
		if let Some(tx) = self.pending.take() {
			tx.send(Ok(ok)).ok();
		}
	}

	pub fn recv_error(&mut self, mut err: SubscribeError) {
		err.subscribe_id = self.subscribe_id;

		match self.pending.take() {
			Some(tx) => {
				tx.send(Err(err)).ok();
			}
			// Already accepted: degrade into a terminal SubscribeDone.
			None => self.subscribe_done(SubscribeDone {
				subscribe_id: self.subscribe_id,
				status_code: SubscribeDone::SESSION_CLOSED,
				reason: "closed locally".to_string(),
				last: None,
			}),
		}
	}

	pub fn subscribe_done(&mut self, done: SubscribeDone) {
		if let Some(callback) = self.callback.as_mut() {
			callback.subscribe_done(done).ok();
		} // else, unsubscribe raced with the done and the callback was dropped
	}

	/// Drop the callback; later objects are parsed but not delivered.
	pub fn cancel(&mut self) {
		self.callback = None;
	}

	pub fn cancelled(&self) -> bool {
		self.callback.is_none()
	}

	pub fn begin_subgroup(
		&mut self,
		group: u64,
		subgroup: u64,
		priority: u8,
	) -> Option<Result<Box<dyn SubgroupConsumer>, PublishError>> {
		self.callback
			.as_mut()
			.map(|callback| callback.begin_subgroup(group, subgroup, priority))
	}

	pub fn group_not_exists(&mut self, group: u64, subgroup: u64, priority: u8) {
		if let Some(callback) = self.callback.as_mut() {
			callback.group_not_exists(group, subgroup, priority).ok();
		}
	}

	pub fn datagram(&mut self, header: &ObjectHeader, payload: Bytes) {
		if let Some(callback) = self.callback.as_mut() {
			callback.datagram(header, payload).ok();
		}
	}
}

/// The fetch counterpart: done only once the response was accepted AND the
/// data stream has ended.
pub(super) struct FetchRecv {
	full_track_name: FullTrackName,
	subscribe_id: u64,

	callback: Option<Box<dyn FetchConsumer>>,
	pending: Option<oneshot::Sender<Result<FetchOk, FetchError>>>,
	ok: bool,
}

impl std::fmt::Debug for FetchRecv {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FetchRecv")
			.field("full_track_name", &self.full_track_name)
			.field("subscribe_id", &self.subscribe_id)
			.field("callback", &self.callback.as_ref().map(|_| "..."))
			.field("pending", &self.pending.as_ref().map(|_| "..."))
			.field("ok", &self.ok)
			.finish()
	}
}

impl FetchRecv {
	pub fn new(
		full_track_name: FullTrackName,
		subscribe_id: u64,
		callback: Box<dyn FetchConsumer>,
	) -> (Self, oneshot::Receiver<Result<FetchOk, FetchError>>) {
		let (tx, rx) = oneshot::channel();

		let recv = Self {
			full_track_name,
			subscribe_id,
			callback: Some(callback),
			pending: Some(tx),
			ok: false,
		};

		(recv, rx)
	}

	pub fn full_track_name(&self) -> &FullTrackName {
		&self.full_track_name
	}

	pub fn recv_ok(&mut self, ok: FetchOk) {
		self.ok = true;
		if let Some(tx) = self.pending.take() {
			tx.send(Ok(ok)).ok();
		}
	}

	pub fn recv_error(&mut self, mut err: FetchError) {
		err.subscribe_id = self.subscribe_id;
		if let Some(tx) = self.pending.take() {
			tx.send(Err(err)).ok();
		}
	}

	pub fn cancel(&mut self) {
		self.callback = None;
	}

	/// Both the OK arrived and the data stream finished.
	pub fn done(&self) -> bool {
		self.ok && self.callback.is_none()
	}

	pub fn object(&mut self, group: u64, subgroup: u64, object_id: u64, payload: Bytes) -> Result<(), PublishError> {
		match self.callback.as_mut() {
			Some(callback) => callback.object(group, subgroup, object_id, payload, false),
			None => Ok(()),
		}
	}

	pub fn begin_object(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		length: u64,
		initial: Bytes,
	) -> Result<(), PublishError> {
		match self.callback.as_mut() {
			Some(callback) => callback.begin_object(group, subgroup, object_id, length, initial),
			None => Ok(()),
		}
	}

	pub fn object_payload(&mut self, payload: Bytes, done: bool) -> Result<(), PublishError> {
		let callback = match self.callback.as_mut() {
			Some(callback) => callback,
			None => return Ok(()),
		};

		let status = callback.object_payload(payload, false)?;
		debug_assert_eq!(status == ObjectPublishStatus::Done, done);

		Ok(())
	}

	pub fn object_not_exists(&mut self, group: u64, subgroup: u64, object_id: u64) -> Result<(), PublishError> {
		match self.callback.as_mut() {
			Some(callback) => callback.object_not_exists(group, subgroup, object_id, false),
			None => Ok(()),
		}
	}

	pub fn group_not_exists(&mut self, group: u64, subgroup: u64) -> Result<(), PublishError> {
		match self.callback.as_mut() {
			Some(callback) => callback.group_not_exists(group, subgroup, false),
			None => Ok(()),
		}
	}

	pub fn end_of_group(&mut self, group: u64, subgroup: u64, object_id: u64) -> Result<(), PublishError> {
		match self.callback.as_mut() {
			Some(callback) => callback.end_of_group(group, subgroup, object_id, false),
			None => Ok(()),
		}
	}

	pub fn end_of_track_and_group(&mut self, group: u64, subgroup: u64, object_id: u64) -> Result<(), PublishError> {
		let res = match self.callback.as_mut() {
			Some(callback) => callback.end_of_track_and_group(group, subgroup, object_id),
			None => Ok(()),
		};
		self.callback = None;
		res
	}

	/// Deliver the end of the fetch, unless a terminal event already did.
	pub fn end_of_fetch(&mut self) {
		if let Some(mut callback) = self.callback.take() {
			callback.end_of_fetch().ok();
		}
	}

	pub fn reset(&mut self, code: ResetCode) {
		if let Some(mut callback) = self.callback.take() {
			callback.reset(code);
		}
	}
}

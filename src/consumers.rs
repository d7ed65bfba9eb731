//! The callback interfaces connecting the session to the application.
//!
//! These traits are symmetric: when publishing, the session implements them
//! and the application calls them to emit objects; when consuming, the
//! application implements them and the session calls them as objects arrive.
use async_trait::async_trait;
use bytes::Bytes;

use crate::data::ObjectHeader;
use crate::error::{PublishError, ResetCode};
use crate::message::SubscribeDone;

/// Whether a streamed object has consumed its declared length yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectPublishStatus {
	InProgress,
	Done,
}

/// One track of a subscription.
#[async_trait]
pub trait TrackConsumer: Send {
	/// Start a new subgroup, delivered on its own unidirectional stream.
	fn begin_subgroup(
		&mut self,
		group: u64,
		subgroup: u64,
		priority: u8,
	) -> Result<Box<dyn SubgroupConsumer>, PublishError>;

	/// Resolves once a new unidirectional stream can be created.
	async fn await_stream_credit(&mut self) -> Result<(), PublishError>;

	/// Deliver a single object on its own subgroup, which is closed afterwards.
	fn object_stream(&mut self, header: &ObjectHeader, payload: Bytes) -> Result<(), PublishError>;

	/// Deliver a group-does-not-exist marker on a fresh one-object subgroup.
	fn group_not_exists(&mut self, group: u64, subgroup: u64, priority: u8) -> Result<(), PublishError>;

	/// Deliver a single object as a datagram. `header.length` must be set.
	fn datagram(&mut self, header: &ObjectHeader, payload: Bytes) -> Result<(), PublishError>;

	/// The subscription ended; no objects follow.
	fn subscribe_done(&mut self, done: SubscribeDone) -> Result<(), PublishError>;
}

/// One subgroup of objects, in order, on one stream.
pub trait SubgroupConsumer: Send {
	/// A complete object. Object IDs must strictly increase.
	fn object(&mut self, object_id: u64, payload: Bytes, fin_stream: bool) -> Result<(), PublishError>;

	/// An object-does-not-exist marker.
	fn object_not_exists(&mut self, object_id: u64, fin_stream: bool) -> Result<(), PublishError>;

	/// Start an object of a known length, delivered in pieces.
	fn begin_object(&mut self, object_id: u64, length: u64, initial: Bytes) -> Result<(), PublishError>;

	/// More payload for the open object. The pieces must sum to the declared
	/// length exactly; `fin_stream` is only legal on the final piece.
	fn object_payload(&mut self, payload: Bytes, fin_stream: bool)
		-> Result<ObjectPublishStatus, PublishError>;

	/// The final object of the group; finishes the stream.
	fn end_of_group(&mut self, object_id: u64) -> Result<(), PublishError>;

	/// The final object of the group and the track; finishes the stream.
	fn end_of_track_and_group(&mut self, object_id: u64) -> Result<(), PublishError>;

	/// Finish the stream with no further objects.
	fn end_of_subgroup(&mut self) -> Result<(), PublishError>;

	/// Abruptly terminate the stream.
	fn reset(&mut self, code: ResetCode);
}

/// The response to a fetch: objects across groups, in order, on one stream.
///
/// Every call carries the full position since one stream spans groups.
/// Groups may only advance.
#[async_trait]
pub trait FetchConsumer: Send {
	fn object(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		payload: Bytes,
		fin_fetch: bool,
	) -> Result<(), PublishError>;

	fn object_not_exists(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		fin_fetch: bool,
	) -> Result<(), PublishError>;

	fn group_not_exists(&mut self, group: u64, subgroup: u64, fin_fetch: bool) -> Result<(), PublishError>;

	fn begin_object(
		&mut self,
		group: u64,
		subgroup: u64,
		object_id: u64,
		length: u64,
		initial: Bytes,
	) -> Result<(), PublishError>;

	fn object_payload(&mut self, payload: Bytes, fin_fetch: bool)
		-> Result<ObjectPublishStatus, PublishError>;

	fn end_of_group(&mut self, group: u64, subgroup: u64, object_id: u64, fin_fetch: bool)
		-> Result<(), PublishError>;

	fn end_of_track_and_group(&mut self, group: u64, subgroup: u64, object_id: u64) -> Result<(), PublishError>;

	/// Finish the stream; the fetch is complete.
	fn end_of_fetch(&mut self) -> Result<(), PublishError>;

	/// Abruptly terminate the stream.
	fn reset(&mut self, code: ResetCode);

	/// Resolves while the stream has write credit, for backpressure.
	async fn await_ready(&mut self) -> Result<(), PublishError>;
}

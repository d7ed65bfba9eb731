use crate::consumers::{ObjectPublishStatus, SubgroupConsumer};
use crate::data::{self, ObjectStatus};
use crate::error::ResetCode;
use crate::transport::{Transport, TransportError};
use crate::util::Lock;

use super::{Reader, SessionError, SubscribeRecv, Subscriber};

/// Drive one incoming unidirectional stream, translating its objects into
/// application callbacks.
///
/// Peer misbehavior (malformed framing) is fatal for the session; everything
/// else at most stops this stream.
pub(super) async fn run<T: Transport>(subscriber: Subscriber<T>, stream: T::RecvStream) -> Result<(), SessionError> {
	let mut reader = Reader::new(stream);

	let res = match reader.decode::<data::StreamType>().await {
		Ok(data::StreamType::Subgroup) => recv_subgroup(&subscriber, &mut reader).await,
		Ok(data::StreamType::Fetch) => recv_fetch(&subscriber, &mut reader).await,
		Ok(data::StreamType::Datagram) => Err(SessionError::ProtocolViolation("datagram type on a stream")),
		Err(err) => Err(err),
	};

	match res {
		// A reset before anything was bound just ends the stream.
		Err(SessionError::Transport(TransportError::Reset(_))) => Ok(()),
		res => res,
	}
}

async fn recv_subgroup<T: Transport>(
	subscriber: &Subscriber<T>,
	reader: &mut Reader<T::RecvStream>,
) -> Result<(), SessionError> {
	let header: data::SubgroupHeader = reader.decode().await?;
	log::trace!("received subgroup: {:?}", header);

	let state = match subscriber.get_subscribe(header.track_alias) {
		Some(state) => state,
		None => {
			log::warn!("subgroup for unknown track alias={}", header.track_alias);
			reader.stop(ResetCode::Cancelled.code());
			return Ok(());
		}
	};

	let mut callback = match state.lock().begin_subgroup(header.group, header.subgroup, header.publisher_priority) {
		Some(Ok(callback)) => Some(callback),
		Some(Err(err)) => {
			log::warn!("begin subgroup rejected: {}", err);
			reader.stop(ResetCode::Cancelled.code());
			return Ok(());
		}
		// Already unsubscribed: drain the stream without dispatching.
		None => None,
	};

	match recv_subgroup_objects::<T>(&state, &header, &mut callback, reader).await {
		Ok(()) => {
			// Clean FIN: deliver the end unless a terminal status already did.
			if !state.lock().cancelled() {
				if let Some(mut callback) = callback.take() {
					callback.end_of_subgroup().ok();
				}
			}
			Ok(())
		}
		Err(SessionError::Transport(TransportError::Reset(code))) => {
			if !state.lock().cancelled() {
				if let Some(mut callback) = callback.take() {
					callback.reset(ResetCode::from_code(code));
				}
			}
			Ok(())
		}
		Err(err) => Err(err),
	}
}

async fn recv_subgroup_objects<T: Transport>(
	state: &Lock<SubscribeRecv>,
	header: &data::SubgroupHeader,
	callback: &mut Option<Box<dyn SubgroupConsumer>>,
	reader: &mut Reader<T::RecvStream>,
) -> Result<(), SessionError> {
	while !reader.done().await? {
		let object: data::SubgroupObject = reader.decode().await?;
		log::trace!("received object: {:?}", object);

		// An unsubscribe may race the stream; drain without dispatching.
		if state.lock().cancelled() {
			*callback = None;
		}

		let res = match object.status {
			ObjectStatus::Normal => {
				recv_payload::<T>(callback, reader, object.object_id, object.length).await?
			}
			ObjectStatus::ObjectNotExist => match callback.as_mut() {
				Some(callback) => callback.object_not_exists(object.object_id, false),
				None => Ok(()),
			},
			ObjectStatus::GroupNotExist => {
				// A track-level event; the subgroup is done afterwards.
				state
					.lock()
					.group_not_exists(header.group, header.subgroup, header.publisher_priority);
				*callback = None;
				Ok(())
			}
			ObjectStatus::EndOfGroup => {
				let res = match callback.as_mut() {
					Some(callback) => callback.end_of_group(object.object_id),
					None => Ok(()),
				};
				*callback = None;
				res
			}
			ObjectStatus::EndOfTrackAndGroup => {
				let res = match callback.as_mut() {
					Some(callback) => callback.end_of_track_and_group(object.object_id),
					None => Ok(()),
				};
				*callback = None;
				res
			}
			ObjectStatus::EndOfSubgroup => {
				let res = match callback.as_mut() {
					Some(callback) => callback.end_of_subgroup(),
					None => Ok(()),
				};
				*callback = None;
				res
			}
		};

		if let Err(err) = res {
			log::warn!("subgroup consumer failed: {}", err);
			reader.stop(ResetCode::Cancelled.code());
			*callback = None;
			return Ok(());
		}
	}

	Ok(())
}

// Read one object's payload, dispatching it whole or in pieces.
async fn recv_payload<T: Transport>(
	callback: &mut Option<Box<dyn SubgroupConsumer>>,
	reader: &mut Reader<T::RecvStream>,
	object_id: u64,
	length: u64,
) -> Result<Result<(), crate::error::PublishError>, SessionError> {
	let mut remain = length as usize;

	if remain == 0 {
		let res = match callback.as_mut() {
			Some(callback) => callback.object(object_id, bytes::Bytes::new(), false),
			None => Ok(()),
		};
		return Ok(res);
	}

	let first = reader.read_chunk(remain).await?.ok_or(SessionError::WrongSize)?;
	remain -= first.len();

	if remain == 0 {
		let res = match callback.as_mut() {
			Some(callback) => callback.object(object_id, first, false),
			None => Ok(()),
		};
		return Ok(res);
	}

	if let Some(cb) = callback.as_mut() {
		if let Err(err) = cb.begin_object(object_id, length, first) {
			// Keep draining so the parser stays aligned.
			*callback = None;
			// Consume the rest of the object before reporting.
			drain_payload::<T>(reader, remain).await?;
			return Ok(Err(err));
		}
	}

	while remain > 0 {
		let chunk = reader.read_chunk(remain).await?.ok_or(SessionError::WrongSize)?;
		remain -= chunk.len();

		let done = remain == 0;
		let res = match callback.as_mut() {
			Some(callback) => callback.object_payload(chunk, false).map(|status| {
				debug_assert_eq!(status == ObjectPublishStatus::Done, done);
			}),
			None => Ok(()),
		};

		if let Err(err) = res {
			*callback = None;
			drain_payload::<T>(reader, remain).await?;
			return Ok(Err(err));
		}
	}

	Ok(Ok(()))
}

async fn drain_payload<T: Transport>(reader: &mut Reader<T::RecvStream>, mut remain: usize) -> Result<(), SessionError> {
	while remain > 0 {
		let chunk = reader.read_chunk(remain).await?.ok_or(SessionError::WrongSize)?;
		remain -= chunk.len();
	}
	Ok(())
}

async fn recv_fetch<T: Transport>(
	subscriber: &Subscriber<T>,
	reader: &mut Reader<T::RecvStream>,
) -> Result<(), SessionError> {
	let header: data::FetchHeader = reader.decode().await?;
	log::trace!("received fetch response: {:?}", header);

	let subscribe_id = header.subscribe_id;
	let state = match subscriber.get_fetch(subscribe_id) {
		Some(state) => state,
		None => {
			log::warn!("fetch response for unknown id={}", subscribe_id);
			reader.stop(ResetCode::Cancelled.code());
			return Ok(());
		}
	};

	let res = recv_fetch_objects(subscriber, &state, subscribe_id, reader).await;

	match res {
		Ok(()) => {
			state.lock().end_of_fetch();
			subscriber.fetch_stream_done(subscribe_id);
			Ok(())
		}
		Err(SessionError::Transport(TransportError::Reset(code))) => {
			state.lock().reset(ResetCode::from_code(code));
			subscriber.fetch_stream_done(subscribe_id);
			Ok(())
		}
		Err(err) => Err(err),
	}
}

async fn recv_fetch_objects<T: Transport>(
	subscriber: &Subscriber<T>,
	state: &Lock<super::FetchRecv>,
	subscribe_id: u64,
	reader: &mut Reader<T::RecvStream>,
) -> Result<(), SessionError> {
	while !reader.done().await? {
		let object: data::FetchObject = reader.decode().await?;
		log::trace!("received fetch object: {:?}", object);

		let res = match object.status {
			ObjectStatus::Normal => {
				let mut remain = object.length as usize;

				if remain == 0 {
					state
						.lock()
						.object(object.group, object.subgroup, object.object_id, bytes::Bytes::new())
				} else {
					let first = reader.read_chunk(remain).await?.ok_or(SessionError::WrongSize)?;
					remain -= first.len();

					if remain == 0 {
						state.lock().object(object.group, object.subgroup, object.object_id, first)
					} else {
						let mut res = state.lock().begin_object(
							object.group,
							object.subgroup,
							object.object_id,
							object.length,
							first,
						);

						while remain > 0 {
							let chunk = reader.read_chunk(remain).await?.ok_or(SessionError::WrongSize)?;
							remain -= chunk.len();

							if res.is_ok() {
								res = state.lock().object_payload(chunk, remain == 0);
							}
						}

						res
					}
				}
			}
			ObjectStatus::ObjectNotExist => {
				state
					.lock()
					.object_not_exists(object.group, object.subgroup, object.object_id)
			}
			ObjectStatus::GroupNotExist => state.lock().group_not_exists(object.group, object.subgroup),
			ObjectStatus::EndOfGroup => {
				state
					.lock()
					.end_of_group(object.group, object.subgroup, object.object_id)
			}
			ObjectStatus::EndOfTrackAndGroup => {
				// Terminal for the fetch; the entry may retire immediately.
				let res = state
					.lock()
					.end_of_track_and_group(object.group, object.subgroup, object.object_id);
				subscriber.fetch_stream_done(subscribe_id);
				res
			}
			ObjectStatus::EndOfSubgroup => {
				state.lock().end_of_fetch();
				subscriber.fetch_stream_done(subscribe_id);
				Ok(())
			}
		};

		if let Err(err) = res {
			log::warn!("fetch consumer failed: {}", err);
			reader.stop(ResetCode::Cancelled.code());
			state.lock().cancel();
			return Ok(());
		}
	}

	Ok(())
}

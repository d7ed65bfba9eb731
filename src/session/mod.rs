//! The session: setup, control stream loops, and request correlation.
mod consume;
mod error;
mod fetch;
mod priority;
mod publisher;
mod reader;
mod stream;
mod subscribe;
mod subscriber;
mod track;
mod writer;

pub use error::*;
pub use priority::*;
pub use publisher::*;
pub use stream::StreamPublisher;
pub use subscriber::*;
pub use track::*;

use fetch::*;
use reader::*;
use stream::{Parent, StreamWeak};
use subscribe::*;
use writer::*;

use std::time::Duration;

use futures::{stream::FuturesUnordered, FutureExt, StreamExt};

use crate::coding::Params;
use crate::message::{self, Message};
use crate::setup;
use crate::transport::Transport;
use crate::util::Queue;

const SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// An incoming control message for the application to handle.
///
/// Requests that the session answers itself (SubscribeOk, MaxSubscribeId, ...)
/// never appear here.
#[derive(Clone, Debug)]
pub enum ControlMessage {
	Subscribe(message::Subscribe),
	SubscribeUpdate(message::SubscribeUpdate),
	Unsubscribe(message::Unsubscribe),
	Fetch(message::Fetch),
	Announce(message::Announce),
	Unannounce(message::Unannounce),
	AnnounceCancel(message::AnnounceCancel),
	SubscribeAnnounces(message::SubscribeAnnounces),
	UnsubscribeAnnounces(message::UnsubscribeAnnounces),
	TrackStatusRequest(message::TrackStatusRequest),
	TrackStatus(message::TrackStatus),
	GoAway(message::GoAway),
}

/// The application's handle to the incoming control messages.
pub struct ControlMessages {
	queue: Queue<ControlMessage, SessionError>,
}

impl ControlMessages {
	pub async fn next(&mut self) -> Result<ControlMessage, SessionError> {
		self.queue.pop().await
	}
}

/// An established session; [Session::run] drives it until it errors or drains.
#[must_use = "run() must be called"]
#[derive(Debug)]
pub struct Session<T: Transport> {
	transport: T,
	writer: Writer<T::SendStream>,
	reader: Reader<T::RecvStream>,

	outgoing: Queue<Message, SessionError>,
	control: Queue<ControlMessage, SessionError>,

	publisher: Publisher<T>,
	subscriber: Subscriber<T>,
}

impl<T: Transport> Session<T> {
	fn new(
		transport: T,
		writer: Writer<T::SendStream>,
		reader: Reader<T::RecvStream>,
		max_subscribes: u64,
		peer_max_subscribes: u64,
	) -> (Self, Publisher<T>, Subscriber<T>) {
		let outgoing = Queue::default();
		let control = Queue::default();

		let publisher = Publisher::new(transport.clone(), outgoing.clone(), control.clone(), max_subscribes);
		let subscriber = Subscriber::new(outgoing.clone(), peer_max_subscribes);

		let session = Self {
			transport,
			writer,
			reader,
			outgoing,
			control,
			publisher: publisher.clone(),
			subscriber: subscriber.clone(),
		};

		(session, publisher, subscriber)
	}

	/// Establish a session as the client, advertising `max_subscribes`
	/// concurrent requests to the peer.
	pub async fn connect(
		transport: T,
		max_subscribes: u64,
	) -> Result<(Session<T>, Publisher<T>, Subscriber<T>), SessionError> {
		match Self::connect_setup(&transport, max_subscribes).await {
			Ok((writer, reader, peer_max)) => Ok(Self::new(transport, writer, reader, max_subscribes, peer_max)),
			Err(err) => {
				transport.close(err.code(), &err.to_string());
				Err(err)
			}
		}
	}

	async fn connect_setup(
		transport: &T,
		max_subscribes: u64,
	) -> Result<(Writer<T::SendStream>, Reader<T::RecvStream>, u64), SessionError> {
		let (send, recv) = transport.open_bi().await?;
		let mut writer = Writer::new(send);
		let mut reader = Reader::new(recv);

		let mut params = Params::new();
		params.set(setup::MAX_SUBSCRIBE_ID, max_subscribes)?;

		let client = setup::Client {
			versions: [setup::Version::CURRENT].into(),
			params,
		};
		log::debug!("sending client SETUP: {:?}", client);
		writer.encode(&client).await?;

		let server: setup::Server = tokio::time::timeout(SETUP_TIMEOUT, reader.decode())
			.await
			.map_err(|_| SessionError::SetupTimeout)??;
		log::debug!("received server SETUP: {:?}", server);

		if server.version != setup::Version::CURRENT {
			return Err(SessionError::Version(
				[server.version].into(),
				[setup::Version::CURRENT].into(),
			));
		}

		let peer_max = server.params.get::<u64>(setup::MAX_SUBSCRIBE_ID)?.unwrap_or(0);

		Ok((writer, reader, peer_max))
	}

	/// Establish a session as the server.
	pub async fn accept(
		transport: T,
		max_subscribes: u64,
	) -> Result<(Session<T>, Publisher<T>, Subscriber<T>), SessionError> {
		match Self::accept_setup(&transport, max_subscribes).await {
			Ok((writer, reader, peer_max)) => Ok(Self::new(transport, writer, reader, max_subscribes, peer_max)),
			Err(err) => {
				transport.close(err.code(), &err.to_string());
				Err(err)
			}
		}
	}

	async fn accept_setup(
		transport: &T,
		max_subscribes: u64,
	) -> Result<(Writer<T::SendStream>, Reader<T::RecvStream>, u64), SessionError> {
		let (send, recv) = transport.accept_bi().await?;
		let mut writer = Writer::new(send);
		let mut reader = Reader::new(recv);

		let client: setup::Client = reader.decode().await?;
		log::debug!("received client SETUP: {:?}", client);

		if !client.versions.contains(&setup::Version::CURRENT) {
			return Err(SessionError::Version(
				client.versions,
				[setup::Version::CURRENT].into(),
			));
		}

		let peer_max = client.params.get::<u64>(setup::MAX_SUBSCRIBE_ID)?.unwrap_or(0);

		let mut params = Params::new();
		params.set(setup::MAX_SUBSCRIBE_ID, max_subscribes)?;

		let server = setup::Server {
			version: setup::Version::CURRENT,
			params,
		};
		log::debug!("sending server SETUP: {:?}", server);
		writer.encode(&server).await?;

		Ok((writer, reader, peer_max))
	}

	/// The incoming control messages the application must handle.
	pub fn control_messages(&self) -> ControlMessages {
		ControlMessages {
			queue: self.control.clone(),
		}
	}

	/// Drive the session until it fails or drains.
	///
	/// On exit every pending request resolves with an error, every publisher
	/// is reset and the transport is closed with the matching code.
	pub async fn run(self) -> Result<(), SessionError> {
		let transport = self.transport.clone();
		let publisher = self.publisher.clone();
		let subscriber = self.subscriber.clone();
		let outgoing = self.outgoing.clone();
		let control = self.control.clone();

		let mut tasks = FuturesUnordered::new();
		tasks.push(Self::run_send(self.outgoing, self.writer).boxed());
		tasks.push(Self::run_recv(self.reader, self.publisher, self.subscriber, self.control).boxed());
		tasks.push(Self::run_streams(transport.clone(), subscriber.clone()).boxed());
		tasks.push(Self::run_datagrams(transport.clone(), subscriber.clone()).boxed());

		let err = match tasks.next().await {
			Some(Err(err)) => err,
			_ => SessionError::Internal,
		};

		// Dropping the set cancels the other loops and any stream tasks.
		drop(tasks);

		log::debug!("session closing: {}", err);

		publisher.shutdown(err.clone());
		subscriber.shutdown(err.clone());
		outgoing.close(err.clone()).ok();
		control.close(err.clone()).ok();
		transport.close(err.code(), &err.to_string());

		match err {
			SessionError::Drained => Ok(()),
			err => Err(err),
		}
	}

	async fn run_send(
		outgoing: Queue<Message, SessionError>,
		mut writer: Writer<T::SendStream>,
	) -> Result<(), SessionError> {
		loop {
			let msg = outgoing.pop().await?;
			writer.encode(&msg).await?;
		}
	}

	async fn run_recv(
		mut reader: Reader<T::RecvStream>,
		publisher: Publisher<T>,
		subscriber: Subscriber<T>,
		control: Queue<ControlMessage, SessionError>,
	) -> Result<(), SessionError> {
		loop {
			let msg: Message = reader.decode().await?;
			log::debug!("received message: {:?}", msg);

			match msg {
				// Requests we publish in response to.
				Message::Subscribe(msg) => publisher.recv_subscribe(msg)?,
				Message::SubscribeUpdate(msg) => publisher.recv_subscribe_update(msg)?,
				Message::Unsubscribe(msg) => publisher.recv_unsubscribe(msg)?,
				Message::Fetch(msg) => publisher.recv_fetch(msg)?,
				Message::FetchCancel(msg) => publisher.recv_fetch_cancel(msg)?,
				Message::AnnounceOk(msg) => publisher.recv_announce_ok(msg),
				Message::AnnounceError(msg) => publisher.recv_announce_error(msg),

				// Responses to requests we issued.
				Message::SubscribeOk(msg) => subscriber.recv_subscribe_ok(msg),
				Message::SubscribeError(msg) => subscriber.recv_subscribe_error(msg),
				Message::SubscribeDone(msg) => subscriber.recv_subscribe_done(msg),
				Message::FetchOk(msg) => subscriber.recv_fetch_ok(msg),
				Message::FetchError(msg) => subscriber.recv_fetch_error(msg),
				Message::MaxSubscribeId(msg) => subscriber.recv_max_subscribe_id(msg)?,
				Message::SubscribeAnnouncesOk(msg) => subscriber.recv_subscribe_announces_ok(msg),
				Message::SubscribeAnnouncesError(msg) => subscriber.recv_subscribe_announces_error(msg),

				// Everything else is the application's to answer.
				Message::Announce(msg) => control.push(ControlMessage::Announce(msg))?,
				Message::Unannounce(msg) => control.push(ControlMessage::Unannounce(msg))?,
				Message::AnnounceCancel(msg) => control.push(ControlMessage::AnnounceCancel(msg))?,
				Message::SubscribeAnnounces(msg) => control.push(ControlMessage::SubscribeAnnounces(msg))?,
				Message::UnsubscribeAnnounces(msg) => control.push(ControlMessage::UnsubscribeAnnounces(msg))?,
				Message::TrackStatusRequest(msg) => control.push(ControlMessage::TrackStatusRequest(msg))?,
				Message::TrackStatus(msg) => control.push(ControlMessage::TrackStatus(msg))?,
				Message::GoAway(msg) => control.push(ControlMessage::GoAway(msg))?,
			}
		}
	}

	async fn run_streams(transport: T, subscriber: Subscriber<T>) -> Result<(), SessionError> {
		let mut tasks = FuturesUnordered::new();

		loop {
			tokio::select! {
				res = transport.accept_uni() => {
					let stream = res?;
					tasks.push(consume::run(subscriber.clone(), stream));
				},
				res = tasks.next(), if !tasks.is_empty() => res.unwrap()?,
			};
		}
	}

	async fn run_datagrams(transport: T, subscriber: Subscriber<T>) -> Result<(), SessionError> {
		loop {
			let datagram = transport.recv_datagram().await?;
			subscriber.recv_datagram(datagram)?;
		}
	}
}

#[cfg(test)]
mod tests {
	use bytes::{Bytes, BytesMut};
	use tokio::sync::mpsc;

	use crate::consumers::*;
	use crate::data::ObjectHeader;
	use crate::error::{PublishError, ResetCode};
	use crate::message::{Filter, FullTrackName, GroupOrder, Location, TrackNamespace};
	use crate::transport::mock;

	use super::*;

	#[derive(Debug, PartialEq)]
	enum Event {
		Subgroup { group: u64, subgroup: u64, priority: u8 },
		Object { object_id: u64, payload: Bytes },
		EndOfGroup { object_id: u64 },
		EndOfSubgroup,
		GroupNotExists { group: u64, subgroup: u64 },
		Datagram { object_id: u64, payload: Bytes },
		Done { status_code: u64 },
		Reset(ResetCode),
	}

	struct TrackEvents {
		events: mpsc::UnboundedSender<Event>,
	}

	#[async_trait::async_trait]
	impl TrackConsumer for TrackEvents {
		fn begin_subgroup(
			&mut self,
			group: u64,
			subgroup: u64,
			priority: u8,
		) -> Result<Box<dyn SubgroupConsumer>, PublishError> {
			self.events.send(Event::Subgroup { group, subgroup, priority }).ok();
			Ok(Box::new(SubgroupEvents {
				events: self.events.clone(),
				partial: None,
			}))
		}

		async fn await_stream_credit(&mut self) -> Result<(), PublishError> {
			Ok(())
		}

		fn object_stream(&mut self, _header: &ObjectHeader, _payload: Bytes) -> Result<(), PublishError> {
			Ok(())
		}

		fn group_not_exists(&mut self, group: u64, subgroup: u64, _priority: u8) -> Result<(), PublishError> {
			self.events.send(Event::GroupNotExists { group, subgroup }).ok();
			Ok(())
		}

		fn datagram(&mut self, header: &ObjectHeader, payload: Bytes) -> Result<(), PublishError> {
			self.events
				.send(Event::Datagram {
					object_id: header.object_id,
					payload,
				})
				.ok();
			Ok(())
		}

		fn subscribe_done(&mut self, done: message::SubscribeDone) -> Result<(), PublishError> {
			self.events
				.send(Event::Done {
					status_code: done.status_code,
				})
				.ok();
			Ok(())
		}
	}

	struct SubgroupEvents {
		events: mpsc::UnboundedSender<Event>,
		partial: Option<(u64, u64, BytesMut)>,
	}

	impl SubgroupConsumer for SubgroupEvents {
		fn object(&mut self, object_id: u64, payload: Bytes, _fin_stream: bool) -> Result<(), PublishError> {
			self.events.send(Event::Object { object_id, payload }).ok();
			Ok(())
		}

		fn object_not_exists(&mut self, _object_id: u64, _fin_stream: bool) -> Result<(), PublishError> {
			Ok(())
		}

		fn begin_object(&mut self, object_id: u64, length: u64, initial: Bytes) -> Result<(), PublishError> {
			let mut buf = BytesMut::new();
			buf.extend_from_slice(&initial);
			self.partial = Some((object_id, length - initial.len() as u64, buf));
			Ok(())
		}

		fn object_payload(
			&mut self,
			payload: Bytes,
			_fin_stream: bool,
		) -> Result<ObjectPublishStatus, PublishError> {
			let (_, remain, buf) = self.partial.as_mut().unwrap();
			buf.extend_from_slice(&payload);
			*remain -= payload.len() as u64;

			if *remain > 0 {
				return Ok(ObjectPublishStatus::InProgress);
			}

			let (object_id, _, buf) = self.partial.take().unwrap();
			self.events
				.send(Event::Object {
					object_id,
					payload: buf.freeze(),
				})
				.ok();
			Ok(ObjectPublishStatus::Done)
		}

		fn end_of_group(&mut self, object_id: u64) -> Result<(), PublishError> {
			self.events.send(Event::EndOfGroup { object_id }).ok();
			Ok(())
		}

		fn end_of_track_and_group(&mut self, object_id: u64) -> Result<(), PublishError> {
			self.events.send(Event::EndOfGroup { object_id }).ok();
			Ok(())
		}

		fn end_of_subgroup(&mut self) -> Result<(), PublishError> {
			self.events.send(Event::EndOfSubgroup).ok();
			Ok(())
		}

		fn reset(&mut self, code: ResetCode) {
			self.events.send(Event::Reset(code)).ok();
		}
	}

	#[derive(Debug, PartialEq)]
	enum FetchEvent {
		Object {
			group: u64,
			subgroup: u64,
			object_id: u64,
			payload: Bytes,
		},
		EndOfFetch,
		Reset(ResetCode),
	}

	struct FetchEvents {
		events: mpsc::UnboundedSender<FetchEvent>,
	}

	#[async_trait::async_trait]
	impl FetchConsumer for FetchEvents {
		fn object(
			&mut self,
			group: u64,
			subgroup: u64,
			object_id: u64,
			payload: Bytes,
			_fin_fetch: bool,
		) -> Result<(), PublishError> {
			self.events
				.send(FetchEvent::Object {
					group,
					subgroup,
					object_id,
					payload,
				})
				.ok();
			Ok(())
		}

		fn object_not_exists(
			&mut self,
			_group: u64,
			_subgroup: u64,
			_object_id: u64,
			_fin_fetch: bool,
		) -> Result<(), PublishError> {
			Ok(())
		}

		fn group_not_exists(&mut self, _group: u64, _subgroup: u64, _fin_fetch: bool) -> Result<(), PublishError> {
			Ok(())
		}

		fn begin_object(
			&mut self,
			_group: u64,
			_subgroup: u64,
			_object_id: u64,
			_length: u64,
			_initial: Bytes,
		) -> Result<(), PublishError> {
			Ok(())
		}

		fn object_payload(
			&mut self,
			_payload: Bytes,
			_fin_fetch: bool,
		) -> Result<ObjectPublishStatus, PublishError> {
			Ok(ObjectPublishStatus::Done)
		}

		fn end_of_group(
			&mut self,
			_group: u64,
			_subgroup: u64,
			_object_id: u64,
			_fin_fetch: bool,
		) -> Result<(), PublishError> {
			Ok(())
		}

		fn end_of_track_and_group(
			&mut self,
			_group: u64,
			_subgroup: u64,
			_object_id: u64,
		) -> Result<(), PublishError> {
			Ok(())
		}

		fn end_of_fetch(&mut self) -> Result<(), PublishError> {
			self.events.send(FetchEvent::EndOfFetch).ok();
			Ok(())
		}

		fn reset(&mut self, code: ResetCode) {
			self.events.send(FetchEvent::Reset(code)).ok();
		}

		async fn await_ready(&mut self) -> Result<(), PublishError> {
			Ok(())
		}
	}

	fn subscribe_msg(namespace: &str, name: &str) -> message::Subscribe {
		message::Subscribe {
			subscribe_id: 0,
			track_alias: 0,
			full_track_name: FullTrackName::new(TrackNamespace::new([namespace]), name),
			subscriber_priority: 128,
			group_order: GroupOrder::Default,
			filter: Filter::LatestGroup,
			params: Params::new(),
		}
	}

	fn fetch_msg(namespace: &str, name: &str) -> message::Fetch {
		message::Fetch {
			subscribe_id: 0,
			full_track_name: FullTrackName::new(TrackNamespace::new([namespace]), name),
			subscriber_priority: 128,
			group_order: GroupOrder::Default,
			start: Location { group: 0, object: 0 },
			end: Location { group: 1, object: 1 },
			params: Params::new(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn setup_timeout() {
		let (client, _server) = mock::pair();

		let err = Session::connect(client.clone(), 100).await.unwrap_err();
		assert!(matches!(err, SessionError::SetupTimeout));
		assert_eq!(client.close_code(), Some(0x1));
	}

	#[tokio::test]
	async fn version_mismatch() {
		let (client, server) = mock::pair();

		// A peer speaking only an older draft.
		tokio::spawn(async move {
			let (send, _recv) = client.open_bi().await.unwrap();
			let mut writer = Writer::new(send);
			writer
				.encode(&setup::Client {
					versions: [setup::Version(0xff000001)].into(),
					params: Params::new(),
				})
				.await
				.unwrap();
		});

		let err = Session::accept(server.clone(), 100).await.unwrap_err();
		assert!(matches!(err, SessionError::Version(..)));
		assert_eq!(server.close_code(), Some(0x2));
	}

	#[tokio::test]
	async fn subscribe_delivery() {
		let (client_transport, server_transport) = mock::pair();

		let server = tokio::spawn(async move {
			let (session, mut publisher, _subscriber) = Session::accept(server_transport, 100).await.unwrap();
			let mut control = session.control_messages();
			tokio::spawn(session.run());

			let sub = match control.next().await.unwrap() {
				ControlMessage::Subscribe(sub) => sub,
				msg => panic!("unexpected message: {:?}", msg),
			};
			assert_eq!(sub.subscribe_id, 0);
			assert_eq!(
				sub.full_track_name,
				FullTrackName::new(TrackNamespace::new(["live"]), "cam")
			);

			let mut track = publisher
				.subscribe_ok(message::SubscribeOk {
					subscribe_id: sub.subscribe_id,
					expires: 0,
					group_order: GroupOrder::OldestFirst,
					largest: None,
					params: Params::new(),
				})
				.unwrap();

			let mut subgroup = track.begin_subgroup(7, 0, 128).unwrap();
			subgroup.object(0, Bytes::from_static(b"hello"), true).unwrap();
		});

		let (session, _publisher, mut subscriber) = Session::connect(client_transport, 100).await.unwrap();
		tokio::spawn(session.run());

		let (tx, mut rx) = mpsc::unbounded_channel();
		let ok = subscriber
			.subscribe(subscribe_msg("live", "cam"), Box::new(TrackEvents { events: tx }))
			.await
			.unwrap();
		assert_eq!(ok.subscribe_id, 0);
		assert_eq!(ok.group_order, GroupOrder::OldestFirst);

		assert_eq!(
			rx.recv().await.unwrap(),
			Event::Subgroup {
				group: 7,
				subgroup: 0,
				priority: 128
			}
		);
		assert_eq!(
			rx.recv().await.unwrap(),
			Event::Object {
				object_id: 0,
				payload: Bytes::from_static(b"hello")
			}
		);
		assert_eq!(rx.recv().await.unwrap(), Event::EndOfSubgroup);

		server.await.unwrap();
	}

	#[tokio::test]
	async fn subscribe_reject() {
		let (client_transport, server_transport) = mock::pair();

		let server = tokio::spawn(async move {
			let (session, mut publisher, _subscriber) = Session::accept(server_transport, 100).await.unwrap();
			let mut control = session.control_messages();
			tokio::spawn(session.run());

			let sub = match control.next().await.unwrap() {
				ControlMessage::Subscribe(sub) => sub,
				msg => panic!("unexpected message: {:?}", msg),
			};

			publisher
				.subscribe_error(message::SubscribeError {
					subscribe_id: sub.subscribe_id,
					error_code: 404,
					reason: "not found".to_string(),
					track_alias: sub.track_alias,
				})
				.unwrap();
		});

		let (session, _publisher, mut subscriber) = Session::connect(client_transport, 100).await.unwrap();
		tokio::spawn(session.run());

		let (tx, _rx) = mpsc::unbounded_channel();
		let err = subscriber
			.subscribe(subscribe_msg("live", "cam"), Box::new(TrackEvents { events: tx }))
			.await
			.unwrap_err();
		assert_eq!(err.error_code, 404);

		server.await.unwrap();
	}

	#[tokio::test]
	async fn subscribe_done_then_drain() {
		let (client_transport, server_transport) = mock::pair();
		let client_copy = client_transport.clone();

		let server = tokio::spawn(async move {
			let (session, mut publisher, _subscriber) = Session::accept(server_transport, 100).await.unwrap();
			let mut control = session.control_messages();
			tokio::spawn(session.run());

			let sub = match control.next().await.unwrap() {
				ControlMessage::Subscribe(sub) => sub,
				msg => panic!("unexpected message: {:?}", msg),
			};

			let mut track = publisher
				.subscribe_ok(message::SubscribeOk {
					subscribe_id: sub.subscribe_id,
					expires: 0,
					group_order: GroupOrder::OldestFirst,
					largest: None,
					params: Params::new(),
				})
				.unwrap();

			track
				.subscribe_done(message::SubscribeDone {
					subscribe_id: 0,
					status_code: 0x3,
					reason: "track ended".to_string(),
					last: None,
				})
				.unwrap();
		});

		let (session, _publisher, mut subscriber) = Session::connect(client_transport, 100).await.unwrap();
		let client_run = tokio::spawn(session.run());

		let (tx, mut rx) = mpsc::unbounded_channel();
		subscriber
			.subscribe(subscribe_msg("live", "cam"), Box::new(TrackEvents { events: tx }))
			.await
			.unwrap();

		assert_eq!(rx.recv().await.unwrap(), Event::Done { status_code: 0x3 });

		// Every subscription is gone, so draining closes immediately.
		subscriber.drain();
		assert!(client_run.await.unwrap().is_ok());
		assert_eq!(client_copy.close_code(), Some(0x0));

		server.await.unwrap();
	}

	#[tokio::test]
	async fn fetch_delivery() {
		let (client_transport, server_transport) = mock::pair();
		let client_copy = client_transport.clone();

		let server = tokio::spawn(async move {
			let (session, mut publisher, _subscriber) = Session::accept(server_transport, 100).await.unwrap();
			let mut control = session.control_messages();
			tokio::spawn(session.run());

			let fetch = match control.next().await.unwrap() {
				ControlMessage::Fetch(fetch) => fetch,
				msg => panic!("unexpected message: {:?}", msg),
			};
			assert_eq!(fetch.subscribe_id, 0);

			let mut consumer = publisher
				.fetch_ok(message::FetchOk {
					subscribe_id: fetch.subscribe_id,
					group_order: GroupOrder::OldestFirst,
					end_of_track: false,
					largest: Location { group: 1, object: 1 },
					params: Params::new(),
				})
				.unwrap();

			consumer.object(1, 0, 0, Bytes::from_static(b"a"), false).unwrap();
			consumer.object(1, 0, 1, Bytes::from_static(b"b"), true).unwrap();
		});

		let (session, _publisher, mut subscriber) = Session::connect(client_transport, 100).await.unwrap();
		let client_run = tokio::spawn(session.run());

		let (tx, mut rx) = mpsc::unbounded_channel();
		let ok = subscriber
			.fetch(fetch_msg("live", "cam"), Box::new(FetchEvents { events: tx }))
			.await
			.unwrap();
		assert_eq!(ok.subscribe_id, 0);

		assert_eq!(
			rx.recv().await.unwrap(),
			FetchEvent::Object {
				group: 1,
				subgroup: 0,
				object_id: 0,
				payload: Bytes::from_static(b"a")
			}
		);
		assert_eq!(
			rx.recv().await.unwrap(),
			FetchEvent::Object {
				group: 1,
				subgroup: 0,
				object_id: 1,
				payload: Bytes::from_static(b"b")
			}
		);
		assert_eq!(rx.recv().await.unwrap(), FetchEvent::EndOfFetch);

		// The fetch retired once both the OK and the FIN were seen.
		subscriber.drain();
		assert!(client_run.await.unwrap().is_ok());
		assert_eq!(client_copy.close_code(), Some(0x0));

		server.await.unwrap();
	}

	#[tokio::test]
	async fn datagram_delivery() {
		let (client_transport, server_transport) = mock::pair();

		let server = tokio::spawn(async move {
			let (session, mut publisher, _subscriber) = Session::accept(server_transport, 100).await.unwrap();
			let mut control = session.control_messages();
			tokio::spawn(session.run());

			let sub = match control.next().await.unwrap() {
				ControlMessage::Subscribe(sub) => sub,
				msg => panic!("unexpected message: {:?}", msg),
			};

			let mut track = publisher
				.subscribe_ok(message::SubscribeOk {
					subscribe_id: sub.subscribe_id,
					expires: 0,
					group_order: GroupOrder::OldestFirst,
					largest: None,
					params: Params::new(),
				})
				.unwrap();

			track
				.datagram(
					&ObjectHeader {
						group: 1,
						subgroup: 2,
						object_id: 2,
						priority: 128,
						status: crate::data::ObjectStatus::Normal,
						length: Some(5),
					},
					Bytes::from_static(b"hello"),
				)
				.unwrap();
		});

		let (session, _publisher, mut subscriber) = Session::connect(client_transport, 100).await.unwrap();
		tokio::spawn(session.run());

		let (tx, mut rx) = mpsc::unbounded_channel();
		subscriber
			.subscribe(subscribe_msg("live", "cam"), Box::new(TrackEvents { events: tx }))
			.await
			.unwrap();

		assert_eq!(
			rx.recv().await.unwrap(),
			Event::Datagram {
				object_id: 2,
				payload: Bytes::from_static(b"hello")
			}
		);

		server.await.unwrap();
	}

	#[tokio::test]
	async fn announce_flow() {
		let (client_transport, server_transport) = mock::pair();

		let server = tokio::spawn(async move {
			let (session, _publisher, mut subscriber) = Session::accept(server_transport, 100).await.unwrap();
			let mut control = session.control_messages();
			tokio::spawn(session.run());

			let announce = match control.next().await.unwrap() {
				ControlMessage::Announce(announce) => announce,
				msg => panic!("unexpected message: {:?}", msg),
			};
			assert_eq!(announce.namespace, TrackNamespace::new(["live", "events"]));

			subscriber
				.announce_ok(message::AnnounceOk {
					namespace: announce.namespace,
				})
				.unwrap();
		});

		let (session, mut publisher, _subscriber) = Session::connect(client_transport, 100).await.unwrap();
		tokio::spawn(session.run());

		let ok = publisher
			.announce(message::Announce {
				namespace: TrackNamespace::new(["live", "events"]),
				params: Params::new(),
			})
			.await
			.unwrap();
		assert_eq!(ok.namespace, TrackNamespace::new(["live", "events"]));

		server.await.unwrap();
	}

	#[tokio::test]
	async fn credit_grant() {
		let (transport, _peer) = mock::pair();
		let outgoing = Queue::default();
		let control = Queue::default();
		let mut publisher = Publisher::new(transport, outgoing.clone(), control, 4);

		fn raw_subscribe(subscribe_id: u64) -> message::Subscribe {
			let mut msg = subscribe_msg("test", "track");
			msg.subscribe_id = subscribe_id;
			msg.track_alias = subscribe_id;
			msg
		}

		publisher.recv_subscribe(raw_subscribe(0)).unwrap();
		publisher.recv_subscribe(raw_subscribe(1)).unwrap();

		for subscribe_id in [0, 1] {
			publisher
				.subscribe_error(message::SubscribeError {
					subscribe_id,
					error_code: 404,
					reason: "not found".to_string(),
					track_alias: subscribe_id,
				})
				.unwrap();
		}

		// Two terminations with a limit of four: a new window of 4 + 2.
		assert!(matches!(outgoing.pop().await.unwrap(), Message::SubscribeError(_)));
		assert!(matches!(outgoing.pop().await.unwrap(), Message::SubscribeError(_)));
		match outgoing.pop().await.unwrap() {
			Message::MaxSubscribeId(msg) => assert_eq!(msg.subscribe_id, 6),
			msg => panic!("unexpected message: {:?}", msg),
		}
	}

	#[tokio::test]
	async fn fetch_cancel_retires_id() {
		let (transport, _peer) = mock::pair();
		let outgoing = Queue::default();
		let publisher = Publisher::new(transport, outgoing.clone(), Queue::default(), 2);

		publisher.recv_fetch(fetch_msg("test", "track")).unwrap();
		publisher.recv_fetch_cancel(message::FetchCancel { subscribe_id: 0 }).unwrap();

		// One termination with a limit of two: a new window of 2 + 1.
		match outgoing.pop().await.unwrap() {
			Message::MaxSubscribeId(msg) => assert_eq!(msg.subscribe_id, 3),
			msg => panic!("unexpected message: {:?}", msg),
		}

		// A second cancel for the same ID is a no-op.
		publisher.recv_fetch_cancel(message::FetchCancel { subscribe_id: 0 }).unwrap();
	}

	#[tokio::test]
	async fn fetch_cancel_ignores_subscriptions() {
		let (transport, _peer) = mock::pair();
		let outgoing = Queue::default();
		let mut publisher = Publisher::new(transport, outgoing.clone(), Queue::default(), 2);

		publisher.recv_subscribe(subscribe_msg("test", "track")).unwrap();

		// A FetchCancel aimed at a subscription's ID must not touch it.
		publisher.recv_fetch_cancel(message::FetchCancel { subscribe_id: 0 }).unwrap();

		// The subscription is still live and can be accepted.
		publisher
			.subscribe_ok(message::SubscribeOk {
				subscribe_id: 0,
				expires: 0,
				group_order: GroupOrder::OldestFirst,
				largest: None,
				params: Params::new(),
			})
			.unwrap();
		assert!(matches!(outgoing.pop().await.unwrap(), Message::SubscribeOk(_)));
	}

	#[tokio::test]
	async fn subscribe_id_out_of_range() {
		let (transport, _peer) = mock::pair();
		let publisher = Publisher::new(transport, Queue::default(), Queue::default(), 4);

		let mut msg = subscribe_msg("test", "track");
		msg.subscribe_id = 4;
		msg.track_alias = 4;

		assert!(matches!(
			publisher.recv_subscribe(msg),
			Err(SessionError::TooManySubscribes)
		));
	}

	#[tokio::test]
	async fn subscribe_limit_closes_session() {
		let (client_transport, server_transport) = mock::pair();
		let server_copy = server_transport.clone();

		let server = tokio::spawn(async move {
			// Only one concurrent subscribe is allowed.
			let (session, _publisher, _subscriber) = Session::accept(server_transport, 1).await.unwrap();
			session.run().await
		});

		let (session, _publisher, subscriber) = Session::connect(client_transport, 100).await.unwrap();
		tokio::spawn(session.run());

		let mut first_sub = subscriber.clone();
		let mut second_sub = subscriber;

		let (tx1, _rx1) = mpsc::unbounded_channel();
		let (tx2, _rx2) = mpsc::unbounded_channel();

		let first = tokio::spawn(async move {
			first_sub
				.subscribe(subscribe_msg("a", "b"), Box::new(TrackEvents { events: tx1 }))
				.await
		});
		let second = tokio::spawn(async move {
			second_sub
				.subscribe(subscribe_msg("a", "c"), Box::new(TrackEvents { events: tx2 }))
				.await
		});

		let res = server.await.unwrap();
		assert!(matches!(res, Err(SessionError::TooManySubscribes)));
		assert_eq!(server_copy.close_code(), Some(0x3));

		// Neither request survives the close.
		assert!(first.await.unwrap().is_err());
		assert!(second.await.unwrap().is_err());
	}
}

//! The session core of a Media over QUIC (MoQ) peer.
//!
//! MoQ is a pub/sub protocol on top of QUIC, designed for live media but
//! usable for any live data. This crate implements the session layer: the
//! version-negotiated setup, the bidirectional control stream, and the life
//! cycle of subscriptions (live track delivery) and fetches (bounded range
//! retrievals), framed onto prioritized unidirectional streams and datagrams.
//!
//! The specification is a work in progress and will change.
//! See the [specification](https://datatracker.ietf.org/doc/draft-ietf-moq-transport/) for any updates.
//!
//! The underlying transport is pluggable via [transport::Transport].
mod coding;
mod error;
mod util;

pub mod consumers;
pub mod data;
pub mod message;
pub mod session;
pub mod setup;
pub mod transport;

pub use coding::{Decode, DecodeError, Encode, EncodeError, Params};
pub use consumers::*;
pub use error::*;
pub use session::{
	stream_priority, ControlMessage, ControlMessages, Publisher, Session, SessionError, Subscriber, TrackPublisher,
};

//! Messages exchanged at the start of the session to negotiate the version.
mod client;
mod server;
mod version;

pub use client::*;
pub use server::*;
pub use version::*;

/// Setup parameter: the highest subscribe ID the peer may originate.
pub const MAX_SUBSCRIBE_ID: u64 = 0x2;

//! Pushes an opaque payload to NFC peers as they come and go.
//!
//! Arrival and departure are reported by an external discovery stack; a push
//! worker blocks on the [`coordinator::RendezvousCoordinator`] until a
//! peer-to-peer session is usable, hands the payload to a
//! [`coordinator::Transport`], and waits for the peer to leave before arming
//! again. A [`cancel::CancellationSignal`] unblocks every wait on shutdown.

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod manager;
pub mod messages;
pub mod mqtt;
pub mod presence;
pub mod readiness;
pub mod worker;

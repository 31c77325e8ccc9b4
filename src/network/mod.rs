//! Network subsystem: single-client TCP transport

pub mod slot;
pub mod tcp;

pub use slot::{ConnectionSlot, Link, Listener, SlotEvent};
pub use tcp::{TcpLink, TcpStreamListener};

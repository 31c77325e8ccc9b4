//! Single-client connection slot
//!
//! Holds zero or one client link. A newly accepted link always replaces the
//! held one: the old link is dropped on the spot, with no drain and no
//! notification.

use crate::error::NetworkError;

/// A connected client
pub trait Link {
    /// Whether the peer still looks connected
    fn is_connected(&self) -> bool;

    /// Write one whole message
    fn send(&mut self, message: &[u8]) -> Result<(), NetworkError>;

    /// Human-readable peer identity for logs
    fn peer(&self) -> String;
}

/// Source of incoming links
pub trait Listener {
    type Link: Link;

    /// Accept one pending link without blocking, if any
    fn poll_incoming(&mut self) -> Result<Option<Self::Link>, NetworkError>;
}

/// What a poll did to the slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    /// Nothing pending
    Unchanged,
    /// First link taken into an empty slot
    Accepted { peer: String },
    /// New link displaced the held one
    Replaced { old_peer: String, peer: String },
}

/// Zero-or-one active link fed by a listener
pub struct ConnectionSlot<L: Listener> {
    listener: L,
    active: Option<L::Link>,
    accepted: u64,
    replaced: u64,
}

impl<L: Listener> ConnectionSlot<L> {
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            active: None,
            accepted: 0,
            replaced: 0,
        }
    }

    /// Check the listener and take any pending link into the slot
    pub fn poll_incoming(&mut self) -> Result<SlotEvent, NetworkError> {
        let Some(link) = self.listener.poll_incoming()? else {
            return Ok(SlotEvent::Unchanged);
        };

        let peer = link.peer();
        self.accepted += 1;

        let event = match self.active.replace(link) {
            Some(old) => {
                self.replaced += 1;
                SlotEvent::Replaced {
                    old_peer: old.peer(),
                    peer,
                }
            }
            None => SlotEvent::Accepted { peer },
        };

        Ok(event)
    }

    /// True iff a link is held and reports itself connected
    pub fn is_usable(&self) -> bool {
        self.active.as_ref().is_some_and(|link| link.is_connected())
    }

    /// Send to the held link. The caller checks `is_usable` first; a failed
    /// send leaves the link in place.
    pub fn send(&mut self, message: &[u8]) -> Result<(), NetworkError> {
        match self.active.as_mut() {
            Some(link) => link.send(message),
            None => Err(NetworkError::NoClient),
        }
    }

    /// Drop the held link, returning its peer name
    pub fn release(&mut self) -> Option<String> {
        self.active.take().map(|link| link.peer())
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }

    pub fn peer(&self) -> Option<String> {
        self.active.as_ref().map(|link| link.peer())
    }

    /// Links accepted over the slot's lifetime
    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    /// Accepts that displaced a held link
    pub fn replaced_count(&self) -> u64 {
        self.replaced
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory doubles shared with the driver tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Client side view of a [`MockLink`]
    #[derive(Clone, Default)]
    pub struct MockPeer {
        pub name: String,
        pub received: Arc<Mutex<Vec<Vec<u8>>>>,
        pub disconnected: Arc<AtomicBool>,
        pub fail_writes: Arc<AtomicBool>,
    }

    impl MockPeer {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }

        pub fn messages(&self) -> Vec<Vec<u8>> {
            self.received.lock().unwrap().clone()
        }

        pub fn disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail_writes.store(failing, Ordering::SeqCst);
        }
    }

    pub struct MockLink(pub MockPeer);

    impl Link for MockLink {
        fn is_connected(&self) -> bool {
            !self.0.disconnected.load(Ordering::SeqCst)
        }

        fn send(&mut self, message: &[u8]) -> Result<(), NetworkError> {
            if self.0.fail_writes.load(Ordering::SeqCst) {
                return Err(NetworkError::WriteError("mock write failure".into()));
            }
            self.0.received.lock().unwrap().push(message.to_vec());
            Ok(())
        }

        fn peer(&self) -> String {
            self.0.name.clone()
        }
    }

    /// Listener whose pending connections are queued by the test
    #[derive(Clone, Default)]
    pub struct MockListener {
        pub pending: Arc<Mutex<VecDeque<MockPeer>>>,
    }

    impl MockListener {
        pub fn connect(&self, name: &str) -> MockPeer {
            let peer = MockPeer::new(name);
            self.pending.lock().unwrap().push_back(peer.clone());
            peer
        }
    }

    impl Listener for MockListener {
        type Link = MockLink;

        fn poll_incoming(&mut self) -> Result<Option<MockLink>, NetworkError> {
            Ok(self.pending.lock().unwrap().pop_front().map(MockLink))
        }
    }
}

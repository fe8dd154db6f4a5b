//! Session registry and hub-wide broadcast.

use crate::error::Denial;
use crate::session::{SessionHandle, SessionMessage};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use towber_protocol::ClientId;

/// Temporary ids are handed out from the upper half of the id space so they
/// never collide with player ids.
const TEMPORARY_ID_BASE: u32 = 1 << 31;

type SessionSet = Arc<DashMap<ClientId, SessionHandle>>;

struct Broadcast {
    origin: ClientId,
    message: SessionMessage,
    exclude_origin: bool,
}

/// Holds every live session, split into not-yet-authenticated and logged-in.
pub struct Hub {
    unauthenticated: SessionSet,
    authenticated: SessionSet,
    next_temporary_id: AtomicU32,
    broadcast_tx: mpsc::Sender<Broadcast>,
}

/// The task delivering hub broadcasts. Run it with [`HubWorker::run`].
pub struct HubWorker {
    authenticated: SessionSet,
    broadcast_rx: mpsc::Receiver<Broadcast>,
}

impl Hub {
    pub fn new(broadcast_capacity: usize) -> (Self, HubWorker) {
        let authenticated: SessionSet = Arc::new(DashMap::new());
        let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_capacity);
        let hub = Self {
            unauthenticated: Arc::new(DashMap::new()),
            authenticated: Arc::clone(&authenticated),
            next_temporary_id: AtomicU32::new(TEMPORARY_ID_BASE),
            broadcast_tx,
        };
        let worker = HubWorker {
            authenticated,
            broadcast_rx,
        };
        (hub, worker)
    }

    /// Add a new connection and assign its temporary id.
    pub fn register_unauthenticated(&self, session: SessionHandle) -> ClientId {
        let id = ClientId(self.next_temporary_id.fetch_add(1, Ordering::Relaxed));
        session.set_id(id);
        self.unauthenticated.insert(id, session);
        id
    }

    /// Re-key a session under its player id.
    ///
    /// The insert is decided under the map entry lock, so two concurrent
    /// logins of the same identity cannot both succeed.
    pub fn promote(&self, old: ClientId, new: ClientId, session: &SessionHandle) -> Result<(), Denial> {
        match self.authenticated.entry(new) {
            Entry::Occupied(_) => return Err(Denial::AlreadyLoggedIn),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }
        self.unauthenticated.remove(&old);
        session.set_id(new);
        tracing::debug!(%old, %new, "Session promoted");
        Ok(())
    }

    pub fn lookup(&self, id: ClientId) -> Option<SessionHandle> {
        self.authenticated
            .get(&id)
            .or_else(|| self.unauthenticated.get(&id))
            .map(|entry| entry.value().clone())
    }

    pub fn remove_unauthenticated(&self, id: ClientId) -> bool {
        self.unauthenticated.remove(&id).is_some()
    }

    pub fn remove_authenticated(&self, id: ClientId) -> bool {
        self.authenticated.remove(&id).is_some()
    }

    /// Point-in-time copy of every logged-in session.
    pub fn logged_in(&self) -> Vec<SessionHandle> {
        self.authenticated.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn logged_in_count(&self) -> usize {
        self.authenticated.len()
    }

    pub fn unauthenticated_count(&self) -> usize {
        self.unauthenticated.len()
    }

    /// Queue a message for every logged-in session.
    ///
    /// Never waits: if the broadcast queue is full the broadcast is dropped.
    pub fn broadcast(&self, origin: ClientId, message: SessionMessage, exclude_origin: bool) {
        let broadcast = Broadcast {
            origin,
            message,
            exclude_origin,
        };
        if let Err(e) = self.broadcast_tx.try_send(broadcast) {
            tracing::warn!(%origin, "Dropping hub broadcast: {e}");
        }
    }
}

impl HubWorker {
    pub async fn run(mut self) {
        while let Some(broadcast) = self.broadcast_rx.recv().await {
            let targets: Vec<SessionHandle> = self
                .authenticated
                .iter()
                .filter(|entry| !(broadcast.exclude_origin && *entry.key() == broadcast.origin))
                .map(|entry| entry.value().clone())
                .collect();

            for target in targets {
                // A full inbox drops the message for that recipient only.
                let _ = target.process_message(broadcast.origin, broadcast.message.clone());
            }
        }
        tracing::debug!("Hub broadcast worker stopped");
    }
}

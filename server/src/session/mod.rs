//! Session actors.
//!
//! One actor per connection. Everything that wants to change a session's
//! state (its own read path, peers, hub broadcasts, battle rooms) goes through
//! [`SessionHandle::process_message`], which enqueues into the session's inbox.
//! A single driver task drains that inbox, so message handling and state
//! transitions for one session never run concurrently.
//!
//! State hand-overs that must not be lost, such as a room returning the
//! battle team, go through [`SessionHandle::process_control`] instead. That
//! queue is unbounded and is drained by the same driver after the inbox.
//!
//! Outbound traffic is a bounded queue drained by the transport's write pump.
//! A full queue drops the message instead of stalling the sender.

mod connected;
mod in_battle;
mod in_game;
pub mod lifecycle;
mod state;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub(crate) use state::SessionState;

use crate::battle::{BattleOutcome, BattleRoomHandle};
use crate::error::Denial;
use crate::ServerContext;
use lifecycle::Hook;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use towber_protocol::{BattleEvent, ClientId, ClientMessage, Envelope, ServerMessage, Slot};

/// Everything a session's inbox can carry.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// A message from a client.
    Client(ClientMessage),
    /// Persist the equipped pets now.
    SavePets,
    /// An accepted invite placed this session in a battle room.
    EnterBattle {
        room: BattleRoomHandle,
        slot: Slot,
        opponent: String,
    },
    /// Room-originated battle traffic.
    Battle(BattleEvent),
    /// The room finished and hands the battle team back.
    BattleFinished(BattleOutcome),
}

pub type Inbound = (ClientId, SessionMessage);
pub type Outbound = Envelope<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("session is closed")]
    Closed,
    #[error("session queue is full")]
    Full,
}

/// Cheap, cloneable reference to a session actor.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: AtomicU32,
    inbox: mpsc::Sender<Inbound>,
    control: mpsc::UnboundedSender<Inbound>,
    outbound: mpsc::Sender<Outbound>,
    closed: watch::Sender<bool>,
}

impl SessionHandle {
    pub(crate) fn new(
        inbox: mpsc::Sender<Inbound>,
        control: mpsc::UnboundedSender<Inbound>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                id: AtomicU32::new(0),
                inbox,
                control,
                outbound,
                closed,
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        ClientId(self.inner.id.load(Ordering::Acquire))
    }

    pub(crate) fn set_id(&self, id: ClientId) {
        self.inner.id.store(id.0, Ordering::Release);
    }

    /// Hand a message to the session's driver.
    pub fn process_message(&self, sender: ClientId, message: SessionMessage) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.inner.inbox.try_send((sender, message)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(client = %self.id(), %sender, "Session inbox full, dropping message");
                DeliveryError::Full
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Like [`process_message`](Self::process_message), but waits for room in the inbox.
    pub async fn deliver(&self, sender: ClientId, message: SessionMessage) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        tokio::select! {
            result = self.inner.inbox.send((sender, message)) => result.map_err(|_| DeliveryError::Closed),
            _ = self.closed() => Err(DeliveryError::Closed),
        }
    }

    /// Hand over a state change that must reach an open session.
    ///
    /// Never fails for lack of room. Ordered after whatever is already in
    /// the inbox.
    pub fn process_control(&self, sender: ClientId, message: SessionMessage) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.inner
            .control
            .send((sender, message))
            .map_err(|_| DeliveryError::Closed)
    }

    /// Queue a message for the client, sent by the server.
    pub fn socket_send(&self, message: impl Into<ServerMessage>) -> bool {
        self.socket_send_as(message, ClientId::SERVER)
    }

    /// Queue a message for the client on behalf of `sender`.
    ///
    /// Returns `false` if the message was dropped.
    pub fn socket_send_as(&self, message: impl Into<ServerMessage>, sender: ClientId) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.inner.outbound.try_send(Envelope::new(sender, message.into())) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(client = %self.id(), "Outbound queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn deny(&self, denial: &Denial) -> bool {
        self.socket_send(ServerMessage::deny(denial.to_string()))
    }

    /// Close the session. Only the first call has any effect.
    pub fn close(&self, reason: &str) {
        let first = self.inner.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if first {
            tracing::info!(client = %self.id(), "Closing client: {reason}");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        loop {
            let closed = *rx.borrow_and_update();
            if closed || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The parts of a session every state handler may use.
pub(crate) struct SessionCore {
    pub id: ClientId,
    pub handle: SessionHandle,
    pub ctx: Arc<ServerContext>,
}

impl SessionCore {
    pub fn send(&self, message: impl Into<ServerMessage>) {
        self.handle.socket_send(message);
    }

    pub fn deny(&self, denial: impl Into<Denial>) {
        let denial = denial.into();
        tracing::debug!(client = %self.id, "Denied: {denial}");
        self.handle.deny(&denial);
    }

    pub fn record(&self, hook: Hook, state: &SessionState) {
        tracing::trace!(client = %self.id, ?hook, phase = ?state.phase(), "Lifecycle hook");
        if let Some(log) = &self.ctx.lifecycle {
            log.record(self.id, hook, state.phase());
        }
    }
}

/// The actor itself, owned by its driver task.
pub(crate) struct Session {
    core: SessionCore,
    state: Option<SessionState>,
}

impl Session {
    fn new(handle: SessionHandle, ctx: Arc<ServerContext>) -> Self {
        Self {
            core: SessionCore {
                id: handle.id(),
                handle,
                ctx,
            },
            state: None,
        }
    }

    /// Assign the identity and enter the first state.
    fn initialize(&mut self, id: ClientId) {
        self.core.id = id;
        self.set_state(|_| Some(SessionState::Connected));
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Inbound>, mut control: mpsc::UnboundedReceiver<Inbound>) {
        let handle = self.core.handle.clone();
        loop {
            tokio::select! {
                biased;
                _ = handle.closed() => break,
                inbound = inbox.recv() => match inbound {
                    Some((sender, message)) => self.process_message(sender, message),
                    None => break,
                },
                Some((sender, message)) = control.recv() => self.process_message(sender, message),
            }
        }

        self.shutdown();

        control.close();
        inbox.close();
        while let Ok((_, message)) = inbox.try_recv() {
            // A room that was waiting for this session must not wait forever.
            if let SessionMessage::EnterBattle { room, slot, .. } = message {
                room.abandon(slot);
            }
        }
    }

    /// Run the cleanup hook of the current state and leave the registry.
    fn shutdown(&mut self) {
        let hub = Arc::clone(&self.core.ctx.hub);
        match self.state.take() {
            Some(mut state) => {
                state.cleanup(&mut self.core);
                self.core.record(Hook::Cleanup, &state);
                if state.is_logged_in() {
                    hub.remove_authenticated(self.core.id);
                } else {
                    hub.remove_unauthenticated(self.core.id);
                }
            }
            None => {
                hub.remove_unauthenticated(self.core.id);
            }
        }
        tracing::debug!(client = %self.core.id, "Session shut down");
    }
}

/// Create a session actor and start its driver.
///
/// The returned receiver is the session's outbound queue.
pub fn spawn_session(ctx: Arc<ServerContext>) -> (SessionHandle, mpsc::Receiver<Outbound>, JoinHandle<()>) {
    let (inbox_tx, inbox_rx) = mpsc::channel(ctx.config.inbox_capacity);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::channel(ctx.config.outbound_capacity);
    let handle = SessionHandle::new(inbox_tx, control_tx, outbound_tx);

    let id = ctx.hub.register_unauthenticated(handle.clone());
    let mut session = Session::new(handle.clone(), ctx);
    session.initialize(id);

    let task = tokio::spawn(session.run(inbox_rx, control_rx));
    (handle, outbound_rx, task)
}

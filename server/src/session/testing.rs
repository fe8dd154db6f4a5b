//! Helpers for driving sessions in tests without a socket.

use super::lifecycle::LifecycleLog;
use super::{spawn_session, Inbound, Outbound, SessionHandle, SessionMessage};
use crate::catalog::{Catalog, BURO};
use crate::player::Pet;
use crate::store::Stores;
use crate::{ServerConfig, ServerContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use towber_protocol::{ClientId, ClientMessage, PlayerId, ServerMessage};

/// Longer than any server-side timeout, so paused-time tests never trip it
/// before the server acts.
const RECV_TIMEOUT: Duration = Duration::from_secs(600);

/// A handle with no driver behind it. The receivers show what was queued.
pub(crate) struct Detached {
    pub handle: SessionHandle,
    pub inbox: mpsc::Receiver<Inbound>,
    pub control: mpsc::UnboundedReceiver<Inbound>,
    pub outbound: mpsc::Receiver<Outbound>,
}

/// Inbox and outbound queues both hold `capacity` messages.
pub(crate) fn detached(capacity: usize) -> Detached {
    let (inbox_tx, inbox) = mpsc::channel(capacity);
    let (control_tx, control) = mpsc::unbounded_channel();
    let (outbound_tx, outbound) = mpsc::channel(capacity);
    Detached {
        handle: SessionHandle::new(inbox_tx, control_tx, outbound_tx),
        inbox,
        control,
        outbound,
    }
}

pub(crate) fn detached_handle_with_outbound(
    capacity: usize,
) -> (SessionHandle, mpsc::Receiver<Inbound>, mpsc::Receiver<Outbound>) {
    let Detached {
        handle, inbox, outbound, ..
    } = detached(capacity);
    (handle, inbox, outbound)
}

pub(crate) fn detached_handle(capacity: usize) -> (SessionHandle, mpsc::Receiver<Inbound>) {
    let (handle, inbox, _outbound) = detached_handle_with_outbound(capacity);
    (handle, inbox)
}

pub(crate) struct TestContext {
    pub ctx: Arc<ServerContext>,
    pub log: Arc<LifecycleLog>,
}

/// A running context over in-memory stores.
pub(crate) fn test_context() -> TestContext {
    let log = Arc::new(LifecycleLog::new());
    let ctx = ServerContext::start(
        ServerConfig::default(),
        Arc::new(Catalog::standard()),
        Stores::in_memory(),
        Some(Arc::clone(&log)),
    );
    TestContext { ctx, log }
}

/// Create an account directly in the store, optionally with one Buro equipped.
pub(crate) fn account(ctx: &ServerContext, name: &str, with_pet: bool) -> PlayerId {
    let stores = &ctx.stores;
    let account = stores.accounts.create_account(name, "pw").unwrap();
    stores.pets.init_pet_bag(account.id).unwrap();
    if with_pet {
        let pet = Pet::from_template(ctx.catalog.pet(BURO).unwrap());
        let pet = stores.pets.create_pet(account.id, pet).unwrap();
        stores.pets.set_slot(account.id, 0, Some(pet.id)).unwrap();
    }
    account.id
}

pub(crate) struct TestClient {
    pub handle: SessionHandle,
    /// Id assigned before login.
    pub initial_id: ClientId,
    outbound: mpsc::Receiver<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl TestClient {
    pub fn connect(ctx: &Arc<ServerContext>) -> Self {
        let (handle, outbound, task) = spawn_session(Arc::clone(ctx));
        Self {
            initial_id: handle.id(),
            handle,
            outbound,
            task: Some(task),
        }
    }

    /// Connect and log in to an existing account, skipping the login burst.
    pub async fn login(ctx: &Arc<ServerContext>, name: &str) -> Self {
        let mut client = Self::connect(ctx);
        client.send(ClientMessage::Login {
            username: name.to_string(),
            password: "pw".to_string(),
        });
        client
            .expect(|m| matches!(m, ServerMessage::LoginSuccess { .. }))
            .await;
        client
            .expect(|m| matches!(m, ServerMessage::EnterAreaResult { success: true, .. }))
            .await;
        client
    }

    pub fn send(&self, message: ClientMessage) {
        self.handle
            .process_message(self.handle.id(), SessionMessage::Client(message))
            .unwrap();
    }

    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for a server message")
            .expect("outbound queue closed")
            .message
    }

    /// Skip messages until one matches.
    pub async fn expect(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let message = self.recv().await;
            if pred(&message) {
                return message;
            }
        }
    }

    /// Close and wait until the session has cleaned up.
    pub async fn close(&mut self) {
        self.handle.close("test");
        if let Some(task) = self.task.take() {
            task.await.unwrap();
        }
    }

    /// Wait for the session's driver to finish after a close elsewhere.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            task.await.unwrap();
        }
    }
}

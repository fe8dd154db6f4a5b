//! Periodic "save your pets" broadcast.

use crate::hub::Hub;
use crate::session::SessionMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use towber_protocol::ClientId;

/// Ask every logged-in session to persist its pets, once per `interval`.
///
/// The first save happens one interval after start.
pub async fn run(hub: Arc<Hub>, interval: Duration) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tracing::debug!(sessions = hub.logged_in_count(), "Saving pets");
        hub.broadcast(ClientId::SERVER, SessionMessage::SavePets, false);
    }
}

//! Pre-login state: only login and registration are accepted.

use super::state::Transition;
use super::{SessionCore, SessionMessage};
use crate::error::{Denial, StoreError};
use crate::mail;
use crate::player::Player;
use towber_protocol::{ClientId, ClientMessage, ServerMessage};

pub(super) fn handle(core: &mut SessionCore, message: SessionMessage) -> Option<Transition> {
    match message {
        SessionMessage::Client(ClientMessage::Login { username, password }) => {
            match login(core, &username, &password) {
                Ok(player) => return Some(Transition::LoggedIn(player)),
                Err(denial) => core.deny(denial),
            }
        }
        SessionMessage::Client(ClientMessage::Register { username, password }) => {
            match register(core, &username, &password) {
                Ok(()) => core.send(ServerMessage::Ok),
                Err(denial) => core.deny(denial),
            }
        }
        SessionMessage::Client(_) => core.deny(Denial::NotLoggedIn),
        SessionMessage::EnterBattle { room, slot, .. } => room.abandon(slot),
        SessionMessage::SavePets | SessionMessage::Battle(_) | SessionMessage::BattleFinished(_) => {}
    }
    None
}

fn login(core: &mut SessionCore, username: &str, password: &str) -> Result<Player, Denial> {
    let account = core
        .ctx
        .stores
        .accounts
        .find_by_credentials(username, password)?
        .ok_or(Denial::BadCredentials)?;

    let new_id = ClientId::from(account.id);
    core.ctx.hub.promote(core.id, new_id, &core.handle)?;
    core.id = new_id;

    tracing::info!(client = %new_id, username, "Player logged in");
    core.send(ServerMessage::LoginSuccess {
        player: account.id,
        username: account.username.clone(),
    });
    Ok(Player::new(account.id, account.username))
}

fn register(core: &SessionCore, username: &str, password: &str) -> Result<(), Denial> {
    let stores = &core.ctx.stores;
    if username.is_empty() || password.is_empty() {
        return Err(Denial::BadCredentials);
    }
    if stores.accounts.username_exists(username)? {
        return Err(Denial::UsernameTaken);
    }
    let account = stores
        .accounts
        .create_account(username, password)
        .map_err(|e| match e {
            StoreError::DuplicateUsername => Denial::UsernameTaken,
            other => Denial::Store(other),
        })?;
    stores.pets.init_pet_bag(account.id)?;

    tracing::info!(player = %account.id, username, "Account registered");

    // Registration stands even if the reward mail fails.
    if let Err(e) = mail::send_welcome(stores, account.id) {
        tracing::error!(player = %account.id, "Could not send welcome mail: {e}");
    }
    Ok(())
}

//! Session states and the transition dispatcher.
//!
//! States hold only their own data. Handlers return a [`Transition`] and
//! [`Session::apply`] performs it: exit hook of the old state, swap, entry
//! hook of the new state.

use super::connected;
use super::in_battle::InBattle;
use super::in_game::InGame;
use super::lifecycle::Hook;
use super::{Session, SessionCore, SessionMessage};
use crate::battle::{BattleOutcome, BattleRoomHandle};
use crate::player::Player;
use std::sync::Arc;
use towber_protocol::{ClientId, SessionPhase, Slot};

pub(crate) enum SessionState {
    /// Before login.
    Connected,
    /// Free roam.
    InGame(InGame),
    /// Driving a battle. Keeps the free-roam state to return to.
    InBattle(InBattle),
}

/// A state change requested by a handler.
pub(crate) enum Transition {
    LoggedIn(Player),
    EnterBattle {
        room: BattleRoomHandle,
        slot: Slot,
        opponent: String,
    },
    LeaveBattle(BattleOutcome),
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Connected => SessionPhase::Connected,
            SessionState::InGame(_) => SessionPhase::InGame,
            SessionState::InBattle(_) => SessionPhase::InBattle,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        !matches!(self, SessionState::Connected)
    }

    fn on_enter(&mut self, core: &mut SessionCore) {
        match self {
            SessionState::Connected => {}
            SessionState::InGame(game) => game.on_enter(core),
            SessionState::InBattle(battle) => battle.on_enter(core),
        }
    }

    fn on_exit(&mut self, core: &mut SessionCore) {
        match self {
            SessionState::Connected | SessionState::InGame(_) => {}
            SessionState::InBattle(battle) => battle.on_exit(core),
        }
    }

    /// Release everything the state holds. Runs once, on close.
    pub(super) fn cleanup(&mut self, core: &mut SessionCore) {
        match self {
            SessionState::Connected => {}
            SessionState::InGame(game) => game.cleanup(core),
            SessionState::InBattle(battle) => battle.cleanup(core),
        }
    }

    fn handle(&mut self, core: &mut SessionCore, sender: ClientId, message: SessionMessage) -> Option<Transition> {
        match self {
            SessionState::Connected => connected::handle(core, message),
            SessionState::InGame(game) => game.handle(core, sender, message),
            SessionState::InBattle(battle) => battle.handle(core, message),
        }
    }
}

impl Session {
    pub(super) fn process_message(&mut self, sender: ClientId, message: SessionMessage) {
        let Some(state) = self.state.as_mut() else {
            tracing::trace!(client = %self.core.id, "Message after shutdown ignored");
            return;
        };
        if let Some(transition) = state.handle(&mut self.core, sender, message) {
            self.apply(transition);
        }
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::LoggedIn(player) => {
                self.set_state(|_| Some(SessionState::InGame(InGame::new(player))));
            }
            Transition::EnterBattle { room, slot, opponent } => {
                if !matches!(self.state, Some(SessionState::InGame(_))) {
                    tracing::warn!(client = %self.core.id, room = %room.id(), "Cannot join battle from this state");
                    room.abandon(slot);
                    return;
                }
                self.set_state(move |old| match old {
                    Some(SessionState::InGame(game)) => {
                        Some(SessionState::InBattle(InBattle::new(game, room, slot, opponent)))
                    }
                    other => other,
                });
            }
            Transition::LeaveBattle(outcome) => {
                let ctx = Arc::clone(&self.core.ctx);
                self.set_state(move |old| match old {
                    Some(SessionState::InBattle(battle)) => {
                        Some(SessionState::InGame(battle.finish(outcome, &ctx)))
                    }
                    other => other,
                });
            }
        }
    }

    /// Exit the current state, build the next one from it, enter that.
    pub(super) fn set_state<F>(&mut self, next: F)
    where
        F: FnOnce(Option<SessionState>) -> Option<SessionState>,
    {
        let mut old = self.state.take();
        if let Some(state) = old.as_mut() {
            state.on_exit(&mut self.core);
            self.core.record(Hook::Exit, state);
        }
        let from = old.as_ref().map(SessionState::phase);

        self.state = next(old);

        if let Some(state) = self.state.as_mut() {
            tracing::info!(client = %self.core.id, "Switching from state {:?} to {:?}", from, state.phase());
            self.core.record(Hook::Enter, state);
            state.on_enter(&mut self.core);
        }
    }
}

//! Driving a battle room on behalf of the client.

use super::in_game::{self, InGame};
use super::state::Transition;
use super::{SessionCore, SessionMessage};
use crate::battle::{BattleOutcome, BattleRoomHandle};
use crate::error::Denial;
use crate::ServerContext;
use std::sync::Arc;
use towber_protocol::{BattleEvent, BattleInput, ClientMessage, ServerMessage, SessionPhase, Slot};

/// Experience the winner's active pet receives.
pub const BATTLE_WIN_EXP: u32 = 20;

pub(crate) struct InBattle {
    /// Where the player returns to when the room ends.
    saved: InGame,
    room: BattleRoomHandle,
    slot: Slot,
    opponent: String,
}

impl InBattle {
    pub fn new(saved: InGame, room: BattleRoomHandle, slot: Slot, opponent: String) -> Self {
        Self {
            saved,
            room,
            slot,
            opponent,
        }
    }

    pub fn on_enter(&mut self, core: &mut SessionCore) {
        core.send(ServerMessage::StateChanged {
            phase: SessionPhase::InBattle,
        });
        core.send(ServerMessage::StartBattle {
            slot: self.slot,
            opponent: self.opponent.clone(),
        });
    }

    pub fn on_exit(&mut self, core: &mut SessionCore) {
        tracing::debug!(client = %core.id, room = %self.room.id(), "Leaving battle");
    }

    /// The client vanished mid-battle: an auto participant takes the seat.
    pub fn cleanup(&mut self, core: &mut SessionCore) {
        self.room.abandon(self.slot);
        self.saved.cleanup(core);
    }

    pub fn handle(&mut self, core: &mut SessionCore, message: SessionMessage) -> Option<Transition> {
        match message {
            SessionMessage::Client(ClientMessage::Battle(input)) => {
                let result = match input {
                    BattleInput::Command(command) => self.room.submit_command(self.slot, command),
                    BattleInput::ConfirmRound => self.room.confirm_round(self.slot),
                };
                if let Err(e) = result {
                    core.send(BattleEvent::CommandDenied { reason: e.to_string() });
                }
            }
            SessionMessage::Client(_) => core.deny(Denial::InBattle),
            SessionMessage::SavePets => {}
            SessionMessage::EnterBattle { room, slot, .. } => {
                tracing::warn!(client = %core.id, room = %room.id(), "Already in a battle");
                room.abandon(slot);
            }
            SessionMessage::Battle(event) => core.send(event),
            SessionMessage::BattleFinished(outcome) if outcome.room == self.room.id() => {
                return Some(Transition::LeaveBattle(outcome));
            }
            SessionMessage::BattleFinished(outcome) => {
                tracing::debug!(client = %core.id, room = %outcome.room, "Outcome of another room ignored");
            }
        }
        None
    }

    /// Write the battle results back into the equipped pets.
    pub fn finish(self, outcome: BattleOutcome, ctx: &Arc<ServerContext>) -> InGame {
        let player = self.saved.player;
        {
            let mut pets = player.pets.write();
            for fought in outcome.team.pets.iter().flatten() {
                if let Some(pet) = pets.iter_mut().flatten().find(|pet| pet.id == fought.id) {
                    pet.stats.hp = fought.stats.hp;
                    pet.stats.mana = fought.stats.mana;
                }
            }

            if outcome.won() {
                let active = outcome.team.active_pet().map(|pet| pet.id);
                if let Some(pet) = pets.iter_mut().flatten().find(|pet| Some(pet.id) == active) {
                    match pet.gain_exp(BATTLE_WIN_EXP, &ctx.catalog) {
                        Ok(levels) => tracing::debug!(player = %player.id, pet = %pet.id, levels, "Winner exp granted"),
                        Err(e) => tracing::debug!(player = %player.id, pet = %pet.id, "No winner exp: {e}"),
                    }
                }
            }
        }
        tracing::info!(player = %player.id, room = %outcome.room, won = outcome.won(), "Battle finished");
        in_game::save_pets(&ctx.stores, player.id, &player.pets.snapshot());
        InGame::resumed(player)
    }
}

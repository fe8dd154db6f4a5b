//! Battle commands and events.

use crate::ids::{RoomId, SkillId};
use crate::pet::{PetStats, PetView};
use serde::{Deserialize, Serialize};

/// Side of a battle room, either 0 or 1.
pub type Slot = usize;

/// A single turn decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BattleCommand {
    /// Use the skill in the given slot of the active pet.
    Attack { skill_slot: usize },
    /// Swap the active pet for the one at `position` in the team.
    ChangePet { position: usize },
    /// Give up the battle.
    Flee,
}

/// Battle traffic sent by a client while in a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BattleInput {
    Command(BattleCommand),
    /// Ready for the next round.
    ConfirmRound,
}

/// One side's composition as shown to both players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub slot: Slot,
    pub name: String,
    pub active: usize,
    pub pets: Vec<Option<PetView>>,
}

/// Outcome of one attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackReport {
    pub attacker: Slot,
    pub skill: SkillId,
    /// Damage dealt by each hit, in order.
    pub hits: Vec<u32>,
    pub attacker_stats: PetStats,
    pub defender_stats: PetStats,
}

/// Events emitted by a battle room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BattleEvent {
    Started { room: RoomId, slot: Slot },
    Teams { teams: Vec<TeamInfo> },
    RoundStarted { round: u32 },
    CommandAccepted,
    CommandDenied { reason: String },
    PetChanged { slot: Slot, position: usize, pet: PetView },
    Attack(AttackReport),
    PetFainted { slot: Slot, position: usize },
    /// The receiving side must pick a new active pet.
    ChangePetRequest { slot: Slot },
    RoundEnded { round: u32 },
    /// `None` is a draw.
    Ended { winner: Option<Slot> },
}

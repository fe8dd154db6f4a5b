//! The two sides of a battle.

use super::BattleOutcome;
use crate::player::{Pet, PetSlots};
use crate::session::{SessionHandle, SessionMessage};
use towber_protocol::{BattleCommand, BattleEvent, ClientId, PetView, PlayerId, RoomId, Slot, TeamInfo};

/// The battle pets of one side: a copy of the equipped pets taken when the
/// battle starts, plus the index of the pet currently fighting.
#[derive(Debug, Clone, Default)]
pub struct BattleTeam {
    pub pets: PetSlots,
    pub active: usize,
}

impl BattleTeam {
    /// `None` when no equipped pet can fight.
    pub fn new(pets: PetSlots) -> Option<Self> {
        let mut team = Self { pets, active: 0 };
        team.active = team.first_standing()?;
        Some(team)
    }

    pub fn active_pet(&self) -> Option<&Pet> {
        self.pets.get(self.active)?.as_ref()
    }

    pub fn active_pet_mut(&mut self) -> Option<&mut Pet> {
        self.pets.get_mut(self.active)?.as_mut()
    }

    /// Whether `position` holds a standing pet other than the active one.
    pub fn can_switch_to(&self, position: usize) -> bool {
        position != self.active
            && matches!(self.pets.get(position), Some(Some(pet)) if !pet.is_fainted())
    }

    pub fn first_standing(&self) -> Option<usize> {
        self.pets
            .iter()
            .position(|pet| matches!(pet, Some(pet) if !pet.is_fainted()))
    }

    pub fn all_fainted(&self) -> bool {
        self.first_standing().is_none()
    }

    pub fn total_hp(&self) -> u64 {
        self.pets.iter().flatten().map(|pet| u64::from(pet.stats.hp)).sum()
    }

    pub fn info(&self, slot: Slot, name: &str) -> TeamInfo {
        TeamInfo {
            slot,
            name: name.to_string(),
            active: self.active,
            pets: self.pets.iter().map(|pet| pet.as_ref().map(Pet::view)).collect(),
        }
    }

    pub(crate) fn active_view(&self) -> Option<PetView> {
        self.active_pet().map(Pet::view)
    }
}

/// Anything that can take a side in a battle room.
///
/// A room only talks to its sides through this trait, so a human player and
/// the automatic stand-in look the same to the turn logic.
pub trait BattleParticipant: Send {
    fn name(&self) -> &str;

    /// The player behind this side, if any.
    fn player(&self) -> Option<PlayerId> {
        None
    }

    fn deliver(&mut self, event: BattleEvent);

    fn team(&self) -> &BattleTeam;

    fn team_mut(&mut self) -> &mut BattleTeam;

    fn attach(&mut self, _room: RoomId, _slot: Slot) {}

    /// The battle is over. Receives the team as it ended.
    fn conclude(&mut self, outcome: BattleOutcome);

    /// Auto sides are never waited on.
    fn is_auto(&self) -> bool {
        false
    }

    /// A command decided without outside input.
    fn auto_command(&mut self) -> Option<BattleCommand> {
        None
    }

    /// Pick the next pet after the active one fainted.
    fn choose_replacement(&mut self) -> Option<usize> {
        None
    }
}

// ============================================================================
// PlayerParticipant
// ============================================================================

/// A side driven by a connected session.
pub struct PlayerParticipant {
    player: PlayerId,
    name: String,
    handle: SessionHandle,
    team: BattleTeam,
    room: Option<RoomId>,
}

impl PlayerParticipant {
    pub fn new(player: PlayerId, name: impl Into<String>, handle: SessionHandle, team: BattleTeam) -> Self {
        Self {
            player,
            name: name.into(),
            handle,
            team,
            room: None,
        }
    }

    fn forward(&self, message: SessionMessage) {
        if let Err(e) = self.handle.process_message(ClientId::SERVER, message) {
            tracing::debug!(player = %self.player, room = ?self.room, "Battle message not delivered: {e}");
        }
    }
}

impl BattleParticipant for PlayerParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn player(&self) -> Option<PlayerId> {
        Some(self.player)
    }

    fn deliver(&mut self, event: BattleEvent) {
        self.forward(SessionMessage::Battle(event));
    }

    fn team(&self) -> &BattleTeam {
        &self.team
    }

    fn team_mut(&mut self) -> &mut BattleTeam {
        &mut self.team
    }

    fn attach(&mut self, room: RoomId, _slot: Slot) {
        self.room = Some(room);
    }

    fn conclude(&mut self, outcome: BattleOutcome) {
        // The team must get back even when the inbox is backed up.
        let message = SessionMessage::BattleFinished(outcome);
        if let Err(e) = self.handle.process_control(ClientId::SERVER, message) {
            tracing::warn!(player = %self.player, room = ?self.room, "Battle team not handed back: {e}");
        }
    }
}

// ============================================================================
// AutoParticipant
// ============================================================================

/// Stand-in for a side whose session went away.
///
/// Flees at the first chance, confirms every round and replaces fainted
/// pets with the first one still standing.
pub struct AutoParticipant {
    name: String,
    team: BattleTeam,
}

impl AutoParticipant {
    pub fn new(name: impl Into<String>, team: BattleTeam) -> Self {
        Self {
            name: name.into(),
            team,
        }
    }

    /// Take over the seat of `previous`.
    pub fn replacing(previous: &mut dyn BattleParticipant) -> Self {
        Self::new(previous.name().to_string(), std::mem::take(previous.team_mut()))
    }
}

impl BattleParticipant for AutoParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, _event: BattleEvent) {}

    fn team(&self) -> &BattleTeam {
        &self.team
    }

    fn team_mut(&mut self) -> &mut BattleTeam {
        &mut self.team
    }

    fn conclude(&mut self, _outcome: BattleOutcome) {}

    fn is_auto(&self) -> bool {
        true
    }

    fn auto_command(&mut self) -> Option<BattleCommand> {
        Some(BattleCommand::Flee)
    }

    fn choose_replacement(&mut self) -> Option<usize> {
        self.team.first_standing()
    }
}

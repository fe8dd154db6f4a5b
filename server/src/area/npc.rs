//! Non-player characters placed in areas.

use crate::error::Denial;
use crate::player::Player;
use towber_protocol::{NpcAction, NpcId, Vector2};

#[derive(Debug, Clone)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    /// UI panel opened when a player talks to the npc.
    pub ui: String,
    pub position: Vector2,
    actions: Vec<NpcAction>,
}

impl Npc {
    pub fn new(id: NpcId, name: impl Into<String>, ui: impl Into<String>, position: Vector2) -> Self {
        Self {
            id,
            name: name.into(),
            ui: ui.into(),
            position,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: NpcAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn supports(&self, action: NpcAction) -> bool {
        self.actions.contains(&action)
    }

    /// Carry out an action for a player.
    pub fn perform(&self, action: NpcAction, player: &Player) -> Result<(), Denial> {
        if !self.supports(action) {
            return Err(Denial::UnsupportedAction);
        }
        match action {
            NpcAction::Heal => {
                let mut pets = player.pets.write();
                for pet in pets.iter_mut().flatten() {
                    pet.stats.refill();
                }
                tracing::debug!(player = %player.id, npc = %self.id, "Pets healed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, BURO};
    use crate::player::Pet;
    use towber_protocol::PlayerId;

    #[test]
    fn test_healer_restores_every_pet() {
        let catalog = Catalog::standard();
        let player = Player::new(PlayerId(1), "ann");
        {
            let mut pets = player.pets.write();
            for slot in 0..2 {
                let mut pet = Pet::from_template(catalog.pet(BURO).unwrap());
                pet.stats.hp = slot as u32;
                pet.stats.mana = 0;
                pets[slot] = Some(pet);
            }
        }

        let healer = Npc::new(NpcId(2), "healer", "healer", Vector2::default()).with_action(NpcAction::Heal);
        healer.perform(NpcAction::Heal, &player).unwrap();

        for pet in player.pets.read().iter().flatten() {
            assert_eq!(pet.stats.hp, pet.stats.max_hp);
            assert_eq!(pet.stats.mana, pet.stats.max_mana);
        }
    }

    #[test]
    fn test_unsupported_action_is_denied() {
        let head = Npc::new(NpcId(1), "head", "initial_village_header", Vector2::default());
        let player = Player::new(PlayerId(1), "ann");
        assert_eq!(head.perform(NpcAction::Heal, &player), Err(Denial::UnsupportedAction));
    }
}

//! Players and their pets.

use crate::catalog::{Catalog, PetTemplate};
use crate::error::Denial;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use towber_protocol::{NpcId, PetId, PetKind, PetStats, PetView, PlayerId, SkillId, Vector2, SKILL_SLOTS, TEAM_SIZE};

/// A persisted pet.
#[derive(Debug, Clone, PartialEq)]
pub struct Pet {
    pub id: PetId,
    pub kind: PetKind,
    pub name: String,
    pub level: u32,
    pub exp: u32,
    pub stats: PetStats,
    pub skills: [Option<SkillId>; SKILL_SLOTS],
}

impl Pet {
    /// A fresh level 1 pet. The id is assigned by the pet store.
    pub fn from_template(template: &PetTemplate) -> Self {
        let mut stats = template.base;
        stats.refill();
        let mut pet = Self {
            id: PetId(0),
            kind: template.kind,
            name: template.name.clone(),
            level: 1,
            exp: 0,
            stats,
            skills: [None; SKILL_SLOTS],
        };
        pet.learn_skills(template);
        pet
    }

    pub fn view(&self) -> PetView {
        PetView {
            id: self.id,
            kind: self.kind,
            name: self.name.clone(),
            level: self.level,
            exp: self.exp,
            stats: self.stats,
            skills: self.skills,
        }
    }

    pub fn is_fainted(&self) -> bool {
        self.stats.is_fainted()
    }

    /// Add experience, levelling up as the table allows.
    ///
    /// Returns the number of levels gained.
    pub fn gain_exp(&mut self, amount: u32, catalog: &Catalog) -> Result<u32, Denial> {
        let max = catalog.max_exp();
        if self.exp >= max {
            return Err(Denial::MaxLevel);
        }
        self.exp = self.exp.saturating_add(amount).min(max);

        let target = catalog.level_for_exp(self.exp);
        let template = catalog.pet(self.kind);
        let mut gained = 0;
        while self.level < target {
            self.level += 1;
            gained += 1;
            if let Some(template) = template {
                self.grow(template);
            }
        }
        if gained > 0 {
            self.stats.refill();
        }
        Ok(gained)
    }

    fn grow(&mut self, template: &PetTemplate) {
        let growth = &template.growth;
        let stats = &mut self.stats;
        stats.max_hp += growth.max_hp;
        stats.max_mana += growth.max_mana;
        stats.strength += growth.strength;
        stats.intelligence += growth.intelligence;
        stats.speed += growth.speed;
        stats.defense += growth.defense;
        self.learn_skills(template);
    }

    fn learn_skills(&mut self, template: &PetTemplate) {
        for (level, skill) in &template.learnset {
            if *level > self.level || self.skills.contains(&Some(*skill)) {
                continue;
            }
            if let Some(slot) = self.skills.iter_mut().find(|s| s.is_none()) {
                *slot = Some(*skill);
            }
        }
    }
}

pub type PetSlots = [Option<Pet>; TEAM_SIZE];

/// The equipped-pet array of a player, shared with background tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedPetBag(Arc<RwLock<PetSlots>>);

impl SharedPetBag {
    pub fn new(slots: PetSlots) -> Self {
        Self(Arc::new(RwLock::new(slots)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PetSlots> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PetSlots> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current slots.
    pub fn snapshot(&self) -> PetSlots {
        self.read().clone()
    }

    pub fn views(&self) -> Vec<Option<PetView>> {
        self.read().iter().map(|pet| pet.as_ref().map(Pet::view)).collect()
    }
}

/// A logged-in player.
///
/// Owned by whichever session state currently drives the player and handed
/// from state to state.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub area: Option<String>,
    pub position: Vector2,
    pub pets: SharedPetBag,
    /// The npc the player last talked to.
    pub npc: Option<NpcId>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            area: None,
            position: Vector2::default(),
            pets: SharedPetBag::default(),
            npc: None,
        }
    }
}

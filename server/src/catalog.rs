//! Immutable content tables: pets, skills and items.
//!
//! Built once at startup and shared behind an `Arc`; nothing here is mutated
//! after construction.

use std::collections::HashMap;
use towber_protocol::{ItemId, PetKind, PetStats, SkillId};

/// One damage instance of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub physical: u32,
    pub magical: u32,
}

#[derive(Debug, Clone)]
pub struct SkillTemplate {
    pub id: SkillId,
    pub name: String,
    /// Higher speed acts first.
    pub speed: u32,
    pub mana_cost: u32,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone)]
pub struct PetTemplate {
    pub kind: PetKind,
    pub name: String,
    /// Stats at level 1.
    pub base: PetStats,
    /// Added to the max stats on every level up.
    pub growth: PetStats,
    /// `(level, skill)` pairs, learned on reaching the level.
    pub learnset: Vec<(u32, SkillId)>,
    /// Can be picked with the starter item.
    pub starter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEffect {
    /// Ask the client to open a UI panel.
    OpenUi(String),
}

#[derive(Debug, Clone)]
pub struct ItemTemplate {
    pub id: ItemId,
    pub name: String,
    pub effect: ItemEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetItemEffect {
    /// Experience granted per unit.
    Experience(u32),
}

#[derive(Debug, Clone)]
pub struct PetItemTemplate {
    pub id: ItemId,
    pub name: String,
    pub effect: PetItemEffect,
}

/// Lookup tables for every template kind.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pets: HashMap<PetKind, PetTemplate>,
    skills: HashMap<SkillId, SkillTemplate>,
    items: HashMap<ItemId, ItemTemplate>,
    pet_items: HashMap<ItemId, PetItemTemplate>,
    /// Experience needed to leave each level, ascending.
    level_thresholds: Vec<u32>,
}

pub const BURO: PetKind = PetKind(1);
pub const BITE: SkillId = SkillId(1);
pub const TRIPLE_STRIKE: SkillId = SkillId(2);
pub const INITIAL_PET: ItemId = ItemId(1);
pub const ORANGE_SUGAR: ItemId = ItemId(1);

impl Catalog {
    pub fn new(level_thresholds: Vec<u32>) -> Self {
        Self {
            level_thresholds,
            ..Self::default()
        }
    }

    /// The game's built-in content.
    pub fn standard() -> Self {
        let mut catalog = Self::new(vec![20, 40, 80, 160, 320]);

        catalog.add_skill(SkillTemplate {
            id: BITE,
            name: "Bite".into(),
            speed: 1,
            mana_cost: 0,
            hits: vec![Hit { physical: 10, magical: 0 }],
        });
        catalog.add_skill(SkillTemplate {
            id: TRIPLE_STRIKE,
            name: "TripleStrike".into(),
            speed: 2,
            mana_cost: 10,
            hits: vec![Hit { physical: 20, magical: 0 }; 3],
        });

        catalog.add_pet(PetTemplate {
            kind: BURO,
            name: "Buro".into(),
            base: PetStats {
                hp: 50,
                max_hp: 50,
                mana: 60,
                max_mana: 60,
                strength: 60,
                intelligence: 20,
                speed: 60,
                defense: 10,
            },
            growth: PetStats {
                hp: 0,
                max_hp: 5,
                mana: 0,
                max_mana: 3,
                strength: 5,
                intelligence: 1,
                speed: 1,
                defense: 2,
            },
            learnset: vec![(1, BITE), (3, TRIPLE_STRIKE)],
            starter: true,
        });

        catalog.add_item(ItemTemplate {
            id: INITIAL_PET,
            name: "InitialPet".into(),
            effect: ItemEffect::OpenUi("initial_pet".into()),
        });
        catalog.add_pet_item(PetItemTemplate {
            id: ORANGE_SUGAR,
            name: "OrangeSugar".into(),
            effect: PetItemEffect::Experience(100),
        });

        catalog
    }

    pub fn add_pet(&mut self, template: PetTemplate) {
        self.pets.insert(template.kind, template);
    }

    pub fn add_skill(&mut self, template: SkillTemplate) {
        self.skills.insert(template.id, template);
    }

    pub fn add_item(&mut self, template: ItemTemplate) {
        self.items.insert(template.id, template);
    }

    pub fn add_pet_item(&mut self, template: PetItemTemplate) {
        self.pet_items.insert(template.id, template);
    }

    pub fn pet(&self, kind: PetKind) -> Option<&PetTemplate> {
        self.pets.get(&kind)
    }

    pub fn skill(&self, id: SkillId) -> Option<&SkillTemplate> {
        self.skills.get(&id)
    }

    pub fn item(&self, id: ItemId) -> Option<&ItemTemplate> {
        self.items.get(&id)
    }

    pub fn pet_item(&self, id: ItemId) -> Option<&PetItemTemplate> {
        self.pet_items.get(&id)
    }

    /// Experience at which pets stop growing.
    pub fn max_exp(&self) -> u32 {
        self.level_thresholds.last().copied().unwrap_or(0)
    }

    pub fn level_for_exp(&self, exp: u32) -> u32 {
        let level = self
            .level_thresholds
            .iter()
            .position(|threshold| exp < *threshold)
            .unwrap_or(self.level_thresholds.len());
        level as u32 + 1
    }
}

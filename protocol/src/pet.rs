//! Pet, item and mail payloads.

use crate::ids::{ItemId, MailId, PetId, PetKind, SkillId};
use serde::{Deserialize, Serialize};

/// Number of equipped pet slots per player (and per battle team).
pub const TEAM_SIZE: usize = 5;

/// Number of skill slots per pet.
pub const SKILL_SLOTS: usize = 4;

/// Combat statistics of a pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PetStats {
    pub hp: u32,
    pub max_hp: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub strength: u32,
    pub intelligence: u32,
    pub speed: u32,
    pub defense: u32,
}

impl PetStats {
    pub fn is_fainted(&self) -> bool {
        self.hp == 0
    }

    /// Restore hp and mana to their maximums.
    pub fn refill(&mut self) {
        self.hp = self.max_hp;
        self.mana = self.max_mana;
    }
}

/// Client-facing view of a pet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetView {
    pub id: PetId,
    pub kind: PetKind,
    pub name: String,
    pub level: u32,
    pub exp: u32,
    pub stats: PetStats,
    pub skills: [Option<SkillId>; SKILL_SLOTS],
}

/// Which counted inventory a stack lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BagKind {
    /// General items.
    Items,
    /// Items used on pets.
    PetItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemId,
    pub count: u32,
}

/// An item attached to a mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailItem {
    pub bag: BagKind,
    pub item: ItemId,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    pub id: MailId,
    pub sender: String,
    pub text: String,
    pub items: Vec<MailItem>,
}

//! Turn resolution arithmetic.

use crate::catalog::{Hit, SkillTemplate};
use std::cmp::Reverse;
use towber_protocol::{PetStats, Slot};

/// An attack queued for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueuedAttack {
    pub slot: Slot,
    pub skill_speed: u32,
    pub pet_speed: u32,
}

/// Skill speed first, then the acting pet's speed, then slot order.
pub(crate) fn attack_order(attacks: &[QueuedAttack]) -> Vec<Slot> {
    let mut ordered = attacks.to_vec();
    ordered.sort_by_key(|a| (Reverse(a.skill_speed), Reverse(a.pet_speed), a.slot));
    ordered.into_iter().map(|a| a.slot).collect()
}

/// `base * (1 + offense/100) * max(0, 1 - defense/100)`, truncated at each step.
fn scaled(base: u32, offense: u32, defense: u32) -> u64 {
    let boosted = u64::from(base) * (100 + u64::from(offense)) / 100;
    let mitigation = 100u64.saturating_sub(u64::from(defense));
    boosted * mitigation / 100
}

pub(crate) fn hit_damage(hit: &Hit, attacker: &PetStats, defender: &PetStats) -> u32 {
    let physical = scaled(hit.physical, attacker.strength, defender.defense);
    let magical = scaled(hit.magical, attacker.intelligence, defender.intelligence);
    u32::try_from(physical + magical).unwrap_or(u32::MAX)
}

/// Spend the skill's mana and land its hits in order.
///
/// Returns the damage of every hit that landed. Hits stop once the defender
/// is down; hp never goes below zero.
pub(crate) fn apply_skill(skill: &SkillTemplate, attacker: &mut PetStats, defender: &mut PetStats) -> Vec<u32> {
    attacker.mana = attacker.mana.saturating_sub(skill.mana_cost);
    let mut dealt = Vec::with_capacity(skill.hits.len());
    for hit in &skill.hits {
        if defender.is_fainted() {
            break;
        }
        let damage = hit_damage(hit, attacker, defender).min(defender.hp);
        defender.hp -= damage;
        dealt.push(damage);
    }
    dealt
}

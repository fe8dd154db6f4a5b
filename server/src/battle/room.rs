//! The coordinating task of one battle.

use super::participant::{AutoParticipant, BattleParticipant};
use super::resolve::{self, QueuedAttack};
use super::{BattleOutcome, BattleSettings, Control, RoomCommand};
use crate::catalog::Catalog;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use towber_protocol::{AttackReport, BattleCommand, BattleEvent, RoomId, SkillId, Slot};

const SLOTS: [Slot; 2] = [0, 1];

fn other(slot: Slot) -> Slot {
    1 - slot
}

/// The battle has been decided. `None` is a draw.
struct Decided(Option<Slot>);

type Step<T = ()> = Result<T, Decided>;

pub(super) struct RoomChannels {
    pub commands: mpsc::Receiver<RoomCommand>,
    pub confirms: mpsc::Receiver<Slot>,
    pub control: mpsc::UnboundedReceiver<Control>,
}

struct Side {
    participant: Box<dyn BattleParticipant>,
    /// Consecutive rounds without a command.
    missed_rounds: u32,
}

pub(super) struct BattleRoom {
    id: RoomId,
    sides: [Side; 2],
    channels: RoomChannels,
    ended: Arc<AtomicBool>,
    settings: BattleSettings,
    catalog: Arc<Catalog>,
}

impl BattleRoom {
    pub(super) fn new(
        id: RoomId,
        sides: [Box<dyn BattleParticipant>; 2],
        channels: RoomChannels,
        ended: Arc<AtomicBool>,
        settings: BattleSettings,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            id,
            sides: sides.map(|participant| Side {
                participant,
                missed_rounds: 0,
            }),
            channels,
            ended,
            settings,
            catalog,
        }
    }

    pub(super) async fn run(mut self) {
        tracing::info!(
            room = %self.id,
            "Battle started: {} vs {}",
            self.sides[0].participant.name(),
            self.sides[1].participant.name()
        );
        for slot in SLOTS {
            let participant = &mut self.sides[slot].participant;
            participant.attach(self.id, slot);
            participant.deliver(BattleEvent::Started { room: self.id, slot });
        }
        self.sync_teams();

        let winner = match self.rounds().await {
            Err(Decided(winner)) => winner,
            Ok(()) => self.decide_by_hp(),
        };
        self.finish(winner);
    }

    async fn rounds(&mut self) -> Step {
        let max_rounds = self.settings.max_rounds;
        for round in 1..=max_rounds {
            self.broadcast(BattleEvent::RoundStarted { round });
            let commands = self.collect_commands().await?;
            self.check_forfeits(&commands)?;
            self.resolve_round(commands).await?;
            self.broadcast(BattleEvent::RoundEnded { round });
            if round < max_rounds {
                self.await_confirmations().await;
            }
        }
        tracing::info!(room = %self.id, "Round limit reached");
        Ok(())
    }

    // ========================================================================
    // Awaiting commands
    // ========================================================================

    async fn collect_commands(&mut self) -> Step<[Option<BattleCommand>; 2]> {
        let mut chosen = [None, None];
        for slot in SLOTS {
            self.take_auto_command(slot, &mut chosen)?;
        }

        let deadline = Instant::now() + self.settings.round_timeout;
        while chosen.iter().any(Option::is_none) {
            tokio::select! {
                biased;
                Some(control) = self.channels.control.recv() => {
                    if let Some(slot) = self.apply_control(control) {
                        self.take_auto_command(slot, &mut chosen)?;
                    }
                }
                Some(RoomCommand { slot, command }) = self.channels.commands.recv() => {
                    self.offer_command(slot, command, &mut chosen)?;
                }
                Some(slot) = self.channels.confirms.recv() => {
                    tracing::trace!(room = %self.id, slot, "Confirmation while awaiting commands ignored");
                }
                _ = time::sleep_until(deadline) => {
                    tracing::debug!(room = %self.id, "Round timed out");
                    break;
                }
            }
        }
        Ok(chosen)
    }

    fn take_auto_command(&mut self, slot: Slot, chosen: &mut [Option<BattleCommand>; 2]) -> Step {
        if chosen[slot].is_some() {
            return Ok(());
        }
        match self.sides[slot].participant.auto_command() {
            Some(command) => self.offer_command(slot, command, chosen),
            None => Ok(()),
        }
    }

    fn offer_command(&mut self, slot: Slot, command: BattleCommand, chosen: &mut [Option<BattleCommand>; 2]) -> Step {
        if slot >= SLOTS.len() {
            tracing::warn!(room = %self.id, slot, "Command for unknown slot");
            return Ok(());
        }
        if chosen[slot].is_some() {
            self.deny(slot, "command already submitted this round");
            return Ok(());
        }
        if let Err(reason) = self.validate(slot, command) {
            self.deny(slot, reason);
            return Ok(());
        }
        if command == BattleCommand::Flee {
            tracing::info!(room = %self.id, slot, "Side fled");
            return Err(Decided(Some(other(slot))));
        }
        chosen[slot] = Some(command);
        self.sides[slot].participant.deliver(BattleEvent::CommandAccepted);
        Ok(())
    }

    fn validate(&self, slot: Slot, command: BattleCommand) -> Result<(), &'static str> {
        let team = self.sides[slot].participant.team();
        match command {
            BattleCommand::Attack { skill_slot } => {
                let pet = team
                    .active_pet()
                    .filter(|pet| !pet.is_fainted())
                    .ok_or("no pet able to fight")?;
                let skill = pet
                    .skills
                    .get(skill_slot)
                    .copied()
                    .flatten()
                    .and_then(|id| self.catalog.skill(id))
                    .ok_or("invalid skill")?;
                if pet.stats.mana < skill.mana_cost {
                    return Err("not enough mana");
                }
                Ok(())
            }
            BattleCommand::ChangePet { position } if !team.can_switch_to(position) => Err("invalid pet"),
            BattleCommand::ChangePet { .. } | BattleCommand::Flee => Ok(()),
        }
    }

    fn check_forfeits(&mut self, chosen: &[Option<BattleCommand>; 2]) -> Step {
        let limit = self.settings.forfeit_after_missed_rounds;
        let mut forfeited = [false; 2];
        for slot in SLOTS {
            let side = &mut self.sides[slot];
            if chosen[slot].is_some() {
                side.missed_rounds = 0;
            } else {
                side.missed_rounds += 1;
                forfeited[slot] = side.missed_rounds >= limit;
            }
        }
        match forfeited {
            [true, true] => Err(Decided(None)),
            [true, false] => Err(Decided(Some(1))),
            [false, true] => Err(Decided(Some(0))),
            [false, false] => Ok(()),
        }
    }

    // ========================================================================
    // Resolving
    // ========================================================================

    async fn resolve_round(&mut self, chosen: [Option<BattleCommand>; 2]) -> Step {
        for slot in SLOTS {
            if let Some(BattleCommand::ChangePet { position }) = chosen[slot] {
                self.switch_pet(slot, position);
            }
        }

        let mut skills: [Option<SkillId>; 2] = [None, None];
        let mut queued = Vec::new();
        for slot in SLOTS {
            let Some(BattleCommand::Attack { skill_slot }) = chosen[slot] else {
                continue;
            };
            let Some(pet) = self.sides[slot].participant.team().active_pet() else {
                continue;
            };
            let Some(skill) = pet
                .skills
                .get(skill_slot)
                .copied()
                .flatten()
                .and_then(|id| self.catalog.skill(id))
            else {
                continue;
            };
            skills[slot] = Some(skill.id);
            queued.push(QueuedAttack {
                slot,
                skill_speed: skill.speed,
                pet_speed: pet.stats.speed,
            });
        }

        // A side whose pet fainted earlier in the round still acts, through
        // the replacement now in front.
        for slot in resolve::attack_order(&queued) {
            if let Some(skill) = skills[slot] {
                self.attack(slot, skill).await?;
            }
        }
        Ok(())
    }

    async fn attack(&mut self, slot: Slot, skill: SkillId) -> Step {
        let catalog = Arc::clone(&self.catalog);
        let Some(skill) = catalog.skill(skill) else {
            return Ok(());
        };

        let report = {
            let (attacker, defender) = self.pair_mut(slot);
            let Some(attacker_pet) = attacker.team_mut().active_pet_mut() else {
                return Ok(());
            };
            if attacker_pet.is_fainted() {
                return Ok(());
            }
            let Some(defender_pet) = defender.team_mut().active_pet_mut() else {
                return Ok(());
            };
            let hits = resolve::apply_skill(skill, &mut attacker_pet.stats, &mut defender_pet.stats);
            AttackReport {
                attacker: slot,
                skill: skill.id,
                hits,
                attacker_stats: attacker_pet.stats,
                defender_stats: defender_pet.stats,
            }
        };

        let fainted = report.defender_stats.is_fainted();
        self.broadcast(BattleEvent::Attack(report));
        if fainted {
            self.handle_faint(other(slot)).await?;
        }
        Ok(())
    }

    async fn handle_faint(&mut self, slot: Slot) -> Step {
        let position = self.sides[slot].participant.team().active;
        self.broadcast(BattleEvent::PetFainted { slot, position });
        if self.sides[slot].participant.team().all_fainted() {
            return Err(Decided(Some(other(slot))));
        }

        self.broadcast(BattleEvent::ChangePetRequest { slot });
        let choice = self.await_replacement(slot).await;
        let team = self.sides[slot].participant.team();
        let position = choice
            .filter(|position| team.can_switch_to(*position))
            .or_else(|| team.first_standing());
        match position {
            Some(position) => {
                self.switch_pet(slot, position);
                Ok(())
            }
            None => Err(Decided(Some(other(slot)))),
        }
    }

    async fn await_replacement(&mut self, slot: Slot) -> Option<usize> {
        if self.sides[slot].participant.is_auto() {
            return self.sides[slot].participant.choose_replacement();
        }

        let deadline = Instant::now() + self.settings.replacement_timeout;
        loop {
            tokio::select! {
                biased;
                Some(control) = self.channels.control.recv() => {
                    if self.apply_control(control) == Some(slot) {
                        return self.sides[slot].participant.choose_replacement();
                    }
                }
                Some(RoomCommand { slot: from, command }) = self.channels.commands.recv() => {
                    match command {
                        BattleCommand::ChangePet { position }
                            if from == slot && self.sides[slot].participant.team().can_switch_to(position) =>
                        {
                            return Some(position);
                        }
                        _ => self.deny(from, "waiting for a replacement pet"),
                    }
                }
                Some(_) = self.channels.confirms.recv() => {}
                _ = time::sleep_until(deadline) => {
                    tracing::debug!(room = %self.id, slot, "No replacement chosen in time");
                    return None;
                }
            }
        }
    }

    fn switch_pet(&mut self, slot: Slot, position: usize) {
        let team = self.sides[slot].participant.team_mut();
        team.active = position;
        if let Some(pet) = team.active_view() {
            self.broadcast(BattleEvent::PetChanged { slot, position, pet });
        }
    }

    // ========================================================================
    // Awaiting confirmations
    // ========================================================================

    /// Wait until both sides are ready or the confirmation window closes.
    async fn await_confirmations(&mut self) {
        let mut confirmed = SLOTS.map(|slot| self.sides[slot].participant.is_auto());
        let deadline = Instant::now() + self.settings.confirm_timeout;
        while !confirmed.iter().all(|ready| *ready) {
            tokio::select! {
                biased;
                Some(control) = self.channels.control.recv() => {
                    if let Some(slot) = self.apply_control(control) {
                        confirmed[slot] = true;
                    }
                }
                Some(slot) = self.channels.confirms.recv() => {
                    if let Some(ready) = confirmed.get_mut(slot) {
                        *ready = true;
                    }
                }
                Some(RoomCommand { slot, .. }) = self.channels.commands.recv() => {
                    self.deny(slot, "the round has not started");
                }
                _ = time::sleep_until(deadline) => {
                    tracing::debug!(room = %self.id, "Confirmation window closed");
                    break;
                }
            }
        }
    }

    // ========================================================================
    // Ending
    // ========================================================================

    fn decide_by_hp(&self) -> Option<Slot> {
        let hp = SLOTS.map(|slot| self.sides[slot].participant.team().total_hp());
        match hp[0].cmp(&hp[1]) {
            std::cmp::Ordering::Greater => Some(0),
            std::cmp::Ordering::Less => Some(1),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn finish(mut self, winner: Option<Slot>) {
        self.ended.store(true, Ordering::Release);
        tracing::info!(room = %self.id, ?winner, "Battle ended");
        self.broadcast(BattleEvent::Ended { winner });

        for slot in SLOTS {
            let participant = &mut self.sides[slot].participant;
            let team = std::mem::take(participant.team_mut());
            participant.conclude(BattleOutcome {
                room: self.id,
                slot,
                winner,
                team,
            });
        }

        self.channels.commands.close();
        self.channels.confirms.close();
        self.channels.control.close();
        let mut leftovers = 0;
        while self.channels.commands.try_recv().is_ok() {
            leftovers += 1;
        }
        while self.channels.confirms.try_recv().is_ok() {
            leftovers += 1;
        }
        while self.channels.control.try_recv().is_ok() {
            leftovers += 1;
        }
        if leftovers > 0 {
            tracing::debug!(room = %self.id, leftovers, "Dropped queued battle input");
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Seat an auto participant for an abandoned side. Returns the slot.
    fn apply_control(&mut self, control: Control) -> Option<Slot> {
        let Control::Abandon(slot) = control;
        let side = self.sides.get_mut(slot)?;
        if !side.participant.is_auto() {
            tracing::info!(room = %self.id, slot, "Side abandoned, auto participant takes over");
            let auto = AutoParticipant::replacing(side.participant.as_mut());
            side.participant = Box::new(auto);
        }
        Some(slot)
    }

    fn pair_mut(&mut self, first: Slot) -> (&mut Box<dyn BattleParticipant>, &mut Box<dyn BattleParticipant>) {
        let [a, b] = &mut self.sides;
        if first == 0 {
            (&mut a.participant, &mut b.participant)
        } else {
            (&mut b.participant, &mut a.participant)
        }
    }

    fn broadcast(&mut self, event: BattleEvent) {
        for side in &mut self.sides {
            side.participant.deliver(event.clone());
        }
    }

    fn deny(&mut self, slot: Slot, reason: &str) {
        if let Some(side) = self.sides.get_mut(slot) {
            side.participant.deliver(BattleEvent::CommandDenied {
                reason: reason.to_string(),
            });
        }
    }

    fn sync_teams(&mut self) {
        let teams = SLOTS
            .iter()
            .map(|&slot| {
                let participant = &self.sides[slot].participant;
                participant.team().info(slot, participant.name())
            })
            .collect();
        self.broadcast(BattleEvent::Teams { teams });
    }
}

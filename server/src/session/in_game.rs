//! Free roam: areas, chat, mail, bags, pets, NPCs and battle invites.

use super::state::Transition;
use super::{SessionCore, SessionMessage};
use crate::area::{Area, Occupant};
use crate::battle::{BattleParticipant, BattleTeam, PlayerParticipant};
use crate::catalog::{ItemEffect, PetItemEffect, INITIAL_PET};
use crate::error::{Denial, StoreError};
use crate::mail;
use crate::player::{Pet, Player};
use crate::store::Stores;
use std::sync::Arc;
use towber_protocol::{
    BagKind, ChatChannel, ClientId, ClientMessage, InviteId, ItemId, MailId, NpcAction, NpcId, PetKind, PlayerId,
    RoomId, ServerMessage, SessionPhase, Vector2,
};

pub(crate) struct InGame {
    pub(crate) player: Player,
    first_entry: bool,
}

impl InGame {
    /// Right after login.
    pub fn new(player: Player) -> Self {
        Self {
            player,
            first_entry: true,
        }
    }

    /// Back from a battle.
    pub fn resumed(player: Player) -> Self {
        Self {
            player,
            first_entry: false,
        }
    }

    pub fn on_enter(&mut self, core: &mut SessionCore) {
        if self.first_entry {
            self.load_pets(core);
        }
        core.send(ServerMessage::StateChanged {
            phase: SessionPhase::InGame,
        });
        core.send(ServerMessage::PetBag {
            pets: self.player.pets.views(),
        });

        if self.first_entry {
            self.first_entry = false;
            let area = core.ctx.config.default_area.clone();
            self.enter_area(core, &area, 0);
        } else if let Ok(area) = self.current_area(core) {
            area.announce_to(&core.handle);
        }
    }

    pub fn cleanup(&mut self, core: &mut SessionCore) {
        self.leave_area(core);
        self.save_pets(core);
    }

    pub fn handle(&mut self, core: &mut SessionCore, sender: ClientId, message: SessionMessage) -> Option<Transition> {
        match message {
            SessionMessage::Client(message) => {
                tracing::trace!(client = %core.id, %sender, ?message, "Client message");
                match self.handle_client(core, message) {
                    Ok(transition) => return transition,
                    Err(denial) => core.deny(denial),
                }
            }
            SessionMessage::SavePets => self.save_pets(core),
            SessionMessage::EnterBattle { room, slot, opponent } => {
                return Some(Transition::EnterBattle { room, slot, opponent });
            }
            SessionMessage::Battle(_) | SessionMessage::BattleFinished(_) => {
                tracing::trace!(client = %core.id, "Stale battle message ignored");
            }
        }
        None
    }

    fn handle_client(&mut self, core: &mut SessionCore, message: ClientMessage) -> Result<Option<Transition>, Denial> {
        match message {
            ClientMessage::Login { .. } | ClientMessage::Register { .. } => return Err(Denial::AlreadyLoggedIn),
            ClientMessage::EnterArea { area, entrance } => self.enter_area(core, &area, entrance),
            ClientMessage::Chat { channel, text } => self.chat(core, channel, text)?,
            ClientMessage::Move { position } => self.move_to(core, position)?,
            ClientMessage::MailList => {
                let mails = core.ctx.stores.mail.list(self.player.id)?;
                core.send(ServerMessage::MailList { mails });
            }
            ClientMessage::MailDelete { mail } => {
                if !core.ctx.stores.mail.delete(self.player.id, mail)? {
                    return Err(Denial::UnknownMail);
                }
                core.send(ServerMessage::MailDeleted { mail });
            }
            ClientMessage::MailCollect { mail } => self.collect_mail(core, mail)?,
            ClientMessage::BagRequest { bag } => {
                let items = core.ctx.stores.inventory.list(self.player.id, bag)?;
                core.send(ServerMessage::Bag { bag, items });
            }
            ClientMessage::PetBagRequest => self.send_pet_bag(core),
            ClientMessage::UseItem { item, count } => self.use_item(core, item, count)?,
            ClientMessage::UsePetItem { item, slot, count } => self.use_pet_item(core, item, slot, count)?,
            ClientMessage::ChooseStarter { kind } => self.choose_starter(core, kind)?,
            ClientMessage::UnequipPet { slot } => self.unequip(core, slot)?,
            ClientMessage::InteractNpc { npc } => self.interact(core, npc)?,
            ClientMessage::NpcAction { action } => self.npc_action(core, action)?,
            ClientMessage::BattleRequest { target } => self.request_battle(core, target)?,
            ClientMessage::BattleResponse { invite, accept: true } => return self.accept_battle(core, invite),
            ClientMessage::BattleResponse { invite, accept: false } => self.reject_battle(core, invite)?,
            ClientMessage::Battle(_) => return Err(Denial::NotInBattle),
        }
        Ok(None)
    }

    // ========================================================================
    // Areas
    // ========================================================================

    fn current_area(&self, core: &SessionCore) -> Result<Arc<Area>, Denial> {
        self.player
            .area
            .as_deref()
            .and_then(|name| core.ctx.areas.get(name))
            .ok_or(Denial::NoArea)
    }

    fn enter_area(&mut self, core: &mut SessionCore, name: &str, entrance: u32) {
        let refuse = |reason: String| ServerMessage::EnterAreaResult {
            area: name.to_string(),
            success: false,
            reason,
        };
        let Some(area) = core.ctx.areas.get(name) else {
            core.send(refuse(Denial::UnknownArea.to_string()));
            return;
        };
        if let Err(reason) = area.check_can_enter(&self.player) {
            core.send(refuse(reason));
            return;
        }

        self.leave_area(core);
        core.send(ServerMessage::EnterAreaResult {
            area: name.to_string(),
            success: true,
            reason: String::new(),
        });
        let position = area.add_player(Occupant::new(&self.player, core.handle.clone()), entrance);
        self.player.area = Some(name.to_string());
        self.player.position = position;
        self.player.npc = None;
    }

    fn leave_area(&mut self, core: &SessionCore) {
        let Some(name) = self.player.area.take() else {
            return;
        };
        if let Some(area) = core.ctx.areas.get(&name) {
            area.remove_player(self.player.id);
        }
    }

    fn chat(&self, core: &SessionCore, channel: ChatChannel, text: String) -> Result<(), Denial> {
        match channel {
            ChatChannel::Global => {
                let message = ServerMessage::Chat {
                    channel,
                    player: self.player.id,
                    username: self.player.name.clone(),
                    text,
                };
                for session in core.ctx.hub.logged_in() {
                    session.socket_send_as(message.clone(), core.id);
                }
            }
            ChatChannel::Area => {
                self.current_area(core)?.chat(self.player.id, &self.player.name, text);
            }
        }
        Ok(())
    }

    fn move_to(&mut self, core: &SessionCore, position: Vector2) -> Result<(), Denial> {
        self.current_area(core)?.move_player(self.player.id, position);
        self.player.position = position;
        Ok(())
    }

    // ========================================================================
    // Mail and bags
    // ========================================================================

    fn collect_mail(&self, core: &SessionCore, mail: MailId) -> Result<(), Denial> {
        let collected = mail::collect(&core.ctx.stores, self.player.id, mail)?;
        for granted in &collected.granted {
            core.send(ServerMessage::BagChanged {
                bag: granted.item.bag,
                item: granted.item.item,
                count: granted.new_count,
            });
        }
        match collected.failure {
            Some(failure) => Err(failure.into()),
            None => {
                core.send(ServerMessage::MailDeleted { mail });
                Ok(())
            }
        }
    }

    fn use_item(&self, core: &SessionCore, item: ItemId, count: u32) -> Result<(), Denial> {
        let template = core.ctx.catalog.item(item).ok_or(Denial::UnknownItem)?;
        let owned = core.ctx.stores.inventory.count(self.player.id, BagKind::Items, item)?;
        if owned < count.max(1) {
            return Err(StoreError::Insufficient.into());
        }
        match &template.effect {
            ItemEffect::OpenUi(path) => core.send(ServerMessage::OpenUi { path: path.clone() }),
        }
        Ok(())
    }

    // ========================================================================
    // Pets
    // ========================================================================

    fn send_pet_bag(&self, core: &SessionCore) {
        core.send(ServerMessage::PetBag {
            pets: self.player.pets.views(),
        });
    }

    fn load_pets(&mut self, core: &SessionCore) {
        match core.ctx.stores.pets.load_equipped(self.player.id) {
            Ok(slots) => *self.player.pets.write() = slots,
            Err(e) => tracing::warn!(player = %self.player.id, "Could not load pets: {e}"),
        }
    }

    fn save_pets(&self, core: &SessionCore) {
        save_pets(&core.ctx.stores, self.player.id, &self.player.pets.snapshot());
    }

    fn use_pet_item(&self, core: &SessionCore, item: ItemId, slot: usize, count: u32) -> Result<(), Denial> {
        let catalog = &core.ctx.catalog;
        let stores = &core.ctx.stores;
        let template = catalog.pet_item(item).ok_or(Denial::UnknownItem)?;
        let count = count.max(1);
        {
            let pets = self.player.pets.read();
            let pet = pets.get(slot).and_then(Option::as_ref).ok_or(Denial::UnknownPet)?;
            if pet.exp >= catalog.max_exp() {
                return Err(Denial::MaxLevel);
            }
        }

        let remaining = stores.inventory.remove(self.player.id, BagKind::PetItems, item, count)?;
        core.send(ServerMessage::BagChanged {
            bag: BagKind::PetItems,
            item,
            count: remaining,
        });

        let updated = {
            let mut pets = self.player.pets.write();
            let pet = pets.get_mut(slot).and_then(Option::as_mut).ok_or(Denial::UnknownPet)?;
            match template.effect {
                PetItemEffect::Experience(per_unit) => {
                    pet.gain_exp(per_unit.saturating_mul(count), catalog)?;
                }
            }
            pet.clone()
        };
        stores.pets.save_pet(self.player.id, &updated)?;
        core.send(ServerMessage::PetUpdated {
            slot,
            pet: updated.view(),
        });
        Ok(())
    }

    fn choose_starter(&self, core: &SessionCore, kind: PetKind) -> Result<(), Denial> {
        let stores = &core.ctx.stores;
        let template = core
            .ctx
            .catalog
            .pet(kind)
            .filter(|template| template.starter)
            .ok_or(Denial::UnknownPet)?;

        let remaining = stores.inventory.remove(self.player.id, BagKind::Items, INITIAL_PET, 1)?;
        core.send(ServerMessage::BagChanged {
            bag: BagKind::Items,
            item: INITIAL_PET,
            count: remaining,
        });

        let pet = stores.pets.create_pet(self.player.id, Pet::from_template(template))?;
        let free = self.player.pets.read().iter().position(Option::is_none);
        let equipped = match free {
            Some(slot) => {
                stores.pets.set_slot(self.player.id, slot, Some(pet.id))?;
                self.player.pets.write()[slot] = Some(pet.clone());
                true
            }
            None => false,
        };

        tracing::info!(player = %self.player.id, pet = %pet.id, equipped, "Starter pet chosen");
        core.send(ServerMessage::GetPet {
            pet: pet.view(),
            equipped,
        });
        Ok(())
    }

    /// Take a pet out of the team, shifting later pets left.
    fn unequip(&self, core: &SessionCore, slot: usize) -> Result<(), Denial> {
        let stores = &core.ctx.stores;
        let (removed, slots) = {
            let mut pets = self.player.pets.write();
            let removed = pets.get_mut(slot).and_then(Option::take).ok_or(Denial::UnknownPet)?;
            pets[slot..].rotate_left(1);
            (removed, pets.clone())
        };

        stores.pets.save_pet(self.player.id, &removed)?;
        for (index, pet) in slots.iter().enumerate() {
            stores.pets.set_slot(self.player.id, index, pet.as_ref().map(|pet| pet.id))?;
        }
        self.send_pet_bag(core);
        Ok(())
    }

    // ========================================================================
    // NPCs
    // ========================================================================

    fn interact(&mut self, core: &SessionCore, npc: NpcId) -> Result<(), Denial> {
        let area = self.current_area(core)?;
        let npc = area.npc(npc).ok_or(Denial::UnknownNpc)?;
        self.player.npc = Some(npc.id);
        core.send(ServerMessage::OpenUi { path: npc.ui.clone() });
        Ok(())
    }

    fn npc_action(&self, core: &SessionCore, action: NpcAction) -> Result<(), Denial> {
        let area = self.current_area(core)?;
        let npc = self.player.npc.and_then(|id| area.npc(id)).ok_or(Denial::NoNpc)?;
        npc.perform(action, &self.player)?;
        self.send_pet_bag(core);
        self.save_pets(core);
        Ok(())
    }

    // ========================================================================
    // Battle invites
    // ========================================================================

    fn request_battle(&self, core: &SessionCore, target: PlayerId) -> Result<(), Denial> {
        let area = self.current_area(core)?;
        let invite = area.request_battle(&core.ctx.battles, &self.player, target)?;
        tracing::info!(player = %self.player.id, %target, %invite, "Battle requested");
        core.send(ServerMessage::Ok);
        Ok(())
    }

    fn reject_battle(&self, core: &SessionCore, invite: InviteId) -> Result<(), Denial> {
        let area = self.current_area(core)?;
        let board = area.invites().ok_or(Denial::BattleForbidden)?;
        let invite = board.reject(invite, self.player.id)?;
        if let Some(inviter) = area.occupant(invite.inviter) {
            inviter
                .handle
                .deny(&Denial::Rejected(self.player.name.clone()));
        }
        Ok(())
    }

    /// Start a room for an invite this player received.
    ///
    /// The inviter takes slot 0 and is told through its inbox; this session
    /// takes slot 1 by returning the transition directly.
    fn accept_battle(&self, core: &SessionCore, invite: InviteId) -> Result<Option<Transition>, Denial> {
        let area = self.current_area(core)?;
        let board = area.invites().ok_or(Denial::BattleForbidden)?;
        let invite = board.accept(invite, self.player.id)?;
        let inviter = area.occupant(invite.inviter).ok_or(Denial::InviterUnavailable)?;

        let inviter_team = BattleTeam::new(inviter.pets.snapshot()).ok_or(Denial::NoFightingPet)?;
        let own_team = BattleTeam::new(self.player.pets.snapshot()).ok_or(Denial::NoFightingPet)?;
        let sides: [Box<dyn BattleParticipant>; 2] = [
            Box::new(PlayerParticipant::new(
                inviter.id,
                inviter.name.clone(),
                inviter.handle.clone(),
                inviter_team,
            )),
            Box::new(PlayerParticipant::new(
                self.player.id,
                self.player.name.clone(),
                core.handle.clone(),
                own_team,
            )),
        ];

        let prepared = core.ctx.battles.prepare(RoomId::from(invite.id), sides)?;
        let room = prepared.handle();
        inviter
            .handle
            .process_message(
                ClientId::SERVER,
                SessionMessage::EnterBattle {
                    room: room.clone(),
                    slot: 0,
                    opponent: self.player.name.clone(),
                },
            )
            .map_err(|_| Denial::InviterUnavailable)?;
        prepared.spawn();

        Ok(Some(Transition::EnterBattle {
            room,
            slot: 1,
            opponent: inviter.name,
        }))
    }
}

/// Persist every equipped pet. Failures are retried on the next save.
pub(super) fn save_pets(stores: &Stores, player: PlayerId, pets: &[Option<Pet>]) {
    for pet in pets.iter().flatten() {
        if let Err(e) = stores.pets.save_pet(player, pet) {
            tracing::error!(%player, pet = %pet.id, "Could not save pet: {e}");
        }
    }
}

//! Areas: shared spaces players walk around in.
//!
//! An area keeps a concurrent map of its occupants. Every broadcast iterates
//! over a snapshot of that map, so a player leaving mid-broadcast is simply
//! missed or reached, never observed half-removed. Membership changes are
//! serialized per area so that the "enter" announcements a newcomer causes
//! match the occupants present just before it joined.

pub mod invite;
pub mod npc;

use crate::battle::BattleManager;
use crate::config::ServerConfig;
use crate::error::Denial;
use crate::player::{Player, SharedPetBag};
use crate::session::SessionHandle;
use dashmap::DashMap;
use invite::InviteBoard;
use npc::Npc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use towber_protocol::{
    ChatChannel, ClientId, InviteId, NpcAction, NpcId, PlayerId, ServerMessage, Vector2,
};

pub const INITIAL_VILLAGE: &str = "InitialVillage";
pub const ADVENTURE_HUB: &str = "AdventureHub";

/// What an area knows about a present player.
#[derive(Debug, Clone)]
pub struct Occupant {
    pub id: PlayerId,
    pub name: String,
    pub position: Vector2,
    pub handle: SessionHandle,
    pub pets: SharedPetBag,
}

impl Occupant {
    pub fn new(player: &Player, handle: SessionHandle) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            position: player.position,
            handle,
            pets: player.pets.clone(),
        }
    }

    fn enter_message(&self) -> ServerMessage {
        ServerMessage::PlayerEnter {
            player: self.id,
            username: self.name.clone(),
            position: self.position,
        }
    }
}

/// Spawn points by entrance id.
#[derive(Debug, Clone)]
pub struct EntranceTable {
    points: HashMap<u32, Vector2>,
    fallback: Vector2,
}

impl EntranceTable {
    pub fn new(fallback: Vector2) -> Self {
        Self {
            points: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, entrance: u32, point: Vector2) -> Self {
        self.points.insert(entrance, point);
        self
    }

    pub fn point(&self, entrance: u32) -> Vector2 {
        self.points.get(&entrance).copied().unwrap_or(self.fallback)
    }
}

pub struct Area {
    name: String,
    entrances: EntranceTable,
    occupants: DashMap<PlayerId, Occupant>,
    membership: Mutex<()>,
    npcs: Vec<Npc>,
    /// Present only where battles may be arranged.
    invites: Option<Arc<InviteBoard>>,
}

impl Area {
    pub fn new(name: impl Into<String>, entrances: EntranceTable) -> Self {
        Self {
            name: name.into(),
            entrances,
            occupants: DashMap::new(),
            membership: Mutex::new(()),
            npcs: Vec::new(),
            invites: None,
        }
    }

    pub fn with_npc(mut self, npc: Npc) -> Self {
        self.npcs.push(npc);
        self
    }

    pub fn with_battles(mut self, invite_expiry: Duration) -> Self {
        self.invites = Some(Arc::new(InviteBoard::new(invite_expiry)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a player may enter. The error is the reason shown to them.
    pub fn check_can_enter(&self, _player: &Player) -> Result<(), String> {
        Ok(())
    }

    /// Place a player at an entrance and introduce everyone.
    ///
    /// Existing occupants learn about the newcomer, the newcomer learns about
    /// them and finally receives its own spawn position. Re-adding a present
    /// player only refreshes its entry.
    pub fn add_player(&self, mut occupant: Occupant, entrance: u32) -> Vector2 {
        let position = self.entrances.point(entrance);
        occupant.position = position;
        let announcement = occupant.enter_message();
        let handle = occupant.handle.clone();
        let id = occupant.id;

        let _guard = self.membership.lock().unwrap_or_else(PoisonError::into_inner);
        let others = self.snapshot_except(Some(id));
        let was_present = self.occupants.insert(id, occupant).is_some();

        if !was_present {
            for other in &others {
                other.handle.socket_send(announcement.clone());
            }
        }
        for other in &others {
            handle.socket_send(other.enter_message());
        }
        handle.socket_send(announcement);

        tracing::info!(area = %self.name, player = %id, "Player entered area");
        position
    }

    /// Remove a player and tell the rest. Unknown ids are ignored.
    pub fn remove_player(&self, id: PlayerId) -> Option<Occupant> {
        let _guard = self.membership.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, removed) = self.occupants.remove(&id)?;
        self.broadcast(Some(id), ServerMessage::PlayerLeave { player: id }, true);
        tracing::info!(area = %self.name, player = %id, "Player left area");
        Some(removed)
    }

    /// Update a position and tell everyone but the mover.
    pub fn move_player(&self, id: PlayerId, position: Vector2) {
        match self.occupants.get_mut(&id) {
            Some(mut occupant) => occupant.position = position,
            None => return,
        }
        self.broadcast(Some(id), ServerMessage::PlayerMove { player: id, position }, true);
    }

    /// Area chat, echoed back to the speaker.
    pub fn chat(&self, id: PlayerId, username: &str, text: String) {
        let message = ServerMessage::Chat {
            channel: ChatChannel::Area,
            player: id,
            username: username.to_string(),
            text,
        };
        self.broadcast(Some(id), message, false);
    }

    /// Send to every occupant, optionally skipping the origin.
    pub fn broadcast(&self, origin: Option<PlayerId>, message: ServerMessage, exclude_origin: bool) {
        let skip = if exclude_origin { origin } else { None };
        let sender = origin.map(ClientId::from).unwrap_or(ClientId::SERVER);
        for occupant in self.snapshot_except(skip) {
            occupant.handle.socket_send_as(message.clone(), sender);
        }
    }

    /// Re-send the current membership to one player.
    pub fn announce_to(&self, handle: &SessionHandle) {
        for occupant in self.snapshot_except(None) {
            handle.socket_send(occupant.enter_message());
        }
    }

    pub fn occupant(&self, id: PlayerId) -> Option<Occupant> {
        self.occupants.get(&id).map(|entry| entry.value().clone())
    }

    pub fn occupant_ids(&self) -> Vec<PlayerId> {
        self.occupants.iter().map(|entry| *entry.key()).collect()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.occupants.contains_key(&id)
    }

    pub fn npc(&self, id: NpcId) -> Option<&Npc> {
        self.npcs.iter().find(|npc| npc.id == id)
    }

    pub fn invites(&self) -> Option<&Arc<InviteBoard>> {
        self.invites.as_ref()
    }

    /// Invite a present player to a battle.
    pub fn request_battle(&self, battles: &BattleManager, inviter: &Player, target: PlayerId) -> Result<InviteId, Denial> {
        let board = self.invites.as_ref().ok_or(Denial::BattleForbidden)?;
        if target == inviter.id {
            return Err(Denial::BadBattleTarget);
        }
        let target_occupant = self.occupant(target).ok_or(Denial::BadBattleTarget)?;
        if battles.is_in_battle(inviter.id) || battles.is_in_battle(target) {
            return Err(Denial::AlreadyInBattle);
        }

        let invite = board.create(InviteId(battles.next_room_id().0), inviter.id, target);
        target_occupant.handle.socket_send(ServerMessage::BattleInvite {
            invite: invite.id,
            from: inviter.id,
            username: inviter.name.clone(),
        });
        Ok(invite.id)
    }

    fn snapshot_except(&self, skip: Option<PlayerId>) -> Vec<Occupant> {
        self.occupants
            .iter()
            .filter(|entry| Some(*entry.key()) != skip)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Every area of the world, by name.
pub struct AreaManager {
    areas: HashMap<String, Arc<Area>>,
}

impl AreaManager {
    pub fn new(areas: impl IntoIterator<Item = Area>) -> Self {
        Self {
            areas: areas
                .into_iter()
                .map(|area| (area.name.clone(), Arc::new(area)))
                .collect(),
        }
    }

    /// The built-in world.
    pub fn standard(config: &ServerConfig) -> Self {
        let village = Area::new(
            INITIAL_VILLAGE,
            EntranceTable::new(Vector2::new(184.0, 145.0)).with(0, Vector2::new(100.0, 100.0)),
        )
        .with_npc(Npc::new(
            NpcId(1),
            "village head",
            "initial_village_header",
            Vector2::new(230.0, 140.0),
        ))
        .with_npc(
            Npc::new(NpcId(2), "healer", "healer", Vector2::new(260.0, 140.0)).with_action(NpcAction::Heal),
        );

        let hub = Area::new(ADVENTURE_HUB, EntranceTable::new(Vector2::new(152.0, 240.0)))
            .with_battles(config.invite_expiry);

        Self::new([village, hub])
    }

    pub fn get(&self, name: &str) -> Option<Arc<Area>> {
        self.areas.get(name).cloned()
    }

    pub fn invite_boards(&self) -> Vec<Arc<InviteBoard>> {
        self.areas
            .values()
            .filter_map(|area| area.invites.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::detached_handle_with_outbound;
    use crate::session::Outbound;
    use tokio::sync::mpsc;

    struct Member {
        player: Player,
        handle: SessionHandle,
        outbound: mpsc::Receiver<Outbound>,
    }

    fn member(id: u32, name: &str) -> Member {
        let (handle, _inbox, outbound) = detached_handle_with_outbound(16);
        handle.set_id(ClientId(id));
        Member {
            player: Player::new(PlayerId(id), name),
            handle,
            outbound,
        }
    }

    fn drain(outbound: &mut mpsc::Receiver<Outbound>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(envelope) = outbound.try_recv() {
            messages.push(envelope.message);
        }
        messages
    }

    fn entered(messages: &[ServerMessage]) -> Vec<PlayerId> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::PlayerEnter { player, .. } => Some(*player),
                _ => None,
            })
            .collect()
    }

    fn village() -> Area {
        Area::new(
            INITIAL_VILLAGE,
            EntranceTable::new(Vector2::new(184.0, 145.0)).with(0, Vector2::new(100.0, 100.0)),
        )
    }

    #[tokio::test]
    async fn test_enter_announcements_match_prior_occupants() {
        let area = village();
        let mut members: Vec<Member> = (1..=3).map(|i| member(i, &format!("p{i}"))).collect();
        for m in &members[..2] {
            area.add_player(Occupant::new(&m.player, m.handle.clone()), 1);
        }
        for m in members.iter_mut() {
            drain(&mut m.outbound);
        }

        let newcomer = &members[2];
        let position = area.add_player(Occupant::new(&newcomer.player, newcomer.handle.clone()), 0);
        assert_eq!(position, Vector2::new(100.0, 100.0));

        for m in &mut members[..2] {
            assert_eq!(entered(&drain(&mut m.outbound)), vec![PlayerId(3)]);
        }

        // The newcomer hears about the two others, then its own spawn exactly once.
        let newcomer_view = drain(&mut members[2].outbound);
        let mut seen = entered(&newcomer_view);
        assert_eq!(seen.pop(), Some(PlayerId(3)));
        seen.sort();
        assert_eq!(seen, vec![PlayerId(1), PlayerId(2)]);
    }

    #[tokio::test]
    async fn test_readding_does_not_reannounce() {
        let area = village();
        let mut a = member(1, "a");
        let b = member(2, "b");
        area.add_player(Occupant::new(&a.player, a.handle.clone()), 0);
        area.add_player(Occupant::new(&b.player, b.handle.clone()), 0);
        drain(&mut a.outbound);

        area.add_player(Occupant::new(&b.player, b.handle.clone()), 1);
        assert!(entered(&drain(&mut a.outbound)).is_empty());
        assert_eq!(area.occupant_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_move_skips_sender_and_chat_echoes() {
        let area = village();
        let mut a = member(1, "a");
        let mut b = member(2, "b");
        area.add_player(Occupant::new(&a.player, a.handle.clone()), 0);
        area.add_player(Occupant::new(&b.player, b.handle.clone()), 0);
        drain(&mut a.outbound);
        drain(&mut b.outbound);

        area.move_player(PlayerId(1), Vector2::new(5.0, 6.0));
        assert!(drain(&mut a.outbound).is_empty());
        assert!(matches!(
            drain(&mut b.outbound).as_slice(),
            [ServerMessage::PlayerMove { player: PlayerId(1), .. }]
        ));

        area.chat(PlayerId(1), "a", "hi".into());
        assert_eq!(drain(&mut a.outbound).len(), 1);
        assert_eq!(drain(&mut b.outbound).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_paired() {
        let area = village();
        let a = member(1, "a");
        let mut b = member(2, "b");
        assert!(area.remove_player(PlayerId(1)).is_none());

        area.add_player(Occupant::new(&a.player, a.handle.clone()), 0);
        area.add_player(Occupant::new(&b.player, b.handle.clone()), 0);
        drain(&mut b.outbound);

        assert!(area.remove_player(PlayerId(1)).is_some());
        assert!(matches!(
            drain(&mut b.outbound).as_slice(),
            [ServerMessage::PlayerLeave { player: PlayerId(1) }]
        ));
        assert!(area.remove_player(PlayerId(1)).is_none());
    }

    #[test]
    fn test_standard_world() {
        let areas = AreaManager::standard(&ServerConfig::default());
        let village = areas.get(INITIAL_VILLAGE).unwrap();
        assert!(village.invites().is_none());
        assert!(village.npc(NpcId(2)).unwrap().supports(NpcAction::Heal));

        let hub = areas.get(ADVENTURE_HUB).unwrap();
        assert!(hub.invites().is_some());
        assert_eq!(hub.entrances.point(7), Vector2::new(152.0, 240.0));
        assert_eq!(areas.invite_boards().len(), 1);
    }

}

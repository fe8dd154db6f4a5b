//! Wire protocol shared by the towber server and its clients.
//!
//! Every message travels as JSON inside a length-prefixed frame. Enums are
//! adjacently tagged (`type` / `data`) so nested payloads stay self-describing.

mod battle;
mod ids;
mod pet;

pub use battle::{AttackReport, BattleCommand, BattleEvent, BattleInput, Slot, TeamInfo};
pub use ids::{ClientId, InviteId, ItemId, MailId, NpcId, PetId, PetKind, PlayerId, RoomId, SkillId};
pub use pet::{BagKind, ItemStack, Mail, MailItem, PetStats, PetView, SKILL_SLOTS, TEAM_SIZE};

use serde::{Deserialize, Serialize};

/// Position in an area.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatChannel {
    /// Every logged-in player.
    Global,
    /// Players in the sender's area.
    Area,
}

/// Coarse session phase, reported to the client on transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Connected,
    InGame,
    InBattle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NpcAction {
    /// Restore every equipped pet to full health.
    Heal,
}

/// Messages sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    Login { username: String, password: String },
    Register { username: String, password: String },
    EnterArea { area: String, entrance: u32 },
    Chat { channel: ChatChannel, text: String },
    Move { position: Vector2 },
    MailList,
    MailDelete { mail: MailId },
    MailCollect { mail: MailId },
    BagRequest { bag: BagKind },
    PetBagRequest,
    UseItem { item: ItemId, count: u32 },
    UsePetItem { item: ItemId, slot: usize, count: u32 },
    ChooseStarter { kind: PetKind },
    UnequipPet { slot: usize },
    InteractNpc { npc: NpcId },
    NpcAction { action: NpcAction },
    BattleRequest { target: PlayerId },
    BattleResponse { invite: InviteId, accept: bool },
    Battle(BattleInput),
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// A request was refused. No state was changed.
    Deny { reason: String },
    Ok,
    LoginSuccess { player: PlayerId, username: String },
    StateChanged { phase: SessionPhase },
    EnterAreaResult { area: String, success: bool, reason: String },
    PlayerEnter { player: PlayerId, username: String, position: Vector2 },
    PlayerLeave { player: PlayerId },
    PlayerMove { player: PlayerId, position: Vector2 },
    Chat { channel: ChatChannel, player: PlayerId, username: String, text: String },
    MailList { mails: Vec<Mail> },
    MailDeleted { mail: MailId },
    Bag { bag: BagKind, items: Vec<ItemStack> },
    /// New count of an item after a grant or use.
    BagChanged { bag: BagKind, item: ItemId, count: u32 },
    PetBag { pets: Vec<Option<PetView>> },
    PetUpdated { slot: usize, pet: PetView },
    GetPet { pet: PetView, equipped: bool },
    OpenUi { path: String },
    BattleInvite { invite: InviteId, from: PlayerId, username: String },
    StartBattle { slot: Slot, opponent: String },
    Battle(BattleEvent),
}

/// A message together with the client it originates from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub sender: ClientId,
    pub message: M,
}

impl<M> Envelope<M> {
    pub fn new(sender: ClientId, message: M) -> Self {
        Self { sender, message }
    }

    pub fn from_server(message: M) -> Self {
        Self::new(ClientId::SERVER, message)
    }
}

impl From<BattleEvent> for ServerMessage {
    fn from(event: BattleEvent) -> Self {
        ServerMessage::Battle(event)
    }
}

impl ServerMessage {
    pub fn deny(reason: impl Into<String>) -> Self {
        ServerMessage::Deny {
            reason: reason.into(),
        }
    }
}

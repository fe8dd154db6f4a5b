//! Battle rooms.
//!
//! A room is a task that owns both sides of a two-player match and runs the
//! round loop to completion. Sessions talk to it through a
//! [`BattleRoomHandle`], whose sends never block: commands and confirmations
//! go through capacity-2 queues, disconnects through an unbounded control
//! queue. Every wait inside the room is bounded by a timeout, so a room
//! always ends and always deregisters itself.

pub mod participant;
mod resolve;
mod room;


pub use participant::{AutoParticipant, BattleParticipant, BattleTeam, PlayerParticipant};

use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::error::Denial;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use room::BattleRoom;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use towber_protocol::{BattleCommand, PlayerId, RoomId, Slot};

/// Capacity of the command and confirmation queues: one per side.
const ROOM_QUEUE_CAPACITY: usize = 2;

/// Timing and termination rules of a room.
#[derive(Debug, Clone)]
pub struct BattleSettings {
    pub round_timeout: Duration,
    pub confirm_timeout: Duration,
    pub replacement_timeout: Duration,
    pub max_rounds: u32,
    pub forfeit_after_missed_rounds: u32,
}

impl BattleSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            round_timeout: config.round_timeout,
            confirm_timeout: config.confirm_timeout,
            replacement_timeout: config.replacement_timeout,
            max_rounds: config.max_rounds,
            forfeit_after_missed_rounds: config.forfeit_after_missed_rounds,
        }
    }
}

/// What a side gets back when its room ends.
#[derive(Debug, Clone)]
pub struct BattleOutcome {
    pub room: RoomId,
    pub slot: Slot,
    /// `None` for a draw.
    pub winner: Option<Slot>,
    pub team: BattleTeam,
}

impl BattleOutcome {
    pub fn won(&self) -> bool {
        self.winner == Some(self.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("the battle is over")]
    Ended,
    #[error("a command is already waiting")]
    Busy,
    #[error("the battle room is gone")]
    Closed,
}

#[derive(Debug)]
pub(crate) enum Control {
    /// The side's session left; an auto participant takes its seat.
    Abandon(Slot),
}

pub(crate) struct RoomCommand {
    pub slot: Slot,
    pub command: BattleCommand,
}

/// Cheap, cloneable way in to a running room.
#[derive(Clone)]
pub struct BattleRoomHandle {
    id: RoomId,
    commands: mpsc::Sender<RoomCommand>,
    confirms: mpsc::Sender<Slot>,
    control: mpsc::UnboundedSender<Control>,
    ended: Arc<AtomicBool>,
}

impl BattleRoomHandle {
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn submit_command(&self, slot: Slot, command: BattleCommand) -> Result<(), CommandError> {
        if self.is_ended() {
            return Err(CommandError::Ended);
        }
        self.commands
            .try_send(RoomCommand { slot, command })
            .map_err(queue_error)
    }

    pub fn confirm_round(&self, slot: Slot) -> Result<(), CommandError> {
        if self.is_ended() {
            return Err(CommandError::Ended);
        }
        self.confirms.try_send(slot).map_err(queue_error)
    }

    /// Hand the slot to an auto participant. Safe to call more than once.
    pub fn abandon(&self, slot: Slot) {
        if self.is_ended() {
            return;
        }
        if self.control.send(Control::Abandon(slot)).is_err() {
            tracing::debug!(room = %self.id, slot, "Abandon after room shut down");
        }
    }
}

fn queue_error<T>(e: mpsc::error::TrySendError<T>) -> CommandError {
    match e {
        mpsc::error::TrySendError::Full(_) => CommandError::Busy,
        mpsc::error::TrySendError::Closed(_) => CommandError::Closed,
    }
}

impl std::fmt::Debug for BattleRoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleRoomHandle")
            .field("id", &self.id)
            .field("ended", &self.is_ended())
            .finish()
    }
}

// ============================================================================
// BattleManager
// ============================================================================

/// Registry of running rooms and of the players fighting in them.
pub struct BattleManager {
    rooms: Arc<DashMap<RoomId, BattleRoomHandle>>,
    players: Arc<DashMap<PlayerId, RoomId>>,
    next_id: AtomicU32,
    settings: BattleSettings,
    catalog: Arc<Catalog>,
}

impl BattleManager {
    pub fn new(settings: BattleSettings, catalog: Arc<Catalog>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            players: Arc::new(DashMap::new()),
            next_id: AtomicU32::new(1),
            settings,
            catalog,
        }
    }

    /// Room ids are never reused.
    pub fn next_room_id(&self) -> RoomId {
        RoomId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_in_battle(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    pub fn room(&self, id: RoomId) -> Option<BattleRoomHandle> {
        self.rooms.get(&id).map(|entry| entry.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Reserve both players for a room and build it without starting it.
    ///
    /// Fails if either player is already fighting. Dropping the returned
    /// room without spawning it releases the reservation.
    pub fn prepare(&self, id: RoomId, sides: [Box<dyn BattleParticipant>; 2]) -> Result<PreparedRoom, Denial> {
        let mut registration = Registration {
            id,
            players: Vec::new(),
            rooms: Arc::clone(&self.rooms),
            index: Arc::clone(&self.players),
        };
        for player in sides.iter().filter_map(|side| side.player()) {
            match self.players.entry(player) {
                Entry::Occupied(_) => return Err(Denial::AlreadyInBattle),
                Entry::Vacant(entry) => {
                    entry.insert(id);
                    registration.players.push(player);
                }
            }
        }

        let (command_tx, command_rx) = mpsc::channel(ROOM_QUEUE_CAPACITY);
        let (confirm_tx, confirm_rx) = mpsc::channel(ROOM_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let ended = Arc::new(AtomicBool::new(false));

        let handle = BattleRoomHandle {
            id,
            commands: command_tx,
            confirms: confirm_tx,
            control: control_tx,
            ended: Arc::clone(&ended),
        };
        self.rooms.insert(id, handle.clone());

        let room = BattleRoom::new(
            id,
            sides,
            room::RoomChannels {
                commands: command_rx,
                confirms: confirm_rx,
                control: control_rx,
            },
            ended,
            self.settings.clone(),
            Arc::clone(&self.catalog),
        );
        Ok(PreparedRoom {
            handle,
            room,
            registration,
        })
    }
}

/// A room with its players reserved, not yet running.
pub struct PreparedRoom {
    handle: BattleRoomHandle,
    room: BattleRoom,
    registration: Registration,
}

impl PreparedRoom {
    pub fn handle(&self) -> BattleRoomHandle {
        self.handle.clone()
    }

    /// Start the room's task. The room deregisters itself when the task ends.
    pub fn spawn(self) -> JoinHandle<()> {
        let PreparedRoom {
            room, registration, ..
        } = self;
        tokio::spawn(async move {
            let _registration = registration;
            room.run().await;
        })
    }
}

/// Removes a room and its players from the manager when dropped.
struct Registration {
    id: RoomId,
    players: Vec<PlayerId>,
    rooms: Arc<DashMap<RoomId, BattleRoomHandle>>,
    index: Arc<DashMap<PlayerId, RoomId>>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        for player in &self.players {
            self.index.remove_if(player, |_, room| *room == self.id);
        }
        self.rooms.remove(&self.id);
        tracing::debug!(room = %self.id, "Battle room deregistered");
    }
}

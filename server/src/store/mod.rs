//! Persistence collaborators.
//!
//! The core only talks to storage through these traits. Every method is
//! synchronous and short; implementations must not block on other sessions.
//! [`memory`] provides the in-process backends used by the binary and tests.

pub mod memory;

use crate::error::StoreError;
use crate::player::{Pet, PetSlots};
use std::sync::Arc;
use towber_protocol::{BagKind, ItemId, ItemStack, Mail, MailId, MailItem, PetId, PlayerId};

/// Maximum count of a single item in a bag.
pub const ITEM_CAP: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: PlayerId,
    pub username: String,
}

pub trait AccountStore: Send + Sync {
    fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<Account>, StoreError>;

    fn username_exists(&self, username: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::DuplicateUsername`] if the name is taken.
    fn create_account(&self, username: &str, password: &str) -> Result<Account, StoreError>;
}

pub trait PetStore: Send + Sync {
    /// Create the empty equipped-pet record of a new player.
    fn init_pet_bag(&self, player: PlayerId) -> Result<(), StoreError>;

    fn load_equipped(&self, player: PlayerId) -> Result<PetSlots, StoreError>;

    fn save_pet(&self, owner: PlayerId, pet: &Pet) -> Result<(), StoreError>;

    /// Store a new pet and return it with its assigned id.
    fn create_pet(&self, owner: PlayerId, pet: Pet) -> Result<Pet, StoreError>;

    fn set_slot(&self, player: PlayerId, slot: usize, pet: Option<PetId>) -> Result<(), StoreError>;
}

/// Counted inventory with atomic conditional updates.
pub trait InventoryStore: Send + Sync {
    /// Add items, failing if the result would exceed [`ITEM_CAP`].
    ///
    /// Returns the new count.
    fn add(&self, player: PlayerId, bag: BagKind, item: ItemId, count: u32) -> Result<u32, StoreError>;

    /// Remove items, failing if fewer than `count` are present.
    ///
    /// Returns the new count.
    fn remove(&self, player: PlayerId, bag: BagKind, item: ItemId, count: u32) -> Result<u32, StoreError>;

    fn count(&self, player: PlayerId, bag: BagKind, item: ItemId) -> Result<u32, StoreError>;

    fn list(&self, player: PlayerId, bag: BagKind) -> Result<Vec<ItemStack>, StoreError>;
}

pub trait MailStore: Send + Sync {
    fn append(&self, player: PlayerId, sender: &str, text: &str, items: Vec<MailItem>) -> Result<MailId, StoreError>;

    fn list(&self, player: PlayerId) -> Result<Vec<Mail>, StoreError>;

    fn get(&self, player: PlayerId, mail: MailId) -> Result<Option<Mail>, StoreError>;

    /// Returns whether the mail existed.
    fn delete(&self, player: PlayerId, mail: MailId) -> Result<bool, StoreError>;

    /// Overwrite the attachments of a mail.
    fn replace_items(&self, player: PlayerId, mail: MailId, items: Vec<MailItem>) -> Result<(), StoreError>;
}

/// The set of collaborators a server runs against.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub pets: Arc<dyn PetStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub mail: Arc<dyn MailStore>,
}

impl Stores {
    /// Fresh, empty in-memory backends.
    pub fn in_memory() -> Self {
        let stores = Arc::new(memory::MemoryStores::default());
        Self {
            accounts: stores.clone(),
            pets: stores.clone(),
            inventory: stores.clone(),
            mail: stores,
        }
    }
}

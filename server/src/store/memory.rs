//! In-memory store backends.
//!
//! Conditional updates run under the per-key shard lock of a `DashMap`
//! entry, which gives the same atomicity as a scripted key-value update.

use super::{Account, AccountStore, InventoryStore, MailStore, PetStore, ITEM_CAP};
use crate::error::StoreError;
use crate::player::{Pet, PetSlots};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use towber_protocol::{BagKind, ItemId, ItemStack, Mail, MailId, MailItem, PetId, PlayerId, TEAM_SIZE};

#[derive(Debug, Default)]
struct MailBox {
    last_id: u32,
    mails: Vec<Mail>,
}

/// Every store trait, backed by concurrent maps.
#[derive(Debug)]
pub struct MemoryStores {
    accounts: DashMap<String, (Account, String)>,
    next_player: AtomicU32,
    pets: DashMap<PetId, (PlayerId, Pet)>,
    equipped: DashMap<PlayerId, [Option<PetId>; TEAM_SIZE]>,
    next_pet: AtomicU64,
    items: DashMap<(PlayerId, BagKind, ItemId), u32>,
    mailboxes: DashMap<PlayerId, MailBox>,
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self {
            accounts: DashMap::new(),
            next_player: AtomicU32::new(1),
            pets: DashMap::new(),
            equipped: DashMap::new(),
            next_pet: AtomicU64::new(1),
            items: DashMap::new(),
            mailboxes: DashMap::new(),
        }
    }
}

impl AccountStore for MemoryStores {
    fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .get(username)
            .filter(|entry| entry.1 == password)
            .map(|entry| entry.0.clone()))
    }

    fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.accounts.contains_key(username))
    }

    fn create_account(&self, username: &str, password: &str) -> Result<Account, StoreError> {
        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateUsername),
            Entry::Vacant(slot) => {
                let account = Account {
                    id: PlayerId(self.next_player.fetch_add(1, Ordering::SeqCst)),
                    username: username.to_string(),
                };
                slot.insert((account.clone(), password.to_string()));
                Ok(account)
            }
        }
    }
}

impl PetStore for MemoryStores {
    fn init_pet_bag(&self, player: PlayerId) -> Result<(), StoreError> {
        self.equipped.entry(player).or_default();
        Ok(())
    }

    fn load_equipped(&self, player: PlayerId) -> Result<PetSlots, StoreError> {
        let ids = *self.equipped.get(&player).ok_or(StoreError::NotFound)?;
        Ok(ids.map(|id| id.and_then(|id| self.pets.get(&id).map(|entry| entry.1.clone()))))
    }

    fn save_pet(&self, owner: PlayerId, pet: &Pet) -> Result<(), StoreError> {
        match self.pets.get_mut(&pet.id) {
            Some(mut entry) if entry.0 == owner => {
                entry.1 = pet.clone();
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn create_pet(&self, owner: PlayerId, mut pet: Pet) -> Result<Pet, StoreError> {
        pet.id = PetId(self.next_pet.fetch_add(1, Ordering::SeqCst));
        self.pets.insert(pet.id, (owner, pet.clone()));
        Ok(pet)
    }

    fn set_slot(&self, player: PlayerId, slot: usize, pet: Option<PetId>) -> Result<(), StoreError> {
        if slot >= TEAM_SIZE {
            return Err(StoreError::NotFound);
        }
        if let Some(id) = pet {
            match self.pets.get(&id) {
                Some(entry) if entry.0 == player => {}
                _ => return Err(StoreError::NotFound),
            }
        }
        self.equipped.entry(player).or_default()[slot] = pet;
        Ok(())
    }
}

impl InventoryStore for MemoryStores {
    fn add(&self, player: PlayerId, bag: BagKind, item: ItemId, count: u32) -> Result<u32, StoreError> {
        let mut current = self.items.entry((player, bag, item)).or_insert(0);
        let next = current.saturating_add(count);
        if next > ITEM_CAP {
            return Err(StoreError::OverCap { cap: ITEM_CAP });
        }
        *current = next;
        Ok(next)
    }

    fn remove(&self, player: PlayerId, bag: BagKind, item: ItemId, count: u32) -> Result<u32, StoreError> {
        match self.items.entry((player, bag, item)) {
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current < count {
                    Err(StoreError::Insufficient)
                } else if current == count {
                    entry.remove();
                    Ok(0)
                } else {
                    *entry.get_mut() = current - count;
                    Ok(current - count)
                }
            }
            Entry::Vacant(_) if count == 0 => Ok(0),
            Entry::Vacant(_) => Err(StoreError::Insufficient),
        }
    }

    fn count(&self, player: PlayerId, bag: BagKind, item: ItemId) -> Result<u32, StoreError> {
        Ok(self.items.get(&(player, bag, item)).map(|c| *c).unwrap_or(0))
    }

    fn list(&self, player: PlayerId, bag: BagKind) -> Result<Vec<ItemStack>, StoreError> {
        let mut stacks: Vec<ItemStack> = self
            .items
            .iter()
            .filter(|entry| entry.key().0 == player && entry.key().1 == bag && *entry.value() > 0)
            .map(|entry| ItemStack {
                item: entry.key().2,
                count: *entry.value(),
            })
            .collect();
        stacks.sort_by_key(|stack| stack.item);
        Ok(stacks)
    }
}

impl MailStore for MemoryStores {
    fn append(&self, player: PlayerId, sender: &str, text: &str, items: Vec<MailItem>) -> Result<MailId, StoreError> {
        let mut mailbox = self.mailboxes.entry(player).or_default();
        mailbox.last_id += 1;
        let id = MailId(mailbox.last_id);
        mailbox.mails.push(Mail {
            id,
            sender: sender.to_string(),
            text: text.to_string(),
            items,
        });
        Ok(id)
    }

    fn list(&self, player: PlayerId) -> Result<Vec<Mail>, StoreError> {
        Ok(self
            .mailboxes
            .get(&player)
            .map(|mailbox| mailbox.mails.clone())
            .unwrap_or_default())
    }

    fn get(&self, player: PlayerId, mail: MailId) -> Result<Option<Mail>, StoreError> {
        Ok(self
            .mailboxes
            .get(&player)
            .and_then(|mailbox| mailbox.mails.iter().find(|m| m.id == mail).cloned()))
    }

    fn delete(&self, player: PlayerId, mail: MailId) -> Result<bool, StoreError> {
        let Some(mut mailbox) = self.mailboxes.get_mut(&player) else {
            return Ok(false);
        };
        let before = mailbox.mails.len();
        mailbox.mails.retain(|m| m.id != mail);
        Ok(mailbox.mails.len() != before)
    }

    fn replace_items(&self, player: PlayerId, mail: MailId, items: Vec<MailItem>) -> Result<(), StoreError> {
        let mut mailbox = self.mailboxes.get_mut(&player).ok_or(StoreError::NotFound)?;
        let stored = mailbox
            .mails
            .iter_mut()
            .find(|m| m.id == mail)
            .ok_or(StoreError::NotFound)?;
        stored.items = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const PLAYER: PlayerId = PlayerId(1);
    const ITEM: ItemId = ItemId(7);

    #[test]
    fn test_duplicate_username_rejected() {
        let stores = MemoryStores::default();
        let first = stores.create_account("ann", "pw").unwrap();
        assert_eq!(
            stores.create_account("ann", "other"),
            Err(StoreError::DuplicateUsername)
        );
        assert_eq!(stores.find_by_credentials("ann", "pw").unwrap(), Some(first));
        assert_eq!(stores.find_by_credentials("ann", "bad").unwrap(), None);
    }

    #[test]
    fn test_inventory_cap_and_removal() {
        let stores = MemoryStores::default();
        assert_eq!(stores.add(PLAYER, BagKind::Items, ITEM, 990).unwrap(), 990);
        assert_eq!(
            stores.add(PLAYER, BagKind::Items, ITEM, 10),
            Err(StoreError::OverCap { cap: ITEM_CAP })
        );
        assert_eq!(stores.count(PLAYER, BagKind::Items, ITEM).unwrap(), 990);

        assert_eq!(
            stores.remove(PLAYER, BagKind::Items, ITEM, 991),
            Err(StoreError::Insufficient)
        );
        assert_eq!(stores.remove(PLAYER, BagKind::Items, ITEM, 990).unwrap(), 0);
        assert!(InventoryStore::list(&stores, PLAYER, BagKind::Items).unwrap().is_empty());
    }

    #[test]
    fn test_bags_are_separate() {
        let stores = MemoryStores::default();
        stores.add(PLAYER, BagKind::PetItems, ITEM, 2).unwrap();
        assert_eq!(stores.count(PLAYER, BagKind::Items, ITEM).unwrap(), 0);
        assert_eq!(
            stores.remove(PLAYER, BagKind::Items, ITEM, 1),
            Err(StoreError::Insufficient)
        );
    }

    #[test]
    fn test_concurrent_adds_never_exceed_cap() {
        let stores = Arc::new(MemoryStores::default());
        let threads = 8;
        let per_thread = 150;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let stores = Arc::clone(&stores);
                std::thread::spawn(move || {
                    (0..per_thread)
                        .filter(|_| stores.add(PLAYER, BagKind::Items, ITEM, 1).is_ok())
                        .count()
                })
            })
            .collect();

        let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(succeeded, ITEM_CAP as usize);
        assert_eq!(stores.count(PLAYER, BagKind::Items, ITEM).unwrap(), ITEM_CAP);
    }

    #[test]
    fn test_concurrent_removes_never_go_negative() {
        let stores = Arc::new(MemoryStores::default());
        stores.add(PLAYER, BagKind::Items, ITEM, 100).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stores = Arc::clone(&stores);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| stores.remove(PLAYER, BagKind::Items, ITEM, 1).is_ok())
                        .count()
                })
            })
            .collect();

        let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(succeeded, 100);
        assert_eq!(stores.count(PLAYER, BagKind::Items, ITEM).unwrap(), 0);
    }

    #[test]
    fn test_mail_ids_increment_per_player() {
        let stores = MemoryStores::default();
        let a = stores.append(PLAYER, "admin", "one", vec![]).unwrap();
        let b = stores.append(PLAYER, "admin", "two", vec![]).unwrap();
        let other = stores.append(PlayerId(2), "admin", "hi", vec![]).unwrap();
        assert_eq!((a, b, other), (MailId(1), MailId(2), MailId(1)));

        assert!(stores.delete(PLAYER, a).unwrap());
        assert!(!stores.delete(PLAYER, a).unwrap());
        assert_eq!(MailStore::list(&stores, PLAYER).unwrap().len(), 1);
    }

    #[test]
    fn test_pet_slots_round_trip() {
        let stores = MemoryStores::default();
        stores.init_pet_bag(PLAYER).unwrap();
        let catalog = crate::catalog::Catalog::standard();
        let template = catalog.pet(crate::catalog::BURO).unwrap();
        let pet = stores.create_pet(PLAYER, Pet::from_template(template)).unwrap();
        stores.set_slot(PLAYER, 0, Some(pet.id)).unwrap();

        let slots = stores.load_equipped(PLAYER).unwrap();
        assert_eq!(slots[0].as_ref().map(|p| p.id), Some(pet.id));
        assert!(slots[1].is_none());

        assert_eq!(stores.set_slot(PlayerId(9), 0, Some(pet.id)), Err(StoreError::NotFound));
    }
}

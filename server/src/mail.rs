//! Mailbox operations on top of the mail and inventory stores.

use crate::catalog::{INITIAL_PET, ORANGE_SUGAR};
use crate::error::{Denial, StoreError};
use crate::store::Stores;
use towber_protocol::{BagKind, MailId, MailItem, PlayerId};

pub const SYSTEM_SENDER: &str = "admin";

/// An attachment that reached the player's bag, with the bag's new count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granted {
    pub item: MailItem,
    pub new_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    pub granted: Vec<Granted>,
    /// Set when an attachment could not be granted. The mail then keeps
    /// exactly the attachments that were not granted.
    pub failure: Option<StoreError>,
}

/// Mails every new account receives.
pub fn send_welcome(stores: &Stores, player: PlayerId) -> Result<(), StoreError> {
    stores.mail.append(
        player,
        SYSTEM_SENDER,
        "new player's reward",
        vec![
            MailItem {
                bag: BagKind::Items,
                item: INITIAL_PET,
                count: 1,
            },
            MailItem {
                bag: BagKind::PetItems,
                item: ORANGE_SUGAR,
                count: 2,
            },
        ],
    )?;
    stores
        .mail
        .append(player, SYSTEM_SENDER, "welcome to this land", Vec::new())?;
    Ok(())
}

/// Move the attachments of a mail into the player's bags, then delete it.
///
/// Each attachment is removed from the stored mail as soon as it is granted,
/// so retrying after a failure never grants the same attachment twice.
pub fn collect(stores: &Stores, player: PlayerId, mail: MailId) -> Result<Collected, Denial> {
    let stored = stores.mail.get(player, mail)?.ok_or(Denial::UnknownMail)?;

    let mut remaining = stored.items;
    let mut granted = Vec::new();
    while let Some(item) = remaining.first().copied() {
        match stores.inventory.add(player, item.bag, item.item, item.count) {
            Ok(new_count) => {
                remaining.remove(0);
                granted.push(Granted { item, new_count });
                if let Err(e) = stores.mail.replace_items(player, mail, remaining.clone()) {
                    tracing::error!(%player, %mail, "Granted mail item could not be detached: {e}");
                    return Ok(Collected {
                        granted,
                        failure: Some(e),
                    });
                }
            }
            Err(e) => {
                tracing::debug!(%player, %mail, item = %item.item, "Mail item not granted: {e}");
                return Ok(Collected {
                    granted,
                    failure: Some(e),
                });
            }
        }
    }

    stores.mail.delete(player, mail)?;
    Ok(Collected {
        granted,
        failure: None,
    })
}

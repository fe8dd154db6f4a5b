//! Strongly typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Key of a session in the hub. Reassigned to the player id at login.
    ClientId(u32)
);
id_type!(
    /// Account id of a registered player.
    PlayerId(u32)
);
id_type!(PetId(u64));
id_type!(
    /// Species of a pet, keyed into the pet catalog.
    PetKind(u32)
);
id_type!(SkillId(u32));
id_type!(ItemId(u32));
id_type!(MailId(u32));
id_type!(NpcId(u32));
id_type!(
    /// Pending battle invitation. Shares the numbering of the room it becomes.
    InviteId(u32)
);
id_type!(RoomId(u32));

impl ClientId {
    /// Sender id used for messages originated by the server itself.
    pub const SERVER: ClientId = ClientId(0);
}

impl From<PlayerId> for ClientId {
    fn from(id: PlayerId) -> Self {
        ClientId(id.0)
    }
}

impl From<InviteId> for RoomId {
    fn from(id: InviteId) -> Self {
        RoomId(id.0)
    }
}

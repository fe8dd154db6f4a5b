use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures reported by the persistence collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("the username has already existed")]
    DuplicateUsername,

    #[error("quantity would exceed the limit of {cap}")]
    OverCap { cap: u32 },

    #[error("insufficient quantity")]
    Insufficient,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// A refused player request.
///
/// The `Display` text is sent verbatim to the client in a deny message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("error username or password")]
    BadCredentials,

    #[error("the player has logged in")]
    AlreadyLoggedIn,

    #[error("the username has already existed")]
    UsernameTaken,

    #[error("please log in first")]
    NotLoggedIn,

    #[error("you are in a battle")]
    InBattle,

    #[error("you are not in a battle")]
    NotInBattle,

    #[error("area not found")]
    UnknownArea,

    #[error("you are not in an area")]
    NoArea,

    #[error("this area cannot battle")]
    BattleForbidden,

    #[error("error request")]
    BadBattleTarget,

    #[error("the player is already in a battle")]
    AlreadyInBattle,

    #[error("no pet is able to fight")]
    NoFightingPet,

    #[error("battle invite expired or not found")]
    InviteNotFound,

    #[error("the inviter is no longer available")]
    InviterUnavailable,

    #[error("{0} rejected the battle")]
    Rejected(String),

    #[error("npc not found")]
    UnknownNpc,

    #[error("talk to an npc first")]
    NoNpc,

    #[error("the npc cannot do that")]
    UnsupportedAction,

    #[error("item not found")]
    UnknownItem,

    #[error("pet not found")]
    UnknownPet,

    #[error("current pet has reach top level")]
    MaxLevel,

    #[error("mail not found")]
    UnknownMail,

    #[error("{0}")]
    Store(#[from] StoreError),
}

use crate::gateway::GatewayError;
use crate::launcher::LaunchError;
use crate::room::RoomId;
use shared::UserId;

/// Domain errors, rendered to callers as `{ok:false, error}`
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("this connection is already logged in")]
    AlreadyLoggedIn,
    #[error("user id does not match the logged-in user")]
    IdentityMismatch,
    #[error("user {0} is not online")]
    UserNotOnline(UserId),
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("unknown game id {0}")]
    UnknownGame(u32),
    #[error("only the host can do that")]
    NotHost,
    #[error("you are already in a room")]
    AlreadyInRoom,
    #[error("you are not in that room")]
    NotInRoom,
    #[error("the host cannot leave; close the room instead")]
    HostCannotLeave,
    #[error("room is full")]
    RoomFull,
    #[error("room is about to start")]
    RoomStarting,
    #[error("game already started")]
    AlreadyPlaying,
    #[error("room is not playing")]
    NotPlaying,
    #[error("this room is private, a password is required")]
    PasswordRequired,
    #[error("wrong password")]
    WrongPassword,
    #[error("room has no guests")]
    NoGuests,
    #[error("room is not ready")]
    NotReady,
    #[error("room is already ready")]
    AlreadyReady,
    #[error("not every guest is ready")]
    GuestsNotReady,
    #[error("invite {0} not found")]
    InviteNotFound(u64),
    #[error("you cannot invite yourself")]
    SelfInvite,
    #[error("game {0} has no package to download")]
    NoPackage(u32),
    #[error("package for game {0} is too large to send")]
    PackageTooLarge(u32),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("unknown request {0}/{1}")]
    UnknownAction(String, String),
    #[error("persistence service unavailable")]
    Upstream(#[from] GatewayError),
    #[error("persistence service sent an unexpected response")]
    MalformedUpstream,
    #[error("could not start match: {0}")]
    Launch(#[from] LaunchError),
}

impl From<serde_json::Error> for LobbyError {
    fn from(e: serde_json::Error) -> Self {
        LobbyError::BadRequest(e.to_string())
    }
}

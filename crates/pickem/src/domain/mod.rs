pub mod achievements;
pub mod campaigns;
pub mod chains;
pub mod jobs;
pub mod ledger;
pub mod matchups;
pub mod picks;
pub mod sportsbook;
pub mod squads;
pub mod users;

pub use achievements::*;
pub use campaigns::*;
pub use chains::*;
pub use jobs::*;
pub use ledger::*;
pub use matchups::*;
pub use picks::*;
pub use sportsbook::*;
pub use squads::*;
pub use users::*;

use pickem_core::CoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::infra::db::DatabaseWriteError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("matchup not found: {0}")]
    MatchupNotFound(Uuid),
    #[error("pick not found: {0}")]
    PickNotFound(Uuid),
    #[error("no active chain for user {0}")]
    ChainNotFound(Uuid),
    #[error("no active campaign")]
    CampaignNotFound,
    #[error("user already has an active pick: {0}")]
    ExistingPickFound(Uuid),
    #[error("insufficient funds: balance {balance} is below cost {cost}")]
    InsufficientFunds { balance: i64, cost: i64 },
    #[error("matchup {0} is locked")]
    MatchupLocked(Uuid),
    #[error("matchup {0} has already started")]
    MatchupAlreadyStarted(Uuid),
    #[error("matchup {0} has already been settled")]
    MatchupAlreadySettled(Uuid),
    #[error("matchup {0} already has a recorded result with different scores")]
    ResultConflict(Uuid),
    #[error("pick {0} has already been settled")]
    PickAlreadySettled(Uuid),
    #[error("could not determine a winner for matchup {0}: {1}")]
    UndeterminedWinner(Uuid, String),
    #[error("no chains found for campaign {0}")]
    NoChains(Uuid),
    #[error("{0}")]
    BadRequest(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("problem writing to db: {0}")]
    DbWrite(String),
    #[error("background thread died: {0}")]
    Thread(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Stable code handed to clients, messages may change but these may not
    pub fn code(&self) -> &'static str {
        match self {
            Error::UserNotFound(_) => "USER_NOT_FOUND",
            Error::MatchupNotFound(_) => "MATCHUP_NOT_FOUND",
            Error::PickNotFound(_) => "PICK_NOT_FOUND",
            Error::ChainNotFound(_) => "CHAIN_NOT_FOUND",
            Error::CampaignNotFound => "CAMPAIGN_NOT_FOUND",
            Error::ExistingPickFound(_) => "EXISTING_PICK_FOUND",
            Error::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Error::MatchupLocked(_) => "MATCHUP_LOCKED",
            Error::MatchupAlreadyStarted(_) => "MATCHUP_ALREADY_STARTED",
            Error::MatchupAlreadySettled(_) => "MATCHUP_ALREADY_SETTLED",
            Error::ResultConflict(_) => "MATCHUP_RESULT_CONFLICT",
            Error::PickAlreadySettled(_) => "PICK_ALREADY_SETTLED",
            Error::UndeterminedWinner(..) => "UNDETERMINED_WINNER",
            Error::NoChains(_) => "NO_CHAINS",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::DbError(_) | Error::DbWrite(_) | Error::Thread(_) | Error::Internal(_) => {
                "INTERNAL"
            }
        }
    }
}

impl From<DatabaseWriteError> for Error {
    fn from(value: DatabaseWriteError) -> Self {
        match value {
            DatabaseWriteError::Sqlx(e) => Error::DbError(e),
            e => Error::DbWrite(e.to_string()),
        }
    }
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        Error::BadRequest(value.to_string())
    }
}

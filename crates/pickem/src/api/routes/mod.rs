mod campaigns;
mod matchups;
mod picks;
mod system;
mod users;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use hyper::StatusCode;
use log::error;
use serde_json::json;

use crate::domain::Error;

pub use campaigns::*;
pub use matchups::*;
pub use picks::*;
pub use system::*;
pub use users::*;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UserNotFound(_)
            | Error::MatchupNotFound(_)
            | Error::PickNotFound(_)
            | Error::ChainNotFound(_)
            | Error::CampaignNotFound => StatusCode::NOT_FOUND,
            Error::BadRequest(_) | Error::InsufficientFunds { .. } | Error::UndeterminedWinner(..) => {
                StatusCode::BAD_REQUEST
            }
            Error::ExistingPickFound(_)
            | Error::MatchupLocked(_)
            | Error::MatchupAlreadyStarted(_)
            | Error::MatchupAlreadySettled(_)
            | Error::ResultConflict(_)
            | Error::PickAlreadySettled(_)
            | Error::NoChains(_) => StatusCode::CONFLICT,
            Error::DbError(_) | Error::DbWrite(_) | Error::Thread(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("internal error: {}", self);
            String::from("internal server error")
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));
        (status, body).into_response()
    }
}

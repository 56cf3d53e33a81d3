mod dispatcher;
mod store;

pub use dispatcher::*;
pub use store::*;

use async_channel::{Receiver, Sender};
use log::debug;
use pickem_core::{AchievementKind, PickOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::notifier::PickNotification;

/// Side effects of a settlement. They are written to the `jobs` table in the
/// same transaction as the ledger change that caused them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    NotifyPickSettled(PickNotification),
    EvaluateAchievements {
        user_id: Uuid,
        pick_id: Uuid,
    },
    SquadResult {
        squad_id: Uuid,
        outcome: PickOutcome,
    },
    GrantAchievement {
        user_id: Uuid,
        kind: AchievementKind,
        campaign_id: Uuid,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::NotifyPickSettled(_) => "notify_pick_settled",
            Job::EvaluateAchievements { .. } => "evaluate_achievements",
            Job::SquadResult { .. } => "squad_result",
            Job::GrantAchievement { .. } => "grant_achievement",
        }
    }
}

/// Wakes the dispatcher once new jobs have committed. A missed wake-up only
/// delays jobs until the dispatcher's next poll.
#[derive(Debug, Clone)]
pub struct JobSignal {
    sender: Sender<()>,
}

impl JobSignal {
    pub fn new() -> (Self, Receiver<()>) {
        let (sender, receiver) = async_channel::bounded(1);
        (Self { sender }, receiver)
    }

    pub fn notify(&self) {
        // A full channel already holds a pending wake-up
        if self.sender.try_send(()).is_ok() {
            debug!("woke job dispatcher");
        }
    }
}

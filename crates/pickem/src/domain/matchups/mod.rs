mod store;

pub use store::*;

use pickem_core::{MatchupStatus, SettlementRule, TeamSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

fn default_settlement_type() -> String {
    SettlementRule::SCORE.to_string()
}

/// Sent by the score feed when a game is scheduled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMatchup {
    pub external_game_id: String,
    pub league: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default)]
    pub status: Option<MatchupStatus>,
    pub home_team: TeamSnapshot,
    pub away_team: TeamSnapshot,
    #[serde(default = "default_settlement_type")]
    pub settlement_type: String,
    #[serde(default)]
    pub settlement_metadata: Option<Value>,
    pub cost: i64,
    #[serde(default)]
    pub featured: bool,
}

/// Score and status changes from the score feed; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMatchup {
    #[serde(default)]
    pub status: Option<MatchupStatus>,
    #[serde(default)]
    pub home_team: Option<TeamSnapshot>,
    #[serde(default)]
    pub away_team: Option<TeamSnapshot>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeMatchup {
    pub home_team: TeamSnapshot,
    pub away_team: TeamSnapshot,
    /// Status reported by the feed. Only FINAL is accepted, absent means FINAL
    #[serde(default)]
    pub status: Option<MatchupStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchupFilter {
    pub league: Option<String>,
    pub active: Option<bool>,
}

//! Shared types between the pickem server and its clients

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::CoreError;

/// Sentinel stored in `winner_id` when a matchup ends level
pub const PUSH_WINNER_ID: &str = "PUSH";

/// Snapshot of one side of a matchup as reported by the score feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchupStatus {
    Scheduled,
    InProgress,
    Postponed,
    Final,
    Canceled,
    Unknown,
}

impl MatchupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InProgress => "IN_PROGRESS",
            Self::Postponed => "POSTPONED",
            Self::Final => "FINAL",
            Self::Canceled => "CANCELED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Statuses the score feed uses to say a game is over
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final)
    }
}

impl fmt::Display for MatchupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchupStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "POSTPONED" => Ok(Self::Postponed),
            "FINAL" => Ok(Self::Final),
            "CANCELED" => Ok(Self::Canceled),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(CoreError::UnknownVariant {
                kind: "matchup status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickStatus {
    Pending,
    InProgress,
    Win,
    Loss,
    Push,
    Unknown,
}

impl PickStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Push => "PUSH",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Win | Self::Loss | Self::Push)
    }
}

impl fmt::Display for PickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "WIN" => Ok(Self::Win),
            "LOSS" => Ok(Self::Loss),
            "PUSH" => Ok(Self::Push),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(CoreError::UnknownVariant {
                kind: "pick status",
                value: other.to_string(),
            }),
        }
    }
}

/// Result of a settled pick, used to pick the transition to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickOutcome {
    Win,
    Loss,
    Push,
}

impl PickOutcome {
    pub fn status(&self) -> PickStatus {
        match self {
            Self::Win => PickStatus::Win,
            Self::Loss => PickStatus::Loss,
            Self::Push => PickStatus::Push,
        }
    }
}

impl fmt::Display for PickOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_str())
    }
}

/// Tag attached to every coin ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Pick,
    Achievement,
    Payout,
    Admin,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pick => "PICK",
            Self::Achievement => "ACHIEVEMENT",
            Self::Payout => "PAYOUT",
            Self::Admin => "ADMIN",
        }
    }
}

impl FromStr for TransactionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PICK" => Ok(Self::Pick),
            "ACHIEVEMENT" => Ok(Self::Achievement),
            "PAYOUT" => Ok(Self::Payout),
            "ADMIN" => Ok(Self::Admin),
            other => Err(CoreError::UnknownVariant {
                kind: "transaction type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignType {
    Global,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "GLOBAL",
        }
    }
}

impl FromStr for CampaignType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GLOBAL" => Ok(Self::Global),
            other => Err(CoreError::UnknownVariant {
                kind: "campaign type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKind {
    FirstWin,
    Streak5,
    Streak10,
    Wins25,
    ChainChampion,
    WinChampion,
}

impl AchievementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstWin => "FIRST_WIN",
            Self::Streak5 => "STREAK_5",
            Self::Streak10 => "STREAK_10",
            Self::Wins25 => "WINS_25",
            Self::ChainChampion => "CHAIN_CHAMPION",
            Self::WinChampion => "WIN_CHAMPION",
        }
    }

    /// Coins credited when the achievement is granted
    pub fn reward(&self) -> i64 {
        match self {
            Self::FirstWin => 25,
            Self::Streak5 => 50,
            Self::Streak10 => 150,
            Self::Wins25 => 100,
            Self::ChainChampion | Self::WinChampion => 500,
        }
    }
}

impl fmt::Display for AchievementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIRST_WIN" => Ok(Self::FirstWin),
            "STREAK_5" => Ok(Self::Streak5),
            "STREAK_10" => Ok(Self::Streak10),
            "WINS_25" => Ok(Self::Wins25),
            "CHAIN_CHAMPION" => Ok(Self::ChainChampion),
            "WIN_CHAMPION" => Ok(Self::WinChampion),
            other => Err(CoreError::UnknownVariant {
                kind: "achievement",
                value: other.to_string(),
            }),
        }
    }
}

//! Win conditions and coin rewards for settled matchups

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CoreError, PickOutcome, TeamSnapshot, PUSH_WINNER_ID};

/// Minimum payout for a winning pick on a regular matchup
pub const MIN_REWARD: i64 = 10;
/// Minimum payout for a winning pick on a featured matchup
pub const MIN_FEATURED_REWARD: i64 = 30;

/// Coins credited for a winning pick.
///
/// Featured matchups pay triple the cost (at least 30), everything else pays
/// double (at least 10).
pub fn matchup_reward(cost: i64, featured: bool) -> i64 {
    if featured {
        std::cmp::max(cost.saturating_mul(3), MIN_FEATURED_REWARD)
    } else {
        std::cmp::max(cost.saturating_mul(2), MIN_REWARD)
    }
}

/// Authoritative result of a matchup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winner {
    Team(String),
    Push,
}

impl Winner {
    pub fn from_id(id: &str) -> Self {
        if id == PUSH_WINNER_ID {
            Winner::Push
        } else {
            Winner::Team(id.to_string())
        }
    }

    pub fn as_id(&self) -> &str {
        match self {
            Winner::Team(id) => id,
            Winner::Push => PUSH_WINNER_ID,
        }
    }

    /// A push settles every pick as a push regardless of the side chosen
    pub fn outcome_for(&self, chosen_team_id: &str) -> PickOutcome {
        match self {
            Winner::Push => PickOutcome::Push,
            Winner::Team(id) if id == chosen_team_id => PickOutcome::Win,
            Winner::Team(_) => PickOutcome::Loss,
        }
    }
}

/// A rule family deciding the winner from the two final score snapshots.
///
/// `None` means the rule could not decide; callers must treat that as a
/// configuration error and never default an outcome.
pub trait WinCondition {
    fn winner(&self, home: &TeamSnapshot, away: &TeamSnapshot) -> Option<Winner>;
}

/// Greater score wins, equal scores push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWins;

impl WinCondition for ScoreWins {
    fn winner(&self, home: &TeamSnapshot, away: &TeamSnapshot) -> Option<Winner> {
        Some(match home.score.cmp(&away.score) {
            std::cmp::Ordering::Greater => Winner::Team(home.id.clone()),
            std::cmp::Ordering::Less => Winner::Team(away.id.clone()),
            std::cmp::Ordering::Equal => Winner::Push,
        })
    }
}

/// Home score adjusted by the home line, e.g. `-3.5` for a home favourite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSpread {
    pub home_line: f64,
}

impl WinCondition for PointSpread {
    fn winner(&self, home: &TeamSnapshot, away: &TeamSnapshot) -> Option<Winner> {
        if !self.home_line.is_finite() {
            return None;
        }
        let adjusted_home = home.score as f64 + self.home_line;
        let away_score = away.score as f64;
        if (adjusted_home - away_score).abs() < f64::EPSILON {
            Some(Winner::Push)
        } else if adjusted_home > away_score {
            Some(Winner::Team(home.id.clone()))
        } else {
            Some(Winner::Team(away.id.clone()))
        }
    }
}

/// `team_id` wins only when it beats the other side by at least `margin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinMargin {
    pub team_id: String,
    pub margin: i64,
}

impl WinCondition for WinMargin {
    fn winner(&self, home: &TeamSnapshot, away: &TeamSnapshot) -> Option<Winner> {
        let (named, other) = if self.team_id == home.id {
            (home, away)
        } else if self.team_id == away.id {
            (away, home)
        } else {
            return None;
        };

        if named.score - other.score >= self.margin {
            Some(Winner::Team(named.id.clone()))
        } else {
            Some(Winner::Team(other.id.clone()))
        }
    }
}

/// Settlement rule stored alongside a matchup as `(settlement_type, metadata)`
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementRule {
    Score(ScoreWins),
    Spread(PointSpread),
    WinMargin(WinMargin),
}

impl SettlementRule {
    pub const SCORE: &'static str = "SCORE";
    pub const SPREAD: &'static str = "SPREAD";
    pub const WIN_MARGIN: &'static str = "WIN_MARGIN";

    /// Resolve the stored settlement type into a rule. Unknown types and
    /// missing or malformed metadata are errors.
    pub fn parse(kind: &str, metadata: Option<&Value>) -> Result<Self, CoreError> {
        match kind {
            Self::SCORE => Ok(SettlementRule::Score(ScoreWins)),
            Self::SPREAD => {
                let spread: PointSpread = serde_json::from_value(required(kind, metadata)?)?;
                Ok(SettlementRule::Spread(spread))
            }
            Self::WIN_MARGIN => {
                let margin: WinMargin = serde_json::from_value(required(kind, metadata)?)?;
                if margin.margin <= 0 {
                    return Err(CoreError::Validation(format!(
                        "win margin must be positive, got {}",
                        margin.margin
                    )));
                }
                Ok(SettlementRule::WinMargin(margin))
            }
            other => Err(CoreError::UnknownVariant {
                kind: "settlement type",
                value: other.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SettlementRule::Score(_) => Self::SCORE,
            SettlementRule::Spread(_) => Self::SPREAD,
            SettlementRule::WinMargin(_) => Self::WIN_MARGIN,
        }
    }
}

fn required(kind: &str, metadata: Option<&Value>) -> Result<Value, CoreError> {
    metadata
        .cloned()
        .ok_or_else(|| CoreError::Validation(format!("settlement type {} needs metadata", kind)))
}

impl WinCondition for SettlementRule {
    fn winner(&self, home: &TeamSnapshot, away: &TeamSnapshot) -> Option<Winner> {
        match self {
            SettlementRule::Score(rule) => rule.winner(home, away),
            SettlementRule::Spread(rule) => rule.winner(home, away),
            SettlementRule::WinMargin(rule) => rule.winner(home, away),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team(id: &str, score: i64) -> TeamSnapshot {
        TeamSnapshot {
            id: id.to_string(),
            name: id.to_uppercase(),
            score,
            image: None,
        }
    }

    #[test]
    fn test_matchup_reward() {
        assert_eq!(matchup_reward(10, false), 20);
        assert_eq!(matchup_reward(0, false), 10);
        assert_eq!(matchup_reward(10, true), 30);
        assert_eq!(matchup_reward(0, true), 30);
        assert_eq!(matchup_reward(25, true), 75);
    }

    #[test]
    fn test_matchup_reward_saturates() {
        assert_eq!(matchup_reward(i64::MAX, false), i64::MAX);
        assert_eq!(matchup_reward(i64::MAX / 2 + 1, true), i64::MAX);
    }

    #[test]
    fn test_score_wins() {
        let rule = ScoreWins;
        assert_eq!(
            rule.winner(&team("home", 21), &team("away", 14)),
            Some(Winner::Team("home".into()))
        );
        assert_eq!(
            rule.winner(&team("home", 3), &team("away", 14)),
            Some(Winner::Team("away".into()))
        );
        assert_eq!(
            rule.winner(&team("home", 7), &team("away", 7)),
            Some(Winner::Push)
        );
    }

    #[test]
    fn test_point_spread() {
        let favourite = PointSpread { home_line: -3.5 };
        assert_eq!(
            favourite.winner(&team("home", 24), &team("away", 21)),
            Some(Winner::Team("away".into()))
        );
        assert_eq!(
            favourite.winner(&team("home", 28), &team("away", 21)),
            Some(Winner::Team("home".into()))
        );

        let whole_line = PointSpread { home_line: -3.0 };
        assert_eq!(
            whole_line.winner(&team("home", 24), &team("away", 21)),
            Some(Winner::Push)
        );

        let broken = PointSpread {
            home_line: f64::NAN,
        };
        assert_eq!(broken.winner(&team("home", 1), &team("away", 0)), None);
    }

    #[test]
    fn test_win_margin() {
        let rule = WinMargin {
            team_id: "away".into(),
            margin: 7,
        };
        assert_eq!(
            rule.winner(&team("home", 10), &team("away", 17)),
            Some(Winner::Team("away".into()))
        );
        assert_eq!(
            rule.winner(&team("home", 14), &team("away", 17)),
            Some(Winner::Team("home".into()))
        );

        let unknown_team = WinMargin {
            team_id: "nobody".into(),
            margin: 3,
        };
        assert_eq!(unknown_team.winner(&team("home", 1), &team("away", 0)), None);
    }

    #[test]
    fn test_parse_settlement_rule() {
        assert_eq!(
            SettlementRule::parse("SCORE", None).unwrap(),
            SettlementRule::Score(ScoreWins)
        );

        let spread = SettlementRule::parse("SPREAD", Some(&json!({"home_line": 2.5}))).unwrap();
        assert_eq!(spread.kind(), SettlementRule::SPREAD);

        assert!(SettlementRule::parse("SPREAD", None).is_err());
        assert!(SettlementRule::parse(
            "WIN_MARGIN",
            Some(&json!({"team_id": "home", "margin": 0}))
        )
        .is_err());
        assert!(matches!(
            SettlementRule::parse("OVER_UNDER", None),
            Err(CoreError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn test_outcome_for_pick() {
        let winner = Winner::from_id("home");
        assert_eq!(winner.outcome_for("home"), PickOutcome::Win);
        assert_eq!(winner.outcome_for("away"), PickOutcome::Loss);

        let push = Winner::from_id(PUSH_WINNER_ID);
        assert_eq!(push, Winner::Push);
        assert_eq!(push.outcome_for("home"), PickOutcome::Push);
        assert_eq!(push.outcome_for("away"), PickOutcome::Push);
    }
}

//! Validation utilities shared between server and client

use serde_json::Value;

use crate::{CoreError, SettlementRule, TeamSnapshot};

/// Validate the fields the score feed supplies when it creates a matchup
pub fn validate_matchup(
    league: &str,
    home: &TeamSnapshot,
    away: &TeamSnapshot,
    cost: i64,
    settlement_type: &str,
    settlement_metadata: Option<&Value>,
) -> Result<(), CoreError> {
    if league.trim().is_empty() {
        return Err(CoreError::Validation("league cannot be empty".into()));
    }
    validate_teams(home, away)?;
    if cost < 0 {
        return Err(CoreError::Validation(format!(
            "cost cannot be negative, got {}",
            cost
        )));
    }

    // Rejecting unknown rules here keeps them from reaching settlement
    SettlementRule::parse(settlement_type, settlement_metadata)?;

    Ok(())
}

pub fn validate_teams(home: &TeamSnapshot, away: &TeamSnapshot) -> Result<(), CoreError> {
    if home.id.is_empty() || away.id.is_empty() {
        return Err(CoreError::Validation("team id cannot be empty".into()));
    }
    if home.id == away.id {
        return Err(CoreError::Validation(format!(
            "home and away must be different teams, both are {}",
            home.id
        )));
    }
    if home.score < 0 || away.score < 0 {
        return Err(CoreError::Validation("scores cannot be negative".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team(id: &str) -> TeamSnapshot {
        TeamSnapshot {
            id: id.to_string(),
            name: id.to_string(),
            score: 0,
            image: None,
        }
    }

    #[test]
    fn test_valid_matchup() {
        assert!(validate_matchup("NFL", &team("kc"), &team("buf"), 10, "SCORE", None).is_ok());
        assert!(validate_matchup(
            "NBA",
            &team("bos"),
            &team("lal"),
            0,
            "SPREAD",
            Some(&json!({"home_line": -4.5}))
        )
        .is_ok());
    }

    #[test]
    fn test_invalid_matchup() {
        assert!(validate_matchup("", &team("kc"), &team("buf"), 10, "SCORE", None).is_err());
        assert!(validate_matchup("NFL", &team("kc"), &team("kc"), 10, "SCORE", None).is_err());
        assert!(validate_matchup("NFL", &team("kc"), &team("buf"), -1, "SCORE", None).is_err());
        assert!(validate_matchup("NFL", &team("kc"), &team("buf"), 10, "MYSTERY", None).is_err());
    }
}

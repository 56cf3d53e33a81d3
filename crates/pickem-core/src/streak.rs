//! Chain (streak) accounting

use serde::{Deserialize, Serialize};

use crate::PickOutcome;

/// Streak and cumulative record of a user inside one campaign.
///
/// `chain` is signed: positive counts consecutive wins, negative counts
/// consecutive losses, zero means no streak yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTally {
    pub chain: i64,
    pub best: i64,
    pub wins: i64,
    pub losses: i64,
    pub pushes: i64,
    /// Net coins won or lost inside the campaign
    pub coins: i64,
}

impl ChainTally {
    /// A win extends a winning streak or restarts at 1 after losses
    pub fn apply_win(&mut self, reward: i64) {
        self.chain = if self.chain > 0 { self.chain + 1 } else { 1 };
        self.best = std::cmp::max(self.best, self.chain);
        self.wins += 1;
        self.coins = self.coins.saturating_add(reward);
    }

    /// A loss extends a losing streak or restarts at -1 after wins
    pub fn apply_loss(&mut self, cost: i64) {
        self.chain = if self.chain < 0 { self.chain - 1 } else { -1 };
        self.losses += 1;
        self.coins = self.coins.saturating_sub(cost);
    }

    /// A push never touches the streak
    pub fn apply_push(&mut self) {
        self.pushes += 1;
    }

    /// Apply a settled outcome. `coins` is the absolute amount that moved.
    pub fn apply(&mut self, outcome: PickOutcome, coins: i64) {
        match outcome {
            PickOutcome::Win => self.apply_win(coins),
            PickOutcome::Loss => self.apply_loss(coins),
            PickOutcome::Push => self.apply_push(),
        }
    }

    /// Ordering for the campaign's chain title: streak, then wins, then pushes
    pub fn chain_rank(&self) -> (i64, i64, i64) {
        (self.chain, self.wins, self.pushes)
    }

    /// Ordering for the campaign's win title: wins, then pushes
    pub fn win_rank(&self) -> (i64, i64) {
        (self.wins, self.pushes)
    }
}

/// Highest ranked item; the earliest item wins an exact tie.
pub fn select_leader<T, K, F>(items: &[T], rank: F) -> Option<&T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut leader: Option<(&T, K)> = None;
    for item in items {
        let key = rank(item);
        match &leader {
            Some((_, best)) if key <= *best => {}
            _ => leader = Some((item, key)),
        }
    }
    leader.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_after_wins_resets_to_minus_one() {
        let mut tally = ChainTally::default();
        tally.apply_win(20);
        tally.apply_win(20);
        tally.apply_win(20);
        assert_eq!(tally.chain, 3);

        tally.apply_loss(10);
        assert_eq!(tally.chain, -1);
        assert_eq!(tally.best, 3);
        assert_eq!(tally.coins, 50);
    }

    #[test]
    fn test_win_after_losses_resets_to_one() {
        let mut tally = ChainTally::default();
        tally.apply_loss(10);
        tally.apply_loss(10);
        assert_eq!(tally.chain, -2);

        tally.apply_win(20);
        assert_eq!(tally.chain, 1);
        assert_eq!(tally.best, 1);
        assert_eq!(tally.wins, 1);
        assert_eq!(tally.losses, 2);
    }

    #[test]
    fn test_push_leaves_streak_alone() {
        let mut tally = ChainTally::default();
        tally.apply_win(20);
        tally.apply_win(20);
        tally.apply(PickOutcome::Push, 0);
        assert_eq!(tally.chain, 2);
        assert_eq!(tally.pushes, 1);

        tally.apply(PickOutcome::Loss, 10);
        tally.apply(PickOutcome::Push, 0);
        assert_eq!(tally.chain, -1);
    }

    #[test]
    fn test_best_is_monotonic() {
        let sequence = [
            PickOutcome::Win,
            PickOutcome::Win,
            PickOutcome::Loss,
            PickOutcome::Win,
            PickOutcome::Push,
            PickOutcome::Win,
            PickOutcome::Win,
            PickOutcome::Win,
            PickOutcome::Loss,
        ];
        let mut tally = ChainTally::default();
        let mut previous_best = 0;
        for outcome in sequence {
            tally.apply(outcome, 10);
            if outcome == PickOutcome::Win {
                assert!(tally.best >= tally.chain);
            }
            assert!(tally.best >= previous_best);
            previous_best = tally.best;
        }
        assert_eq!(tally.best, 4);
    }

    #[test]
    fn test_select_leader() {
        let tallies = vec![
            ("a", ChainTally { chain: 3, wins: 5, pushes: 0, ..Default::default() }),
            ("b", ChainTally { chain: 3, wins: 6, pushes: 0, ..Default::default() }),
            ("c", ChainTally { chain: 3, wins: 6, pushes: 0, ..Default::default() }),
            ("d", ChainTally { chain: -1, wins: 9, pushes: 1, ..Default::default() }),
        ];

        let chain_leader = select_leader(&tallies, |(_, t)| t.chain_rank()).unwrap();
        assert_eq!(chain_leader.0, "b");

        let win_leader = select_leader(&tallies, |(_, t)| t.win_rank()).unwrap();
        assert_eq!(win_leader.0, "d");

        let empty: Vec<(&str, ChainTally)> = vec![];
        assert!(select_leader(&empty, |(_, t)| t.win_rank()).is_none());
    }
}

//! Normalized board record

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Numeric game identifier used as the board seed
pub type GameId = u64;

/// Squares per board (10 x 10 grid)
pub const SQUARE_COUNT: usize = 100;

/// Digits per header row / column
pub const HEADER_COUNT: usize = 10;

/// Header value meaning "not yet randomized"
pub const HEADER_UNSET: u8 = 10;

/// The all-ones system address the program uses for "unclaimed" / "no winner"
pub const SYSTEM_ADDRESS: &str = "11111111111111111111111111111111";

/// Address of a board account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardRef(pub String);

impl BoardRef {
    /// Deterministic board address for a game (seeded by `board` + game id)
    pub fn derive(game_id: GameId) -> Self {
        Self(format!("board-{game_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BoardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Score as recorded on the board (also returned by the oracle)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameScore {
    pub home_score: u16,
    pub away_score: u16,
    pub quarter: u8,
}

impl GameScore {
    /// Last digit of each side's score (home, away)
    pub fn winning_digits(&self) -> (u8, u8) {
        ((self.home_score % 10) as u8, (self.away_score % 10) as u8)
    }
}

/// Authoritative board state as read from the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub game_id: GameId,
    pub board_ref: BoardRef,
    pub authority: String,
    pub finalized: bool,
    pub randomized: bool,
    pub started: bool,
    pub ended: bool,
    /// `None` while no winner has been settled
    pub winner: Option<String>,
    pub payout_amount: u64,
    pub total_pot: u64,
    pub score: GameScore,
    /// Square owners, row-major; `None` = unclaimed
    pub squares: Vec<Option<String>>,
    pub home_headers: [u8; HEADER_COUNT],
    pub away_headers: [u8; HEADER_COUNT],
}

impl LedgerRecord {
    /// All-default record, as the program initializes a fresh board
    pub fn empty(game_id: GameId) -> Self {
        Self {
            game_id,
            board_ref: BoardRef::derive(game_id),
            authority: SYSTEM_ADDRESS.to_string(),
            finalized: false,
            randomized: false,
            started: false,
            ended: false,
            winner: None,
            payout_amount: 0,
            total_pot: 0,
            score: GameScore::default(),
            squares: vec![None; SQUARE_COUNT],
            home_headers: [HEADER_UNSET; HEADER_COUNT],
            away_headers: [HEADER_UNSET; HEADER_COUNT],
        }
    }

    pub fn squares_sold(&self) -> usize {
        self.squares.iter().filter(|s| s.is_some()).count()
    }

    /// Distinct owners across all claimed squares
    pub fn player_count(&self) -> usize {
        self.squares
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Winner settled but the pot not yet paid out
    pub fn payout_pending(&self) -> bool {
        self.winner.is_some() && self.payout_amount > 0
    }

    /// Indices of squares owned here but unclaimed in `previous`
    pub fn newly_claimed_since(&self, previous: &LedgerRecord) -> Vec<(usize, String)> {
        self.squares
            .iter()
            .enumerate()
            .filter_map(|(idx, owner)| {
                let owner = owner.as_ref()?;
                match previous.squares.get(idx) {
                    Some(Some(_)) => None,
                    _ => Some((idx, owner.clone())),
                }
            })
            .collect()
    }

    /// Square index for the current score, once headers are assigned
    ///
    /// Row = position of the home digit in the home headers, column = position
    /// of the away digit in the away headers.
    pub fn winning_square_index(&self) -> Option<usize> {
        if !self.randomized {
            return None;
        }
        let (home, away) = self.score.winning_digits();
        let row = self.home_headers.iter().position(|d| *d == home)?;
        let col = self.away_headers.iter().position(|d| *d == away)?;
        Some(row * HEADER_COUNT + col)
    }

    /// Owner of the winning square, falling back to the board authority
    pub fn winning_account(&self) -> Option<String> {
        let idx = self.winning_square_index()?;
        Some(
            self.squares
                .get(idx)
                .cloned()
                .flatten()
                .unwrap_or_else(|| self.authority.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn randomized_record() -> LedgerRecord {
        let mut record = LedgerRecord::empty(3);
        record.randomized = true;
        record.home_headers = [3, 1, 4, 0, 5, 9, 2, 6, 8, 7];
        record.away_headers = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        record
    }

    #[test]
    fn test_empty_record_defaults() {
        let record = LedgerRecord::empty(42);
        assert_eq!(record.squares.len(), SQUARE_COUNT);
        assert_eq!(record.squares_sold(), 0);
        assert_eq!(record.player_count(), 0);
        assert_eq!(record.board_ref, BoardRef::derive(42));
        assert!(!record.payout_pending());
        assert!(record.winning_square_index().is_none());
    }

    #[test]
    fn test_player_count_counts_distinct_owners() {
        let mut record = LedgerRecord::empty(1);
        record.squares[0] = Some("alice".into());
        record.squares[1] = Some("alice".into());
        record.squares[50] = Some("bob".into());
        assert_eq!(record.squares_sold(), 3);
        assert_eq!(record.player_count(), 2);
    }

    #[test]
    fn test_winning_square_uses_header_positions() {
        let mut record = randomized_record();
        record.score = GameScore {
            home_score: 14,
            away_score: 7,
            quarter: 4,
        };
        // home digit 4 sits at row 2, away digit 7 at column 7
        assert_eq!(record.winning_square_index(), Some(27));
        assert_eq!(record.winning_account(), Some(SYSTEM_ADDRESS.to_string()));

        record.squares[27] = Some("carol".into());
        assert_eq!(record.winning_account(), Some("carol".to_string()));
    }

    #[test]
    fn test_newly_claimed_since() {
        let previous = LedgerRecord::empty(1);
        let mut current = previous.clone();
        current.squares[5] = Some("dave".into());
        current.squares[9] = Some("erin".into());

        let claimed = current.newly_claimed_since(&previous);
        assert_eq!(
            claimed,
            vec![(5, "dave".to_string()), (9, "erin".to_string())]
        );
        assert!(current.newly_claimed_since(&current).is_empty());
    }

    #[test]
    fn test_payout_pending_requires_winner_and_amount() {
        let mut record = randomized_record();
        record.payout_amount = 500;
        assert!(!record.payout_pending());
        record.winner = Some("carol".into());
        assert!(record.payout_pending());
        record.payout_amount = 0;
        assert!(!record.payout_pending());
    }
}

//! Move pickers that plug into the draughts turn loop: uniform random, first
//! offered and last offered. None of them look at the position.

use draughts_engine::{Board, Move, Player, PlayerAgent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("unknown agent kind: {0}")]
    UnknownAgent(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Random,
    First,
    Last,
}

impl AgentKind {
    pub fn label(self) -> &'static str {
        match self {
            AgentKind::Random => "random",
            AgentKind::First => "first",
            AgentKind::Last => "last",
        }
    }
}

impl FromStr for AgentKind {
    type Err = AgentError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(AgentKind::Random),
            "first" => Ok(AgentKind::First),
            "last" => Ok(AgentKind::Last),
            _ => Err(AgentError::UnknownAgent(token.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    #[serde(default = "default_kind")]
    pub kind: AgentKind,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_kind() -> AgentKind {
    AgentKind::Random
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            seed: 0,
            name: None,
        }
    }
}

impl AgentProfile {
    pub fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reads `DRAUGHTS_PLAYER1_AGENT` / `DRAUGHTS_PLAYER2_AGENT` and the shared
    /// `DRAUGHTS_SEED`. Player2 gets its own seed stream derived from the base.
    pub fn from_env(player: Player) -> Result<Self, AgentError> {
        let var = match player {
            Player::Player1 => "DRAUGHTS_PLAYER1_AGENT",
            Player::Player2 => "DRAUGHTS_PLAYER2_AGENT",
        };
        let kind = match std::env::var(var) {
            Ok(token) => token.parse()?,
            Err(_) => default_kind(),
        };
        let base_seed = std::env::var("DRAUGHTS_SEED")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let seed = match player {
            Player::Player1 => base_seed,
            Player::Player2 => base_seed.wrapping_add(1),
        };
        Ok(Self {
            kind,
            seed,
            name: None,
        })
    }

    /// Same profile with the seed shifted for the `game`-th game of a batch.
    pub fn for_game(&self, game: u64) -> Self {
        Self {
            seed: self.seed ^ game.wrapping_mul(SEED_MIX),
            ..self.clone()
        }
    }

    pub fn display_name(&self, player: Player) -> String {
        let seat = match player {
            Player::Player1 => 1,
            Player::Player2 => 2,
        };
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{seat}", self.kind.label()))
    }
}

pub fn build_agent(profile: &AgentProfile, player: Player) -> Box<dyn PlayerAgent> {
    let name = profile.display_name(player);
    match profile.kind {
        AgentKind::Random => Box::new(RandomAgent::new(name, profile.seed)),
        AgentKind::First => Box::new(FirstMoveAgent::new(name)),
        AgentKind::Last => Box::new(LastMoveAgent::new(name)),
    }
}

#[derive(Debug)]
pub struct RandomAgent {
    name: String,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PlayerAgent for RandomAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_move(&mut self, _board: &Board, _player: Player, legal_moves: &[Move]) -> Move {
        let idx = self.rng.gen_range(0..legal_moves.len());
        legal_moves[idx].clone()
    }
}

/// Always takes the first offered move, which is a simple step whenever one exists.
#[derive(Debug, Clone)]
pub struct FirstMoveAgent {
    name: String,
}

impl FirstMoveAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PlayerAgent for FirstMoveAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_move(&mut self, _board: &Board, _player: Player, legal_moves: &[Move]) -> Move {
        legal_moves[0].clone()
    }
}

/// Always takes the last offered move, which is a capture whenever one exists.
#[derive(Debug, Clone)]
pub struct LastMoveAgent {
    name: String,
}

impl LastMoveAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PlayerAgent for LastMoveAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_move(&mut self, _board: &Board, _player: Player, legal_moves: &[Move]) -> Move {
        legal_moves[legal_moves.len() - 1].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draughts_engine::{Cell, Game, GameStatus, Rank, DEFAULT_BOARD_SIZE};
    use std::collections::HashSet;

    fn opening_moves() -> (Board, Vec<Move>) {
        let board = Board::initial(DEFAULT_BOARD_SIZE);
        let moves = draughts_engine::generate_moves(&board, Player::Player1);
        (board, moves)
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!(" Random ".parse::<AgentKind>(), Ok(AgentKind::Random));
        assert_eq!("LAST".parse::<AgentKind>(), Ok(AgentKind::Last));
        assert_eq!(
            "minimax".parse::<AgentKind>(),
            Err(AgentError::UnknownAgent("minimax".into()))
        );
    }

    #[test]
    fn partial_profiles_fill_in_defaults() {
        let profile: AgentProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile, AgentProfile::default());
        let profile: AgentProfile = serde_json::from_str(r#"{"kind":"first","seed":9}"#).unwrap();
        assert_eq!(profile.kind, AgentKind::First);
        assert_eq!(profile.seed, 9);
        assert_eq!(profile.display_name(Player::Player2), "first-2");
    }

    #[test]
    fn profile_reads_environment() {
        std::env::set_var("DRAUGHTS_PLAYER2_AGENT", "last");
        std::env::set_var("DRAUGHTS_SEED", "41");
        let profile = AgentProfile::from_env(Player::Player2).unwrap();
        assert_eq!(profile.kind, AgentKind::Last);
        assert_eq!(profile.seed, 42);

        std::env::set_var("DRAUGHTS_PLAYER2_AGENT", "oracle");
        assert!(AgentProfile::from_env(Player::Player2).is_err());

        std::env::remove_var("DRAUGHTS_PLAYER2_AGENT");
        std::env::remove_var("DRAUGHTS_SEED");
        assert_eq!(AgentProfile::from_env(Player::Player2).unwrap().seed, 1);
    }

    #[test]
    fn batch_seeds_differ_per_game() {
        let base = AgentProfile::new(AgentKind::Random).with_seed(7);
        assert_eq!(base.for_game(0).seed, 7);
        assert_ne!(base.for_game(1).seed, base.for_game(2).seed);
        assert_eq!(base.for_game(3).kind, AgentKind::Random);
    }

    #[test]
    fn random_agent_is_reproducible_for_a_seed() {
        let (board, moves) = opening_moves();
        let mut a = RandomAgent::new("a", 1234);
        let mut b = RandomAgent::new("b", 1234);
        for _ in 0..20 {
            let picked = a.select_move(&board, Player::Player1, &moves);
            assert!(moves.contains(&picked));
            assert_eq!(picked, b.select_move(&board, Player::Player1, &moves));
        }
    }

    #[test]
    fn first_and_last_agents_take_the_list_ends() {
        let (board, moves) = opening_moves();
        let mut first = FirstMoveAgent::new("first");
        let mut last = LastMoveAgent::new("last");
        assert_eq!(first.select_move(&board, Player::Player1, &moves), moves[0]);
        assert_eq!(
            last.select_move(&board, Player::Player1, &moves),
            moves[moves.len() - 1]
        );
    }

    #[test]
    fn built_agents_carry_profile_names() {
        let mut profile = AgentProfile::new(AgentKind::First);
        assert_eq!(build_agent(&profile, Player::Player1).name(), "first-1");
        profile.name = Some("scout".into());
        assert_eq!(build_agent(&profile, Player::Player2).name(), "scout");
    }

    #[test]
    fn random_games_keep_board_invariants() {
        for seed in 0..6u64 {
            let profile = AgentProfile::new(AgentKind::Random).with_seed(seed);
            let mut game = Game::new(
                build_agent(&profile, Player::Player1),
                build_agent(&profile.for_game(1), Player::Player2),
                DEFAULT_BOARD_SIZE,
            );
            for _ in 0..300 {
                let mover = game.current_player();
                let before = game.get_board_state();
                let legal = game.get_valid_moves(mover);
                let status = game.step(false);
                if legal.is_empty() {
                    assert!(matches!(status, GameStatus::Won(v) if v.winner == mover.opponent()));
                    break;
                }

                let mv = game.history().last().unwrap().clone();
                assert!(legal.contains(&mv));
                let unique: HashSet<_> = mv.captures.iter().collect();
                assert_eq!(unique.len(), mv.captures.len());

                let board = game.board();
                if mv.end != mv.start {
                    assert!(board.get(mv.start).is_empty());
                }
                assert!(mv.captures.iter().all(|&sq| board.get(sq).is_empty()));

                let moved = before.get(mv.start).piece().unwrap();
                let landed = board.get(mv.end).piece().unwrap();
                assert_eq!(landed.owner, mover);
                if moved.is_king() || mv.end.0 == mover.promotion_row(board.size()) {
                    assert_eq!(landed.rank, Rank::King);
                }

                let (p1, p2) = board.count_pieces();
                let occupied = board.rows().flatten().filter(|c| **c != Cell::Empty).count();
                assert_eq!(p1 + p2, occupied);

                if let GameStatus::Won(victory) = status {
                    assert_eq!(victory.winner, mover);
                    assert!(p1 == 0 || p2 == 0);
                    break;
                }
            }
        }
    }
}

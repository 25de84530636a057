use anyhow::Context;
use draughts_agents::{build_agent, AgentProfile};
use draughts_engine::{
    serialize_move, Game, GameStatus, Player, SerializedMove, SerializedPosition, Victory, WinReason,
    DEFAULT_BOARD_SIZE, FILES,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_MAX_PLIES: usize = 1000;
// Squares are written with a single column letter.
const MAX_BOARD_SIZE: usize = FILES.len();

#[derive(Debug, Clone)]
struct Settings {
    board_size: usize,
    games: usize,
    max_plies: Option<usize>,
    verbose: bool,
    position: Option<PathBuf>,
    player1: AgentProfile,
    player2: AgentProfile,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            board_size: env_number("DRAUGHTS_BOARD_SIZE", DEFAULT_BOARD_SIZE)
                .clamp(1, MAX_BOARD_SIZE),
            games: env_number("DRAUGHTS_GAMES", 1).max(1),
            // 0 opts out of the cap; kings can shuffle forever without one.
            max_plies: Some(env_number("DRAUGHTS_MAX_PLIES", DEFAULT_MAX_PLIES))
                .filter(|&n| n > 0),
            verbose: env_flag("DRAUGHTS_VERBOSE", false),
            position: std::env::var("DRAUGHTS_POSITION").ok().map(PathBuf::from),
            player1: AgentProfile::from_env(Player::Player1)?,
            player2: AgentProfile::from_env(Player::Player2)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct GameSummary {
    game: usize,
    winner: Option<Player>,
    reason: Option<WinReason>,
    plies: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    moves: Vec<SerializedMove>,
    final_position: SerializedPosition,
}

#[derive(Debug, Serialize)]
struct MatchSummary {
    board_size: usize,
    games: usize,
    player1: AgentProfile,
    player2: AgentProfile,
    player1_wins: usize,
    player2_wins: usize,
    unfinished: usize,
    results: Vec<GameSummary>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env()?;
    let position = settings
        .position
        .as_ref()
        .map(|path| load_position(path))
        .transpose()?;
    info!(
        board_size = settings.board_size,
        games = settings.games,
        player1 = settings.player1.kind.label(),
        player2 = settings.player2.kind.label(),
        "starting match"
    );

    let results = run_match(&settings, position.as_ref())?;
    let summary = summarize(&settings, results);
    info!(
        player1_wins = summary.player1_wins,
        player2_wins = summary.player2_wins,
        unfinished = summary.unfinished,
        "match finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn load_position(path: &Path) -> anyhow::Result<SerializedPosition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading position {}", path.display()))?;
    let position = serde_json::from_str(&raw)
        .with_context(|| format!("parsing position {}", path.display()))?;
    Ok(position)
}

/// Plays every configured game, spreading batches over the rayon pool.
/// Results come back in game order.
fn run_match(
    settings: &Settings,
    position: Option<&SerializedPosition>,
) -> anyhow::Result<Vec<GameSummary>> {
    if settings.games > 1 {
        (0..settings.games)
            .into_par_iter()
            .map(|idx| play_game(settings, position, idx))
            .collect()
    } else {
        Ok(vec![play_game(settings, position, 0)?])
    }
}

fn play_game(
    settings: &Settings,
    position: Option<&SerializedPosition>,
    idx: usize,
) -> anyhow::Result<GameSummary> {
    let player1 = settings.player1.for_game(idx as u64);
    let player2 = settings.player2.for_game(idx as u64);
    let mut game = Game::new(
        build_agent(&player1, Player::Player1),
        build_agent(&player2, Player::Player2),
        settings.board_size,
    );
    if let Some(position) = position {
        game.import_position(position)
            .context("importing starting position")?;
    }

    let outcome: Option<Victory> = match settings.max_plies {
        Some(limit) => game.play_bounded(limit, settings.verbose),
        None => {
            game.play(settings.verbose);
            match game.status() {
                GameStatus::Won(victory) => Some(victory),
                GameStatus::Ongoing => None,
            }
        }
    };

    let moves = if settings.games == 1 {
        game.history().iter().map(serialize_move).collect()
    } else {
        Vec::new()
    };
    Ok(GameSummary {
        game: idx,
        winner: outcome.map(|v| v.winner),
        reason: outcome.map(|v| v.reason),
        plies: game.plies(),
        moves,
        final_position: game.export_position(),
    })
}

fn summarize(settings: &Settings, results: Vec<GameSummary>) -> MatchSummary {
    let wins = |player: Player| results.iter().filter(|r| r.winner == Some(player)).count();
    MatchSummary {
        board_size: settings.board_size,
        games: settings.games,
        player1: settings.player1.clone(),
        player2: settings.player2.clone(),
        player1_wins: wins(Player::Player1),
        player2_wins: wins(Player::Player2),
        unfinished: results.iter().filter(|r| r.winner.is_none()).count(),
        results,
    }
}

fn env_number(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draughts_agents::AgentKind;

    fn settings(games: usize) -> Settings {
        Settings {
            board_size: 4,
            games,
            max_plies: Some(200),
            verbose: false,
            position: None,
            player1: AgentProfile::new(AgentKind::Last),
            player2: AgentProfile::new(AgentKind::Random).with_seed(3),
        }
    }

    #[test]
    fn imported_position_decides_the_game() {
        let position = SerializedPosition {
            size: 4,
            current_player: -1,
            rows: vec![
                vec![0, 0, 0, 0],
                vec![0, 0, 0, 0],
                vec![0, 1, 0, 0],
                vec![-1, 0, 0, 0],
            ],
        };
        let summary = play_game(&settings(1), Some(&position), 0).unwrap();
        assert_eq!(summary.winner, Some(Player::Player1));
        assert_eq!(summary.reason, Some(WinReason::NoPieces));
        assert_eq!(summary.plies, 1);
        assert_eq!(summary.moves[0].start, "a4");
        assert_eq!(summary.moves[0].captures, vec!["b3"]);
    }

    #[test]
    fn mismatched_position_is_reported() {
        let position = SerializedPosition {
            size: 8,
            current_player: -1,
            rows: vec![vec![0; 8]; 8],
        };
        assert!(play_game(&settings(1), Some(&position), 0).is_err());
    }

    #[test]
    fn batch_runs_every_game_in_order() {
        let settings = settings(3);
        let results = run_match(&settings, None).unwrap();
        let order: Vec<_> = results.iter().map(|r| r.game).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(results.iter().all(|r| r.moves.is_empty()));

        let summary = summarize(&settings, results);
        assert_eq!(
            summary.player1_wins + summary.player2_wins + summary.unfinished,
            3
        );
    }

    #[test]
    fn shuffling_kings_stop_at_the_ply_cap() {
        let mut settings = settings(1);
        settings.player1 = AgentProfile::new(AgentKind::First);
        settings.player2 = AgentProfile::new(AgentKind::First);
        let results = run_match(&settings, None).unwrap();
        assert_eq!(results[0].winner, None);
        assert_eq!(results[0].reason, None);
        assert_eq!(results[0].plies, 200);
        assert_eq!(results[0].moves.len(), 200);
    }

    #[test]
    fn default_settings_always_finish() {
        for var in ["DRAUGHTS_MAX_PLIES", "DRAUGHTS_BOARD_SIZE", "DRAUGHTS_GAMES"] {
            std::env::remove_var(var);
        }
        std::env::set_var("DRAUGHTS_PLAYER1_AGENT", "last");
        std::env::set_var("DRAUGHTS_PLAYER2_AGENT", "last");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.board_size, DEFAULT_BOARD_SIZE);
        assert_eq!(settings.max_plies, Some(DEFAULT_MAX_PLIES));

        let results = run_match(&settings, None).unwrap();
        assert_eq!(results.len(), 1);
        let game = &results[0];
        assert!(game.winner.is_some() || game.plies == DEFAULT_MAX_PLIES);
        assert!(game.plies <= DEFAULT_MAX_PLIES);

        std::env::set_var("DRAUGHTS_BOARD_SIZE", "1000");
        assert_eq!(Settings::from_env().unwrap().board_size, MAX_BOARD_SIZE);
        std::env::set_var("DRAUGHTS_MAX_PLIES", "0");
        assert_eq!(Settings::from_env().unwrap().max_plies, None);

        for var in [
            "DRAUGHTS_BOARD_SIZE",
            "DRAUGHTS_MAX_PLIES",
            "DRAUGHTS_PLAYER1_AGENT",
            "DRAUGHTS_PLAYER2_AGENT",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn flags_accept_common_spellings() {
        std::env::set_var("DRAUGHTS_TEST_FLAG", "Yes");
        assert!(env_flag("DRAUGHTS_TEST_FLAG", false));
        std::env::set_var("DRAUGHTS_TEST_FLAG", "off");
        assert!(!env_flag("DRAUGHTS_TEST_FLAG", true));
        std::env::remove_var("DRAUGHTS_TEST_FLAG");
        assert!(env_flag("DRAUGHTS_TEST_FLAG", true));
        assert_eq!(env_number("DRAUGHTS_TEST_MISSING", 8), 8);
    }
}

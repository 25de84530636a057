//! Draughts rules engine: board state, move generation with multi-jump capture
//! chains, king promotion and the agent-driven turn loop.
//! Shared by the CLI driver and the agent crate so every consumer sees identical rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_BOARD_SIZE: usize = 8;
pub const FILES: &str = "abcdefghijklmnopqrstuvwxyz";

const HOME_ROWS: usize = 3;

pub type Position = (usize, usize); // (row, col) zero-based

type Direction = (isize, isize);

const PLAYER1_FORWARD: [Direction; 2] = [(-1, -1), (-1, 1)];
const PLAYER2_FORWARD: [Direction; 2] = [(1, -1), (1, 1)];
const DIAGONALS: [Direction; 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Player1,
    Player2,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::Player1 => Player::Player2,
            Player::Player2 => Player::Player1,
        }
    }

    /// Raw wire code: `-1` for Player1, `1` for Player2.
    pub fn code(self) -> i8 {
        match self {
            Player::Player1 => -1,
            Player::Player2 => 1,
        }
    }

    pub fn from_code(code: i8) -> Option<Player> {
        match code {
            -1 => Some(Player::Player1),
            1 => Some(Player::Player2),
            _ => None,
        }
    }

    /// Row on which this player's men are crowned.
    pub fn promotion_row(self, size: usize) -> usize {
        match self {
            Player::Player1 => 0,
            Player::Player2 => size.saturating_sub(1),
        }
    }

    fn index(self) -> usize {
        match self {
            Player::Player1 => 0,
            Player::Player2 => 1,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Player1 => write!(f, "Player 1"),
            Player::Player2 => write!(f, "Player 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Man,
    King,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub owner: Player,
    pub rank: Rank,
}

impl Piece {
    pub fn man(owner: Player) -> Self {
        Self {
            owner,
            rank: Rank::Man,
        }
    }

    pub fn king(owner: Player) -> Self {
        Self {
            owner,
            rank: Rank::King,
        }
    }

    pub fn is_king(self) -> bool {
        self.rank == Rank::King
    }

    /// Diagonals this piece may step or jump along. Men only go forward.
    pub fn directions(self) -> &'static [Direction] {
        match (self.rank, self.owner) {
            (Rank::King, _) => &DIAGONALS,
            (Rank::Man, Player::Player1) => &PLAYER1_FORWARD,
            (Rank::Man, Player::Player2) => &PLAYER2_FORWARD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    #[default]
    Empty,
    Occupied(Piece),
}

impl Cell {
    pub fn man(owner: Player) -> Self {
        Cell::Occupied(Piece::man(owner))
    }

    pub fn king(owner: Player) -> Self {
        Cell::Occupied(Piece::king(owner))
    }

    pub fn piece(self) -> Option<Piece> {
        match self {
            Cell::Empty => None,
            Cell::Occupied(piece) => Some(piece),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    /// Raw wire code: `0` empty, `∓1` men, `∓2` kings (negative for Player1).
    pub fn code(self) -> i8 {
        match self {
            Cell::Empty => 0,
            Cell::Occupied(piece) => {
                let magnitude = match piece.rank {
                    Rank::Man => 1,
                    Rank::King => 2,
                };
                magnitude * piece.owner.code()
            }
        }
    }

    pub fn from_code(code: i8) -> Option<Cell> {
        match code {
            0 => Some(Cell::Empty),
            -1 => Some(Cell::man(Player::Player1)),
            1 => Some(Cell::man(Player::Player2)),
            -2 => Some(Cell::king(Player::Player1)),
            2 => Some(Cell::king(Player::Player2)),
            _ => None,
        }
    }

    fn glyph(self) -> char {
        match self.piece() {
            None => '.',
            Some(Piece {
                owner: Player::Player1,
                rank: Rank::Man,
            }) => 'x',
            Some(Piece {
                owner: Player::Player1,
                rank: Rank::King,
            }) => 'X',
            Some(Piece {
                owner: Player::Player2,
                rank: Rank::Man,
            }) => 'o',
            Some(Piece {
                owner: Player::Player2,
                rank: Rank::King,
            }) => 'O',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub start: Position,
    pub end: Position,
    /// Squares jumped over, in traversal order. Empty for a simple step.
    pub captures: Vec<Position>,
}

impl Move {
    pub fn simple(start: Position, end: Position) -> Self {
        Self {
            start,
            end,
            captures: Vec::new(),
        }
    }

    pub fn is_capture(&self) -> bool {
        !self.captures.is_empty()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.is_capture() { 'x' } else { '-' };
        write!(
            f,
            "{}{separator}{}",
            position_to_notation(self.start),
            position_to_notation(self.end)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid board shape: expected a {expected}x{expected} grid")]
    InvalidBoardShape { expected: usize },
    #[error("invalid cell value {value} at row {row}, col {col}")]
    InvalidCellValue { row: usize, col: usize, value: i8 },
    #[error("invalid current player: {0}")]
    InvalidPlayer(i8),
    #[error("invalid square token: {0}")]
    InvalidCoord(String),
    #[error("out of bounds square: {0}")]
    OutOfBounds(String),
}

// --- Board state ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
}

impl Board {
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            cells: vec![Cell::Empty; size * size],
        }
    }

    /// Standard opening layout: men on the dark squares (`row + col` odd) of the
    /// home rows, Player2 at the top and Player1 at the bottom.
    ///
    /// An 8x8 board gets three home rows per side. Other sizes get
    /// `min(3, (size - 2) / 2)`, so at least two empty rows always separate the
    /// sides; a fixed three rows would overlap on anything smaller than 8.
    pub fn initial(size: usize) -> Self {
        let mut board = Self::empty(size);
        let home_rows = HOME_ROWS.min(size.saturating_sub(2) / 2);
        for row in 0..size {
            for col in 0..size {
                if (row + col) % 2 == 0 {
                    continue;
                }
                if row < home_rows {
                    board.set((row, col), Cell::man(Player::Player2));
                } else if row >= size - home_rows {
                    board.set((row, col), Cell::man(Player::Player1));
                }
            }
        }
        board
    }

    /// Builds a board from raw cell codes, rejecting any grid that is not
    /// `size`x`size` or that holds an unknown code.
    pub fn from_codes(rows: &[Vec<i8>], size: usize) -> Result<Board, EngineError> {
        if rows.len() != size || rows.iter().any(|row| row.len() != size) {
            return Err(EngineError::InvalidBoardShape { expected: size });
        }
        let mut cells = Vec::with_capacity(size * size);
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, &value) in row.iter().enumerate() {
                let cell = Cell::from_code(value).ok_or(EngineError::InvalidCellValue {
                    row: row_idx,
                    col: col_idx,
                    value,
                })?;
                cells.push(cell);
            }
        }
        Ok(Board { size, cells })
    }

    pub fn to_codes(&self) -> Vec<Vec<i8>> {
        self.rows()
            .map(|row| row.iter().map(|cell| cell.code()).collect())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, pos: Position) -> Cell {
        self.cells[self.index(pos)]
    }

    pub fn set(&mut self, pos: Position, cell: Cell) {
        let idx = self.index(pos);
        self.cells[idx] = cell;
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.size.max(1))
    }

    /// Every occupied square in row-major order.
    pub fn pieces(&self) -> impl Iterator<Item = (Position, Piece)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(idx, cell)| {
            cell.piece()
                .map(|piece| ((idx / self.size, idx % self.size), piece))
        })
    }

    /// `(player1, player2)` piece totals, men and kings together.
    pub fn count_pieces(&self) -> (usize, usize) {
        self.pieces()
            .fold((0, 0), |(p1, p2), (_, piece)| match piece.owner {
                Player::Player1 => (p1 + 1, p2),
                Player::Player2 => (p1, p2 + 1),
            })
    }

    fn index(&self, (row, col): Position) -> usize {
        debug_assert!(
            row < self.size && col < self.size,
            "position ({row}, {col}) outside {0}x{0} board",
            self.size
        );
        row * self.size + col
    }

    fn offset(&self, (row, col): Position, (dr, dc): Direction, distance: isize) -> Option<Position> {
        let nr = row as isize + dr * distance;
        let nc = col as isize + dc * distance;
        let bound = self.size as isize;
        (nr >= 0 && nc >= 0 && nr < bound && nc < bound).then_some((nr as usize, nc as usize))
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   ")?;
        for col in 0..self.size {
            write!(f, " {}", FILES.chars().nth(col).unwrap_or('?'))?;
        }
        writeln!(f)?;
        for (row_idx, row) in self.rows().enumerate() {
            write!(f, "{:>3}", row_idx + 1)?;
            for cell in row {
                write!(f, " {}", cell.glyph())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub fn position_to_notation((row, col): Position) -> String {
    match FILES.chars().nth(col) {
        Some(file) => format!("{file}{}", row + 1),
        None => format!("({row},{col})"),
    }
}

pub fn notation_to_position(token: &str, size: usize) -> Result<Position, EngineError> {
    let mut chars = token.chars();
    let file = chars
        .next()
        .ok_or_else(|| EngineError::InvalidCoord(token.to_string()))?
        .to_ascii_lowercase();
    let col = FILES
        .chars()
        .position(|c| c == file)
        .ok_or_else(|| EngineError::InvalidCoord(token.to_string()))?;
    let rank: usize = chars
        .as_str()
        .parse()
        .map_err(|_| EngineError::InvalidCoord(token.to_string()))?;
    if rank == 0 {
        return Err(EngineError::InvalidCoord(token.to_string()));
    }
    let pos = (rank - 1, col);
    if pos.0 >= size || pos.1 >= size {
        return Err(EngineError::OutOfBounds(token.to_string()));
    }
    Ok(pos)
}

// --- Move generation ---

/// All legal moves for `player`: every simple step first, then every capture
/// chain. Capturing is never forced; both groups are offered together.
pub fn generate_moves(board: &Board, player: Player) -> Vec<Move> {
    let mut simple = Vec::new();
    let mut captures = Vec::new();
    for (origin, piece) in board.pieces() {
        if piece.owner != player {
            continue;
        }
        for mv in piece_moves(board, origin) {
            if mv.is_capture() {
                captures.push(mv);
            } else {
                simple.push(mv);
            }
        }
    }
    simple.extend(captures);
    simple
}

/// Simple steps followed by capture chains for the piece on `origin`.
pub fn piece_moves(board: &Board, origin: Position) -> Vec<Move> {
    let Some(piece) = board.get(origin).piece() else {
        return Vec::new();
    };
    let mut moves: Vec<Move> = piece
        .directions()
        .iter()
        .filter_map(|&dir| board.offset(origin, dir, 1))
        .filter(|&target| board.get(target).is_empty())
        .map(|target| Move::simple(origin, target))
        .collect();
    moves.extend(capture_moves(board, origin));
    moves
}

/// Every capture chain starting at `origin`, including each shorter prefix of a
/// longer chain. The board is only read; jumps already made in the chain are
/// tracked by the search itself.
pub fn capture_moves(board: &Board, origin: Position) -> Vec<Move> {
    let Some(piece) = board.get(origin).piece() else {
        return Vec::new();
    };
    let mut search = ChainSearch {
        board,
        origin,
        piece,
        captured: Vec::new(),
        found: Vec::new(),
    };
    search.explore(origin);
    search.found
}

struct ChainSearch<'a> {
    board: &'a Board,
    origin: Position,
    piece: Piece,
    captured: Vec<Position>,
    found: Vec<Move>,
}

impl ChainSearch<'_> {
    // Board as it stands partway through the chain: the mover sits on `current`,
    // its origin and every jumped square are vacant.
    fn cell_at(&self, pos: Position, current: Position) -> Cell {
        if pos == current {
            Cell::Occupied(self.piece)
        } else if pos == self.origin || self.captured.contains(&pos) {
            Cell::Empty
        } else {
            self.board.get(pos)
        }
    }

    fn explore(&mut self, current: Position) {
        for &dir in self.piece.directions() {
            let (Some(mid), Some(landing)) = (
                self.board.offset(current, dir, 1),
                self.board.offset(current, dir, 2),
            ) else {
                continue;
            };
            let jumps_opponent = matches!(
                self.cell_at(mid, current).piece(),
                Some(p) if p.owner != self.piece.owner
            );
            if !jumps_opponent
                || self.captured.contains(&mid)
                || !self.cell_at(landing, current).is_empty()
            {
                continue;
            }
            self.captured.push(mid);
            self.found.push(Move {
                start: self.origin,
                end: landing,
                captures: self.captured.clone(),
            });
            self.explore(landing);
            self.captured.pop();
        }
    }
}

// --- Game engine ---

/// Move selection is delegated to an agent per side. `legal_moves` is never
/// empty when the engine calls in.
///
/// The engine applies whatever move comes back without checking that it was
/// offered; an agent returning anything else corrupts play.
pub trait PlayerAgent {
    fn name(&self) -> &str;

    fn select_move(&mut self, board: &Board, player: Player, legal_moves: &[Move]) -> Move;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinReason {
    NoMoves,
    NoPieces,
}

impl fmt::Display for WinReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WinReason::NoMoves => write!(f, "has no valid moves"),
            WinReason::NoPieces => write!(f, "has no pieces left"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Victory {
    pub winner: Player,
    pub reason: WinReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Ongoing,
    Won(Victory),
}

pub struct Game {
    board: Board,
    current_player: Player,
    agents: [Box<dyn PlayerAgent>; 2],
    status: GameStatus,
    history: Vec<Move>,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("size", &self.board.size())
            .field("current_player", &self.current_player)
            .field("player1", &self.agents[0].name())
            .field("player2", &self.agents[1].name())
            .field("status", &self.status)
            .field("plies", &self.history.len())
            .finish()
    }
}

impl Game {
    pub fn new(player1: Box<dyn PlayerAgent>, player2: Box<dyn PlayerAgent>, size: usize) -> Self {
        Self {
            board: Board::initial(size),
            current_player: Player::Player1,
            agents: [player1, player2],
            status: GameStatus::Ongoing,
            history: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.board.size()
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn history(&self) -> &[Move] {
        &self.history
    }

    pub fn plies(&self) -> usize {
        self.history.len()
    }

    pub fn agent_name(&self, player: Player) -> &str {
        self.agents[player.index()].name()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Independent copy of the live board.
    pub fn get_board_state(&self) -> Board {
        self.board.clone()
    }

    /// Replaces the position from raw codes. Shape, every cell and the player
    /// code are checked before anything is written.
    pub fn set_board(&mut self, rows: &[Vec<i8>], current_player: i8) -> Result<(), EngineError> {
        let board = Board::from_codes(rows, self.size())?;
        let player =
            Player::from_code(current_player).ok_or(EngineError::InvalidPlayer(current_player))?;
        self.install(board, player);
        Ok(())
    }

    pub fn set_board_state(&mut self, board: Board, current_player: Player) -> Result<(), EngineError> {
        if board.size() != self.size() {
            return Err(EngineError::InvalidBoardShape {
                expected: self.size(),
            });
        }
        self.install(board, current_player);
        Ok(())
    }

    fn install(&mut self, board: Board, current_player: Player) {
        self.board = board;
        self.current_player = current_player;
        self.status = GameStatus::Ongoing;
        self.history.clear();
    }

    pub fn get_valid_moves(&self, player: Player) -> Vec<Move> {
        generate_moves(&self.board, player)
    }

    /// Applies `mv` as given: vacates the start and every captured square,
    /// places the mover on `end` (crowning a man that reaches its last row)
    /// and hands the turn over.
    pub fn make_move(&mut self, mv: &Move) {
        let moving = self.board.get(mv.start);
        self.board.set(mv.start, Cell::Empty);
        for &captured in &mv.captures {
            self.board.set(captured, Cell::Empty);
        }
        let landed = match moving.piece() {
            Some(piece)
                if piece.rank == Rank::Man && mv.end.0 == piece.owner.promotion_row(self.size()) =>
            {
                Cell::king(piece.owner)
            }
            _ => moving,
        };
        self.board.set(mv.end, landed);
        debug!(
            player = %self.current_player,
            mv = %mv,
            captured = mv.captures.len(),
            crowned = landed != moving,
            "move applied"
        );
        self.current_player = self.current_player.opponent();
        self.history.push(mv.clone());
    }

    /// Runs a single turn. A finished game is left untouched.
    pub fn step(&mut self, verbose: bool) -> GameStatus {
        if self.status != GameStatus::Ongoing {
            return self.status;
        }
        let mover = self.current_player;
        let legal = self.get_valid_moves(mover);
        if legal.is_empty() {
            return self.finish(
                Victory {
                    winner: mover.opponent(),
                    reason: WinReason::NoMoves,
                },
                verbose,
            );
        }

        let mv = self.agents[mover.index()].select_move(&self.board, mover, &legal);
        self.make_move(&mv);
        if verbose {
            info!(player = %mover, agent = self.agent_name(mover), "played {mv}\n{}", self.board);
        }

        let (player1_pieces, player2_pieces) = self.board.count_pieces();
        if player1_pieces == 0 || player2_pieces == 0 {
            return self.finish(
                Victory {
                    winner: mover,
                    reason: WinReason::NoPieces,
                },
                verbose,
            );
        }
        GameStatus::Ongoing
    }

    /// Plays to the end and returns the winner.
    pub fn play(&mut self, verbose: bool) -> Player {
        if verbose {
            info!("starting position\n{}", self.board);
        }
        loop {
            if let GameStatus::Won(victory) = self.step(verbose) {
                return victory.winner;
            }
        }
    }

    /// Like [`Game::play`] but gives up once `max_plies` more moves have been
    /// applied without a result.
    pub fn play_bounded(&mut self, max_plies: usize, verbose: bool) -> Option<Victory> {
        if verbose {
            info!("starting position\n{}", self.board);
        }
        let limit = self.plies().saturating_add(max_plies);
        loop {
            if let GameStatus::Won(victory) = self.status {
                return Some(victory);
            }
            if self.plies() >= limit {
                debug!(plies = self.plies(), "ply limit reached");
                return None;
            }
            self.step(verbose);
        }
    }

    fn finish(&mut self, victory: Victory, verbose: bool) -> GameStatus {
        self.status = GameStatus::Won(victory);
        let loser = victory.winner.opponent();
        if verbose {
            info!(
                "{} {} wins! {} {} {}.",
                victory.winner,
                self.agent_name(victory.winner),
                loser,
                self.agent_name(loser),
                victory.reason
            );
        } else {
            debug!(winner = %victory.winner, reason = ?victory.reason, plies = self.plies(), "game over");
        }
        self.status
    }

    pub fn export_position(&self) -> SerializedPosition {
        SerializedPosition {
            size: self.size(),
            current_player: self.current_player.code(),
            rows: self.board.to_codes(),
        }
    }

    pub fn import_position(&mut self, payload: &SerializedPosition) -> Result<(), EngineError> {
        if payload.size != self.size() {
            return Err(EngineError::InvalidBoardShape {
                expected: self.size(),
            });
        }
        self.set_board(&payload.rows, payload.current_player)
    }
}

// --- Serialization ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPosition {
    pub size: usize,
    pub current_player: i8,
    pub rows: Vec<Vec<i8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMove {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub captures: Vec<String>,
}

pub fn serialize_move(mv: &Move) -> SerializedMove {
    SerializedMove {
        start: position_to_notation(mv.start),
        end: position_to_notation(mv.end),
        captures: mv.captures.iter().copied().map(position_to_notation).collect(),
    }
}

pub fn deserialize_move(payload: &SerializedMove, size: usize) -> Result<Move, EngineError> {
    let captures = payload
        .captures
        .iter()
        .map(|token| notation_to_position(token, size))
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(Move {
        start: notation_to_position(&payload.start, size)?,
        end: notation_to_position(&payload.end, size)?,
        captures,
    })
}

// --- Tests ---

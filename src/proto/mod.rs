//! Wire protocol: tagged message enums for both directions plus the shared
//! room views they carry.
//!
//! Both enums are internally tagged on `"type"` with camelCase tags, so a
//! frame looks like `{"type":"makeMove","roomCode":"AB12CD",...}`. Keeping
//! them closed enums means the dispatcher is exhaustively matched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer};

use crate::game::{Board, GlobalBoard};

/// A seated player. Join order encodes mark assignment: index 0 is X,
/// index 1 is O.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub session_code: String,
    pub name: String,
    pub connected: bool,
}

/// A spectator: watches broadcasts, holds no mark, cannot move.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectator {
    pub session_code: String,
    pub name: String,
}

/// Per-player match tally. Ties are credited to both players.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Over,
}

/// Outcome of a finished game: the winning player's session code, or a tie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameWinner {
    Player(String),
    Tie,
}

impl Serialize for GameWinner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GameWinner::Player(code) => serializer.serialize_str(code),
            GameWinner::Tie => serializer.serialize_str("tie"),
        }
    }
}

/// Full public state of a room, as broadcast on game start, reconnect,
/// spectator join, and reset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub players: Vec<Player>,
    pub board: Board,
    pub global_board: GlobalBoard,
    pub active_sub_board: Option<usize>,
    pub turn: Option<String>,
    pub scores: HashMap<String, Score>,
    pub status: RoomStatus,
    pub spectators: Vec<Spectator>,
    pub winner: Option<GameWinner>,
}

/// Incremental state sent after every applied move.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    pub board: Board,
    pub global_board: GlobalBoard,
    pub active_sub_board: Option<usize>,
    pub turn: Option<String>,
    pub scores: HashMap<String, Score>,
    pub spectators: Vec<Spectator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<GameWinner>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinQueue { player_name: String },
    LeaveQueue,
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_code: String,
        player_name: String,
        #[serde(default)]
        session_code: Option<String>,
        #[serde(default)]
        as_spectator: bool,
    },
    #[serde(rename_all = "camelCase")]
    MakeMove {
        room_code: String,
        board_index: usize,
        cell_index: usize,
        session_code: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestGameReset { room_code: String },
    #[serde(rename_all = "camelCase")]
    Reconnect {
        room_code: String,
        session_code: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    // Queue
    #[serde(rename_all = "camelCase")]
    JoinedQueue { position: usize },
    #[serde(rename_all = "camelCase")]
    QueueUpdate { position: usize },
    LeftQueue,
    QueueFull,
    AlreadyInQueueOrGame,
    #[serde(rename_all = "camelCase")]
    LobbyCreated {
        room_code: String,
        session_code: String,
    },

    // Room lifecycle
    GameStart(RoomSnapshot),
    #[serde(rename_all = "camelCase")]
    SessionCode { session_code: String },
    #[serde(rename_all = "camelCase")]
    WaitingForOpponent {
        session_code: String,
        status: RoomStatus,
    },
    RoomNotFound,
    Reconnected(RoomSnapshot),
    #[serde(rename_all = "camelCase")]
    PlayerReconnected { session_code: String },
    #[serde(rename_all = "camelCase")]
    JoinedAsSpectator {
        session_code: String,
        #[serde(flatten)]
        state: RoomSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    SpectatorJoined {
        name: String,
        spectators: Vec<Spectator>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected { session_code: String },
    #[serde(rename_all = "camelCase")]
    SpectatorLeft {
        session_code: String,
        spectators: Vec<Spectator>,
    },

    // Gameplay
    UpdateGame(GameUpdate),
    #[serde(rename_all = "camelCase")]
    GameOver {
        winner: GameWinner,
        scores: HashMap<String, Score>,
    },
    GameReset(RoomSnapshot),

    // Sender-only rejections
    GameNotReady,
    GameAlreadyOver,
    NotYourTurn,
    InvalidMove,
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

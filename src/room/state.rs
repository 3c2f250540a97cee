//! Authoritative per-match state and the command handlers that drive it.
//!
//! Every command locks the room once, validates fully before mutating, and
//! broadcasts while still holding the lock, so commands against one room are
//! strictly serialized and rejections are all-or-nothing. Sends go over
//! unbounded channels and never block; a send to a gone subscriber is
//! dropped without affecting the others.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::game::{self, Board, GlobalBoard, Mark, Outcome};
use crate::proto::{
    GameUpdate, GameWinner, Player, RoomSnapshot, RoomStatus, Score, ServerMessage, Spectator,
};
use crate::util::id::new_session_code;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("room does not have two connected players and an assigned turn")]
    RoomNotReady,
    #[error("the game is already over")]
    GameOver,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("move targets an occupied cell or the wrong sub-board")]
    InvalidMove,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no finished game to reset")]
pub struct ResetNotAllowed;

/// How a join request was resolved.
#[derive(Debug)]
pub enum JoinedAs {
    /// A known session code reclaimed its existing player seat.
    ReconnectedPlayer { session_code: String },
    Player { session_code: String },
    Spectator { session_code: String },
}

/// Who a closed socket turned out to belong to.
#[derive(Debug)]
pub enum ClosedRole {
    Player { session_code: String },
    Spectator { session_code: String, room_empty: bool },
    Unknown,
}

/// Result of a disconnect grace window expiring.
#[derive(Debug, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped { room_empty: bool },
    Kept,
}

struct Subscriber {
    conn: Uuid,
    tx: UnboundedSender<ServerMessage>,
}

struct RoomInner {
    players: Vec<Player>,
    spectators: Vec<Spectator>,
    board: Board,
    global_board: GlobalBoard,
    active_sub_board: Option<usize>,
    turn: Option<String>,
    scores: HashMap<String, Score>,
    winner: Option<GameWinner>,
    status: RoomStatus,
    /// session code -> outbound channel of the socket currently holding it.
    subscribers: HashMap<String, Subscriber>,
}

pub struct Room {
    pub code: String,
    created_at: Instant,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(code: String) -> Self {
        Self {
            code,
            created_at: Instant::now(),
            inner: Mutex::new(RoomInner {
                players: Vec::new(),
                spectators: Vec::new(),
                board: [[None; 9]; 9],
                global_board: [None; 9],
                active_sub_board: None,
                turn: None,
                scores: HashMap::new(),
                winner: None,
                status: RoomStatus::Waiting,
                subscribers: HashMap::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.inner.lock().snapshot()
    }

    /// True when the room holds nobody at all and is old enough for the
    /// idle sweep to reclaim (covers rooms created over HTTP and never
    /// joined).
    pub fn sweepable(&self, max_age: Duration) -> bool {
        let inner = self.inner.lock();
        inner.players.is_empty()
            && inner.spectators.is_empty()
            && inner.subscribers.is_empty()
            && self.created_at.elapsed() > max_age
    }

    /// Resolve a join request: reconnect a known player, seat a new player,
    /// or add a spectator once both seats are taken (or on request).
    pub fn join(
        &self,
        conn: Uuid,
        tx: &UnboundedSender<ServerMessage>,
        name: &str,
        session_code: Option<String>,
        as_spectator: bool,
    ) -> JoinedAs {
        let mut inner = self.inner.lock();

        if let Some(code) = session_code.as_deref() {
            if inner.players.iter().any(|p| p.session_code == code) {
                let code = code.to_string();
                inner.mark_connected(&code, true);
                inner
                    .subscribers
                    .insert(code.clone(), Subscriber { conn, tx: tx.clone() });
                let _ = tx.send(ServerMessage::Reconnected(inner.snapshot()));
                inner.broadcast_except(
                    &code,
                    &ServerMessage::PlayerReconnected {
                        session_code: code.clone(),
                    },
                );
                return JoinedAs::ReconnectedPlayer { session_code: code };
            }
        }

        let code = session_code.unwrap_or_else(new_session_code);

        if as_spectator || inner.players.len() >= 2 {
            inner.spectators.push(Spectator {
                session_code: code.clone(),
                name: name.to_string(),
            });
            inner
                .subscribers
                .insert(code.clone(), Subscriber { conn, tx: tx.clone() });
            let _ = tx.send(ServerMessage::JoinedAsSpectator {
                session_code: code.clone(),
                state: inner.snapshot(),
            });
            inner.broadcast(&ServerMessage::SpectatorJoined {
                name: name.to_string(),
                spectators: inner.spectators.clone(),
            });
            return JoinedAs::Spectator { session_code: code };
        }

        inner.players.push(Player {
            session_code: code.clone(),
            name: name.to_string(),
            connected: true,
        });
        inner.scores.insert(code.clone(), Score::default());
        inner
            .subscribers
            .insert(code.clone(), Subscriber { conn, tx: tx.clone() });
        let _ = tx.send(ServerMessage::SessionCode {
            session_code: code.clone(),
        });

        if inner.connected_players() == 2 {
            if inner.turn.is_none() {
                inner.turn = Some(inner.players[0].session_code.clone());
            }
            inner.status = RoomStatus::Playing;
            inner.broadcast(&ServerMessage::GameStart(inner.snapshot()));
        } else {
            let _ = tx.send(ServerMessage::WaitingForOpponent {
                session_code: code.clone(),
                status: inner.status,
            });
        }
        JoinedAs::Player { session_code: code }
    }

    /// Seat a matchmade player without any lifecycle broadcasts; the caller
    /// seats both entries and then calls [`Room::begin_matched_game`].
    pub fn seat_matched_player(
        &self,
        conn: Uuid,
        tx: &UnboundedSender<ServerMessage>,
        name: &str,
        session_code: &str,
    ) {
        let mut inner = self.inner.lock();
        inner.players.push(Player {
            session_code: session_code.to_string(),
            name: name.to_string(),
            connected: true,
        });
        inner.scores.insert(session_code.to_string(), Score::default());
        inner.subscribers.insert(
            session_code.to_string(),
            Subscriber { conn, tx: tx.clone() },
        );
    }

    /// Grant the opening turn to the first seat and announce the game.
    pub fn begin_matched_game(&self) {
        let mut inner = self.inner.lock();
        inner.turn = inner.players.first().map(|p| p.session_code.clone());
        inner.status = RoomStatus::Playing;
        inner.broadcast(&ServerMessage::GameStart(inner.snapshot()));
    }

    /// Validate and apply one move. Rejections leave the room untouched.
    pub fn make_move(
        &self,
        session_code: &str,
        board_index: usize,
        cell_index: usize,
    ) -> Result<(), MoveError> {
        let mut inner = self.inner.lock();

        if inner.connected_players() != 2 || inner.turn.is_none() {
            return Err(MoveError::RoomNotReady);
        }
        if inner.winner.is_some() {
            return Err(MoveError::GameOver);
        }
        if inner.turn.as_deref() != Some(session_code) {
            return Err(MoveError::NotYourTurn);
        }
        let mover = inner
            .players
            .iter()
            .position(|p| p.session_code == session_code)
            .ok_or(MoveError::InvalidMove)?;
        if board_index >= 9 || cell_index >= 9 {
            return Err(MoveError::InvalidMove);
        }
        if inner.board[board_index][cell_index].is_some() {
            return Err(MoveError::InvalidMove);
        }
        if matches!(inner.active_sub_board, Some(active) if active != board_index) {
            return Err(MoveError::InvalidMove);
        }

        let mark = if mover == 0 { Mark::X } else { Mark::O };
        game::apply_move(&mut inner.board, board_index, cell_index, mark)
            .map_err(|_| MoveError::InvalidMove)?;

        // A tied sub-board does not claim its global cell.
        if let Some(Outcome::Won(local_winner)) = game::check_winner(&inner.board[board_index]) {
            inner.global_board[board_index] = Some(local_winner);
        }

        let global_outcome = game::check_winner(&inner.global_board);
        if global_outcome.is_none() {
            inner.turn = Some(inner.players[(mover + 1) % 2].session_code.clone());
        }
        inner.active_sub_board =
            game::next_active_board(&inner.board, &inner.global_board, cell_index);

        inner.broadcast(&ServerMessage::UpdateGame(inner.update_payload(None)));

        if let Some(outcome) = global_outcome {
            let inner = &mut *inner;
            let winner = match outcome {
                Outcome::Won(_) => GameWinner::Player(session_code.to_string()),
                Outcome::Tie => GameWinner::Tie,
            };
            credit_result(&mut inner.scores, &inner.players, &winner);
            inner.winner = Some(winner.clone());
            inner.status = RoomStatus::Over;
            inner.broadcast(&ServerMessage::GameOver {
                winner: winner.clone(),
                scores: inner.scores.clone(),
            });
            inner.broadcast(&ServerMessage::UpdateGame(inner.update_payload(Some(winner))));
        }
        Ok(())
    }

    /// Clear the boards for a rematch. Scores survive; the original first
    /// seat opens again.
    pub fn request_reset(&self) -> Result<(), ResetNotAllowed> {
        let mut inner = self.inner.lock();
        if inner.winner.is_none() {
            return Err(ResetNotAllowed);
        }
        inner.board = [[None; 9]; 9];
        inner.global_board = [None; 9];
        inner.active_sub_board = None;
        inner.winner = None;
        inner.turn = inner.players.first().map(|p| p.session_code.clone());
        inner.status = if inner.connected_players() == 2 {
            RoomStatus::Playing
        } else {
            RoomStatus::Waiting
        };
        inner.broadcast(&ServerMessage::GameReset(inner.snapshot()));
        Ok(())
    }

    /// Restore a player seat for a reconnecting session. Returns false if
    /// the session code does not belong to a player here.
    pub fn reconnect(
        &self,
        conn: Uuid,
        tx: &UnboundedSender<ServerMessage>,
        session_code: &str,
    ) -> bool {
        let mut inner = self.inner.lock();
        if !inner.players.iter().any(|p| p.session_code == session_code) {
            return false;
        }
        inner.mark_connected(session_code, true);
        inner.subscribers.insert(
            session_code.to_string(),
            Subscriber { conn, tx: tx.clone() },
        );
        let _ = tx.send(ServerMessage::Reconnected(inner.snapshot()));
        inner.broadcast_except(
            session_code,
            &ServerMessage::PlayerReconnected {
                session_code: session_code.to_string(),
            },
        );
        true
    }

    /// Handle a transport-level close for `conn`.
    ///
    /// Players keep their seat (flagged disconnected) so the grace window
    /// can restore them; spectators are removed immediately. A conn that
    /// was already superseded by a newer socket resolves to `Unknown` and
    /// nothing changes.
    pub fn handle_socket_closed(&self, conn: Uuid) -> ClosedRole {
        let mut inner = self.inner.lock();
        let Some(session_code) = inner
            .subscribers
            .iter()
            .find(|(_, sub)| sub.conn == conn)
            .map(|(code, _)| code.clone())
        else {
            return ClosedRole::Unknown;
        };
        inner.subscribers.remove(&session_code);

        if inner.players.iter().any(|p| p.session_code == session_code) {
            inner.mark_connected(&session_code, false);
            inner.broadcast(&ServerMessage::PlayerDisconnected {
                session_code: session_code.clone(),
            });
            return ClosedRole::Player { session_code };
        }

        if inner.spectators.iter().any(|s| s.session_code == session_code) {
            inner.spectators.retain(|s| s.session_code != session_code);
            inner.broadcast(&ServerMessage::SpectatorLeft {
                session_code: session_code.clone(),
                spectators: inner.spectators.clone(),
            });
            let room_empty = inner.players.is_empty() && inner.spectators.is_empty();
            return ClosedRole::Spectator {
                session_code,
                room_empty,
            };
        }
        ClosedRole::Unknown
    }

    /// Expiry half of the disconnect grace window. A no-op if the player
    /// reconnected in the meantime or was already removed.
    pub fn drop_if_still_disconnected(&self, session_code: &str) -> DropOutcome {
        let mut inner = self.inner.lock();
        match inner
            .players
            .iter()
            .position(|p| p.session_code == session_code)
        {
            Some(idx) if !inner.players[idx].connected => {
                inner.players.remove(idx);
                inner.subscribers.remove(session_code);
                let room_empty = inner.players.is_empty() && inner.spectators.is_empty();
                DropOutcome::Dropped { room_empty }
            }
            _ => DropOutcome::Kept,
        }
    }
}

impl RoomInner {
    fn connected_players(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    fn mark_connected(&mut self, session_code: &str, connected: bool) {
        if let Some(player) = self
            .players
            .iter_mut()
            .find(|p| p.session_code == session_code)
        {
            player.connected = connected;
        }
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for sub in self.subscribers.values() {
            let _ = sub.tx.send(msg.clone());
        }
    }

    fn broadcast_except(&self, session_code: &str, msg: &ServerMessage) {
        for (code, sub) in &self.subscribers {
            if code != session_code {
                let _ = sub.tx.send(msg.clone());
            }
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            players: self.players.clone(),
            board: self.board,
            global_board: self.global_board,
            active_sub_board: self.active_sub_board,
            turn: self.turn.clone(),
            scores: self.scores.clone(),
            status: self.status,
            spectators: self.spectators.clone(),
            winner: self.winner.clone(),
        }
    }

    fn update_payload(&self, winner: Option<GameWinner>) -> GameUpdate {
        GameUpdate {
            board: self.board,
            global_board: self.global_board,
            active_sub_board: self.active_sub_board,
            turn: self.turn.clone(),
            scores: self.scores.clone(),
            spectators: self.spectators.clone(),
            winner,
        }
    }
}

/// Credit a finished game to the scoreboard: both players on a tie, wins
/// and losses otherwise.
fn credit_result(
    scores: &mut HashMap<String, Score>,
    players: &[Player],
    winner: &GameWinner,
) {
    match winner {
        GameWinner::Tie => {
            for player in players {
                if let Some(score) = scores.get_mut(&player.session_code) {
                    score.ties += 1;
                }
            }
        }
        GameWinner::Player(code) => {
            for player in players {
                if let Some(score) = scores.get_mut(&player.session_code) {
                    if player.session_code == *code {
                        score.wins += 1;
                    } else {
                        score.losses += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ServerMessage as Sm;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct Seat {
        code: String,
        conn: Uuid,
        rx: UnboundedReceiver<ServerMessage>,
    }

    fn join_player(room: &Room, name: &str) -> Seat {
        let conn = Uuid::new_v4();
        let (tx, rx) = unbounded_channel();
        match room.join(conn, &tx, name, None, false) {
            JoinedAs::Player { session_code } => Seat {
                code: session_code,
                conn,
                rx,
            },
            other => panic!("expected player seat, got {other:?}"),
        }
    }

    fn two_player_room() -> (Room, Seat, Seat) {
        let room = Room::new("ROOM01".to_string());
        let a = join_player(&room, "Ada");
        let b = join_player(&room, "Bix");
        (room, a, b)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// A legal alternating game in which X (the first seat) wins sub-boards
    /// 8, 4, and 0 in that order, completing the 0-4-8 global diagonal.
    const X_WINS_SCRIPT: [(usize, usize); 25] = [
        (0, 0),
        (0, 4),
        (4, 0),
        (0, 8),
        (8, 0),
        (0, 5),
        (5, 4),
        (4, 8),
        (8, 1),
        (1, 4),
        (4, 1),
        (1, 8),
        (8, 2),
        (2, 4),
        (4, 2),
        (2, 5),
        (5, 1),
        (1, 0),
        (0, 1),
        (1, 2),
        (2, 0),
        (0, 6),
        (6, 3),
        (3, 0),
        (0, 2),
    ];

    fn play_script(room: &Room, a: &Seat, b: &Seat) {
        for (idx, (board, cell)) in X_WINS_SCRIPT.iter().enumerate() {
            let mover = if idx % 2 == 0 { &a.code } else { &b.code };
            room.make_move(mover, *board, *cell)
                .unwrap_or_else(|err| panic!("move {idx} ({board},{cell}) rejected: {err}"));
        }
    }

    #[test]
    fn first_joiner_waits_and_second_join_starts_the_game() {
        let room = Room::new("ROOM01".to_string());
        let mut a = join_player(&room, "Ada");
        assert_eq!(room.snapshot().status, RoomStatus::Waiting);
        let events = drain(&mut a.rx);
        assert!(matches!(events[0], Sm::SessionCode { .. }));
        assert!(matches!(events[1], Sm::WaitingForOpponent { .. }));

        let mut b = join_player(&room, "Bix");
        let snap = room.snapshot();
        assert_eq!(snap.status, RoomStatus::Playing);
        assert_eq!(snap.turn.as_deref(), Some(a.code.as_str()));
        assert!(drain(&mut a.rx)
            .iter()
            .any(|m| matches!(m, Sm::GameStart(_))));
        assert!(drain(&mut b.rx)
            .iter()
            .any(|m| matches!(m, Sm::GameStart(_))));
    }

    #[test]
    fn third_joiner_is_always_a_spectator() {
        let (room, mut a, _b) = two_player_room();
        drain(&mut a.rx);
        let (tx, mut rx) = unbounded_channel();
        // asSpectator is false; seats are full, so spectator anyway.
        let joined = room.join(Uuid::new_v4(), &tx, "Cee", None, false);
        assert!(matches!(joined, JoinedAs::Spectator { .. }));

        let snap = room.snapshot();
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.spectators.len(), 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, Sm::JoinedAsSpectator { .. })));
        assert!(drain(&mut a.rx)
            .iter()
            .any(|m| matches!(m, Sm::SpectatorJoined { .. })));
    }

    #[test]
    fn explicit_spectator_request_is_honored_before_seats_fill() {
        let room = Room::new("ROOM01".to_string());
        let (tx, _rx) = unbounded_channel();
        let joined = room.join(Uuid::new_v4(), &tx, "Cee", None, true);
        assert!(matches!(joined, JoinedAs::Spectator { .. }));
        assert!(room.snapshot().players.is_empty());
    }

    #[test]
    fn moves_are_rejected_until_two_players_are_connected() {
        let room = Room::new("ROOM01".to_string());
        let a = join_player(&room, "Ada");
        assert_eq!(
            room.make_move(&a.code, 0, 0),
            Err(MoveError::RoomNotReady)
        );
    }

    #[test]
    fn opening_move_restricts_the_opponent_to_the_addressed_board() {
        let (room, a, b) = two_player_room();

        room.make_move(&a.code, 0, 0).unwrap();
        assert_eq!(room.snapshot().active_sub_board, Some(0));

        // Not O's board of choice.
        assert_eq!(room.make_move(&b.code, 4, 0), Err(MoveError::InvalidMove));
        // Not X's turn anymore.
        assert_eq!(room.make_move(&a.code, 0, 1), Err(MoveError::NotYourTurn));

        room.make_move(&b.code, 0, 4).unwrap();
        assert_eq!(room.snapshot().active_sub_board, Some(4));
    }

    #[test]
    fn occupied_cell_is_rejected_without_mutating() {
        let (room, a, b) = two_player_room();
        room.make_move(&a.code, 0, 0).unwrap();
        let before = room.snapshot();

        assert_eq!(room.make_move(&b.code, 0, 0), Err(MoveError::InvalidMove));

        let after = room.snapshot();
        assert_eq!(after.board, before.board);
        assert_eq!(after.turn, before.turn);
        assert_eq!(after.active_sub_board, before.active_sub_board);
    }

    #[test]
    fn out_of_range_indices_are_invalid() {
        let (room, a, _b) = two_player_room();
        assert_eq!(room.make_move(&a.code, 9, 0), Err(MoveError::InvalidMove));
        assert_eq!(room.make_move(&a.code, 0, 9), Err(MoveError::InvalidMove));
    }

    #[test]
    fn full_game_ends_with_a_global_diagonal_for_x() {
        let (room, mut a, mut b) = two_player_room();
        drain(&mut a.rx);
        drain(&mut b.rx);

        for (idx, (board, cell)) in X_WINS_SCRIPT.iter().enumerate() {
            let mover = if idx % 2 == 0 { &a.code } else { &b.code };
            room.make_move(mover, *board, *cell).unwrap();

            let snap = room.snapshot();
            match idx {
                12 => {
                    // X completes sub-board 8; the cell redirects to board 2.
                    assert_eq!(snap.global_board[8], Some(Mark::X));
                    assert_eq!(snap.active_sub_board, Some(2));
                }
                14 => assert_eq!(snap.global_board[4], Some(Mark::X)),
                17 => assert_eq!(snap.global_board[1], Some(Mark::O)),
                18 => {
                    // Cell 1 addresses the decided sub-board 1: free choice.
                    assert_eq!(snap.active_sub_board, None);
                }
                _ => {}
            }
        }

        let snap = room.snapshot();
        assert_eq!(snap.winner, Some(GameWinner::Player(a.code.clone())));
        assert_eq!(snap.status, RoomStatus::Over);
        assert_eq!(snap.global_board[0], Some(Mark::X));
        assert_eq!(snap.global_board[4], Some(Mark::X));
        assert_eq!(snap.global_board[8], Some(Mark::X));
        assert_eq!(snap.scores[&a.code], Score { wins: 1, losses: 0, ties: 0 });
        assert_eq!(snap.scores[&b.code], Score { wins: 0, losses: 1, ties: 0 });

        let b_events = drain(&mut b.rx);
        assert!(b_events
            .iter()
            .any(|m| matches!(m, Sm::GameOver { winner: GameWinner::Player(code), .. } if *code == a.code)));
        // The finishing move is followed by a second update carrying the winner.
        assert!(matches!(
            b_events.last(),
            Some(Sm::UpdateGame(update)) if update.winner.is_some()
        ));
    }

    #[test]
    fn moves_after_the_game_is_over_are_rejected() {
        let (room, a, b) = two_player_room();
        play_script(&room, &a, &b);
        assert_eq!(room.make_move(&b.code, 3, 1), Err(MoveError::GameOver));
    }

    #[test]
    fn reset_restores_empty_boards_and_keeps_scores() {
        let (room, a, b) = two_player_room();
        play_script(&room, &a, &b);

        room.request_reset().unwrap();

        let snap = room.snapshot();
        assert_eq!(snap.board, [[None; 9]; 9]);
        assert_eq!(snap.global_board, [None; 9]);
        assert_eq!(snap.active_sub_board, None);
        assert_eq!(snap.winner, None);
        assert_eq!(snap.status, RoomStatus::Playing);
        assert_eq!(snap.turn.as_deref(), Some(a.code.as_str()));
        assert_eq!(snap.scores[&a.code].wins, 1);
        assert_eq!(snap.scores[&b.code].losses, 1);
    }

    #[test]
    fn reset_is_rejected_while_a_game_is_running() {
        let (room, a, _b) = two_player_room();
        room.make_move(&a.code, 0, 0).unwrap();
        assert_eq!(room.request_reset(), Err(ResetNotAllowed));
    }

    #[test]
    fn disconnect_then_reconnect_restores_the_same_seat() {
        let (room, mut a, b) = two_player_room();
        drain(&mut a.rx);

        match room.handle_socket_closed(b.conn) {
            ClosedRole::Player { session_code } => assert_eq!(session_code, b.code),
            other => panic!("expected player close, got {other:?}"),
        }
        let snap = room.snapshot();
        assert_eq!(snap.players.len(), 2);
        assert!(!snap.players[1].connected);
        assert!(drain(&mut a.rx)
            .iter()
            .any(|m| matches!(m, Sm::PlayerDisconnected { .. })));

        // Same session code, fresh socket.
        let (tx, mut rx) = unbounded_channel();
        assert!(room.reconnect(Uuid::new_v4(), &tx, &b.code));

        let snap = room.snapshot();
        assert_eq!(snap.players.len(), 2);
        assert!(snap.players[1].connected);
        assert_eq!(snap.players[1].session_code, b.code);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, Sm::Reconnected(_))));
        assert!(drain(&mut a.rx)
            .iter()
            .any(|m| matches!(m, Sm::PlayerReconnected { .. })));
    }

    #[test]
    fn grace_expiry_drops_only_players_still_disconnected() {
        let (room, a, b) = two_player_room();

        room.handle_socket_closed(b.conn);
        assert_eq!(
            room.drop_if_still_disconnected(&b.code),
            DropOutcome::Dropped { room_empty: false }
        );
        assert_eq!(room.snapshot().players.len(), 1);
        // Firing again is harmless.
        assert_eq!(room.drop_if_still_disconnected(&b.code), DropOutcome::Kept);

        // A reconnected player keeps their seat.
        room.handle_socket_closed(a.conn);
        let (tx, _rx) = unbounded_channel();
        assert!(room.reconnect(Uuid::new_v4(), &tx, &a.code));
        assert_eq!(room.drop_if_still_disconnected(&a.code), DropOutcome::Kept);
        assert_eq!(room.snapshot().players.len(), 1);
    }

    #[test]
    fn spectator_disconnect_is_immediate_removal() {
        let (room, mut a, _b) = two_player_room();
        drain(&mut a.rx);
        let conn = Uuid::new_v4();
        let (tx, _rx) = unbounded_channel();
        room.join(conn, &tx, "Cee", None, true);

        match room.handle_socket_closed(conn) {
            ClosedRole::Spectator { room_empty, .. } => assert!(!room_empty),
            other => panic!("expected spectator close, got {other:?}"),
        }
        assert!(room.snapshot().spectators.is_empty());
        assert!(drain(&mut a.rx)
            .iter()
            .any(|m| matches!(m, Sm::SpectatorLeft { .. })));
    }

    #[test]
    fn stale_socket_close_does_not_disturb_a_newer_connection() {
        let (room, _a, b) = two_player_room();

        // b reconnects on a fresh socket before the old one's close lands.
        let (tx, _rx) = unbounded_channel();
        assert!(room.reconnect(Uuid::new_v4(), &tx, &b.code));

        assert!(matches!(
            room.handle_socket_closed(b.conn),
            ClosedRole::Unknown
        ));
        assert!(room.snapshot().players[1].connected);
    }

    #[test]
    fn join_with_known_session_code_reconnects_instead_of_reseating() {
        let (room, _a, b) = two_player_room();
        room.handle_socket_closed(b.conn);

        let (tx, _rx) = unbounded_channel();
        let joined = room.join(
            Uuid::new_v4(),
            &tx,
            "Bix",
            Some(b.code.clone()),
            false,
        );
        assert!(matches!(joined, JoinedAs::ReconnectedPlayer { .. }));
        let snap = room.snapshot();
        assert_eq!(snap.players.len(), 2);
        assert!(snap.players[1].connected);
    }

    #[test]
    fn ties_credit_both_players() {
        let players = vec![
            Player {
                session_code: "p1".into(),
                name: "Ada".into(),
                connected: true,
            },
            Player {
                session_code: "p2".into(),
                name: "Bix".into(),
                connected: true,
            },
        ];
        let mut scores: HashMap<String, Score> = players
            .iter()
            .map(|p| (p.session_code.clone(), Score::default()))
            .collect();

        credit_result(&mut scores, &players, &GameWinner::Tie);
        assert_eq!(scores["p1"], Score { wins: 0, losses: 0, ties: 1 });
        assert_eq!(scores["p2"], Score { wins: 0, losses: 0, ties: 1 });

        credit_result(&mut scores, &players, &GameWinner::Player("p2".into()));
        assert_eq!(scores["p1"].losses, 1);
        assert_eq!(scores["p2"].wins, 1);
    }
}

//! Connection gateway: WebSocket lifecycle, session mapping, and command
//! dispatch.
//!
//! Each socket gets a connection id, an outbound channel drained by a
//! writer task, and an entry in the connection table recording which queue
//! slot or room seat it currently holds. Inbound frames are closed-enum
//! commands routed to the queue or a room; rejections go back on the
//! sender's channel only.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::http::routes::AppState;
use crate::proto::{ClientMessage, ServerMessage};
use crate::queue::{EnqueueOutcome, QueueEntry, QueueError};
use crate::room::registry::RoomRegistry;
use crate::room::state::{ClosedRole, JoinedAs, MoveError};
use crate::util::id::new_session_code;

/// The room seat or spectator slot a connection currently occupies.
#[derive(Debug, Clone)]
pub struct Seat {
    pub room_code: String,
    pub session_code: String,
}

#[derive(Debug, Default)]
pub struct ConnSession {
    pub in_queue: bool,
    pub seat: Option<Seat>,
}

pub struct ConnHandle {
    pub tx: UnboundedSender<ServerMessage>,
    pub session: Mutex<ConnSession>,
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.conns.insert(
        conn_id,
        ConnHandle {
            tx: tx.clone(),
            session: Mutex::new(ConnSession::default()),
        },
    );
    debug!(%conn_id, "socket connected");

    // Forward queued server events to the wire.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(err) => {
                    error!(%err, "failed to encode server message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(cmd) => dispatch(&state, conn_id, &tx, cmd),
                Err(err) => {
                    debug!(%conn_id, %err, "rejecting malformed frame");
                    let _ = tx.send(ServerMessage::Error {
                        message: format!("bad message: {err}"),
                    });
                }
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    on_socket_closed(&state, conn_id);
    state.conns.remove(&conn_id);
    writer.abort();
    debug!(%conn_id, "socket closed");
}

fn dispatch(state: &AppState, conn_id: Uuid, tx: &UnboundedSender<ServerMessage>, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinQueue { player_name } => join_queue(state, conn_id, tx, &player_name),
        ClientMessage::LeaveQueue => leave_queue(state, conn_id, tx),
        ClientMessage::JoinRoom {
            room_code,
            player_name,
            session_code,
            as_spectator,
        } => join_room(
            state,
            conn_id,
            tx,
            &room_code,
            &player_name,
            session_code,
            as_spectator,
        ),
        ClientMessage::MakeMove {
            room_code,
            board_index,
            cell_index,
            session_code,
        } => make_move(state, tx, &room_code, board_index, cell_index, &session_code),
        ClientMessage::RequestGameReset { room_code } => request_reset(state, tx, &room_code),
        ClientMessage::Reconnect {
            room_code,
            session_code,
        } => reconnect(state, conn_id, tx, &room_code, &session_code),
    }
}

fn join_queue(state: &AppState, conn_id: Uuid, tx: &UnboundedSender<ServerMessage>, name: &str) {
    let busy = state
        .conns
        .get(&conn_id)
        .map(|handle| {
            let session = handle.session.lock();
            session.in_queue || session.seat.is_some()
        })
        .unwrap_or(false);
    if busy {
        let _ = tx.send(ServerMessage::AlreadyInQueueOrGame);
        return;
    }

    match state.queue.enqueue(conn_id, name, tx) {
        Ok(EnqueueOutcome::Queued { position }) => {
            set_in_queue(state, conn_id, true);
            debug!(%conn_id, position, "queued for matchmaking");
        }
        Ok(EnqueueOutcome::Paired(first, second)) => create_lobby(state, first, second),
        Err(QueueError::Full) => {
            let _ = tx.send(ServerMessage::QueueFull);
        }
        Err(QueueError::AlreadyQueued) => {
            let _ = tx.send(ServerMessage::AlreadyInQueueOrGame);
        }
    }
}

/// Seat the two oldest queue entries in a fresh room: earlier arrival is
/// player 1 (X) and opens.
fn create_lobby(state: &AppState, first: QueueEntry, second: QueueEntry) {
    let (room_code, room) = state.registry.create_room();
    info!(room = %room_code, "matched two queue entries");

    for entry in [first, second] {
        let session_code = new_session_code();
        room.seat_matched_player(entry.conn, &entry.tx, &entry.name, &session_code);
        if let Some(handle) = state.conns.get(&entry.conn) {
            let mut session = handle.session.lock();
            session.in_queue = false;
            session.seat = Some(Seat {
                room_code: room_code.clone(),
                session_code: session_code.clone(),
            });
            let _ = handle.tx.send(ServerMessage::LobbyCreated {
                room_code: room_code.clone(),
                session_code,
            });
        }
    }
    room.begin_matched_game();
}

fn leave_queue(state: &AppState, conn_id: Uuid, tx: &UnboundedSender<ServerMessage>) {
    if !is_in_queue(state, conn_id) {
        return;
    }
    if state.queue.leave(conn_id) {
        let _ = tx.send(ServerMessage::LeftQueue);
    }
    set_in_queue(state, conn_id, false);
}

fn join_room(
    state: &AppState,
    conn_id: Uuid,
    tx: &UnboundedSender<ServerMessage>,
    room_code: &str,
    player_name: &str,
    session_code: Option<String>,
    as_spectator: bool,
) {
    // Joining a room implicitly abandons the matchmaking queue.
    if is_in_queue(state, conn_id) {
        if state.queue.leave(conn_id) {
            let _ = tx.send(ServerMessage::LeftQueue);
        }
        set_in_queue(state, conn_id, false);
    }

    let Some(room) = state.registry.get(room_code) else {
        let _ = tx.send(ServerMessage::RoomNotFound);
        return;
    };

    detach_previous_seat(state, conn_id, room_code);

    match room.join(conn_id, tx, player_name, session_code, as_spectator) {
        JoinedAs::ReconnectedPlayer { session_code } => {
            state.registry.cancel_disconnect_drop(room_code, &session_code);
            set_seat(state, conn_id, room_code, &session_code);
        }
        JoinedAs::Player { session_code } | JoinedAs::Spectator { session_code } => {
            set_seat(state, conn_id, room_code, &session_code);
        }
    }
}

fn make_move(
    state: &AppState,
    tx: &UnboundedSender<ServerMessage>,
    room_code: &str,
    board_index: usize,
    cell_index: usize,
    session_code: &str,
) {
    let Some(room) = state.registry.get(room_code) else {
        let _ = tx.send(ServerMessage::RoomNotFound);
        return;
    };
    if let Err(err) = room.make_move(session_code, board_index, cell_index) {
        debug!(room = %room_code, %err, "move rejected");
        let _ = tx.send(rejection(err));
    }
}

fn rejection(err: MoveError) -> ServerMessage {
    match err {
        MoveError::RoomNotReady => ServerMessage::GameNotReady,
        MoveError::GameOver => ServerMessage::GameAlreadyOver,
        MoveError::NotYourTurn => ServerMessage::NotYourTurn,
        MoveError::InvalidMove => ServerMessage::InvalidMove,
    }
}

fn request_reset(state: &AppState, tx: &UnboundedSender<ServerMessage>, room_code: &str) {
    let Some(room) = state.registry.get(room_code) else {
        let _ = tx.send(ServerMessage::RoomNotFound);
        return;
    };
    if room.request_reset().is_err() {
        debug!(room = %room_code, "reset ignored, no finished game");
    }
}

fn reconnect(
    state: &AppState,
    conn_id: Uuid,
    tx: &UnboundedSender<ServerMessage>,
    room_code: &str,
    session_code: &str,
) {
    let Some(room) = state.registry.get(room_code) else {
        let _ = tx.send(ServerMessage::RoomNotFound);
        return;
    };
    detach_previous_seat(state, conn_id, room_code);
    if room.reconnect(conn_id, tx, session_code) {
        state.registry.cancel_disconnect_drop(room_code, session_code);
        set_seat(state, conn_id, room_code, session_code);
    } else {
        debug!(room = %room_code, "reconnect for unknown session ignored");
    }
}

fn on_socket_closed(state: &AppState, conn_id: Uuid) {
    let (was_queued, seat) = {
        let Some(handle) = state.conns.get(&conn_id) else {
            return;
        };
        let mut session = handle.session.lock();
        (std::mem::take(&mut session.in_queue), session.seat.take())
    };
    if was_queued {
        state.queue.leave(conn_id);
    }
    if let Some(seat) = seat {
        debug!(%conn_id, room = %seat.room_code, session = %seat.session_code, "detaching closed socket");
        detach_conn_from_room(state, conn_id, &seat.room_code);
    }
}

/// A connection moving to another room is first detached from its old
/// seat through the ordinary disconnect path, keeping both directions of
/// the session mapping consistent.
fn detach_previous_seat(state: &AppState, conn_id: Uuid, joining: &str) {
    let previous = {
        let Some(handle) = state.conns.get(&conn_id) else {
            return;
        };
        let mut session = handle.session.lock();
        match &session.seat {
            Some(seat) if seat.room_code != joining => session.seat.take(),
            _ => None,
        }
    };
    if let Some(seat) = previous {
        detach_conn_from_room(state, conn_id, &seat.room_code);
    }
}

fn detach_conn_from_room(state: &AppState, conn_id: Uuid, room_code: &str) {
    let Some(room) = state.registry.get(room_code) else {
        return;
    };
    match room.handle_socket_closed(conn_id) {
        ClosedRole::Player { session_code } => {
            RoomRegistry::schedule_disconnect_drop(&state.registry, room_code, &session_code);
        }
        ClosedRole::Spectator { room_empty, .. } => {
            if room_empty {
                state.registry.destroy(room_code);
            }
        }
        ClosedRole::Unknown => {}
    }
}

fn is_in_queue(state: &AppState, conn_id: Uuid) -> bool {
    state
        .conns
        .get(&conn_id)
        .map(|handle| handle.session.lock().in_queue)
        .unwrap_or(false)
}

fn set_in_queue(state: &AppState, conn_id: Uuid, in_queue: bool) {
    if let Some(handle) = state.conns.get(&conn_id) {
        handle.session.lock().in_queue = in_queue;
    }
}

fn set_seat(state: &AppState, conn_id: Uuid, room_code: &str, session_code: &str) {
    if let Some(handle) = state.conns.get(&conn_id) {
        handle.session.lock().seat = Some(Seat {
            room_code: room_code.to_string(),
            session_code: session_code.to_string(),
        });
    }
}

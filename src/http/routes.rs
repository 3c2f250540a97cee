//! HTTP surface and the shared service state behind it.
//!
//! `AppState` owns every process-wide collection (room registry,
//! matchmaking queue, connection table) with an explicit start/stop
//! lifecycle; handlers and the WebSocket gateway borrow it through axum
//! state.

use std::sync::Arc;

use axum::{extract::State, Json};
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config;
use crate::queue::MatchmakingQueue;
use crate::room::registry::RoomRegistry;
use crate::ws::connection::ConnHandle;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub queue: Arc<MatchmakingQueue>,
    /// connection id -> outbound channel + logical session of that socket.
    pub conns: Arc<DashMap<Uuid, ConnHandle>>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build the service and start its background work (the idle-room
    /// sweep). Must run inside the runtime.
    pub fn start() -> Self {
        let state = Self {
            registry: Arc::new(RoomRegistry::new(config::disconnect_grace())),
            queue: Arc::new(MatchmakingQueue::new(config::queue_capacity())),
            conns: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        };
        state.spawn_sweeper();
        state
    }

    fn spawn_sweeper(&self) {
        let registry = Arc::clone(&self.registry);
        let token = self.shutdown.clone();
        let interval = config::room_sweep_interval();
        let max_age = config::room_max_idle();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = registry.sweep_idle(max_age);
                        if removed > 0 {
                            info!(removed, "swept idle rooms");
                        }
                    }
                }
            }
        });
    }

    /// Stop background work: the sweeper exits and pending disconnect
    /// windows are aborted.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.shutdown();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_code: String,
}

/// `POST /create-room`: register an empty room and hand back its code.
pub async fn create_room(State(state): State<AppState>) -> Json<CreateRoomResponse> {
    let (room_code, _room) = state.registry.create_room();
    Json(CreateRoomResponse { room_code })
}

pub async fn healthz() -> &'static str {
    "ok"
}

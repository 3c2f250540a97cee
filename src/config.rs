//! Configuration utilities (ports, timeouts, env vars)

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Maximum number of players waiting in the matchmaking queue.
pub fn queue_capacity() -> usize {
    env_u64("QUEUE_CAPACITY", 100) as usize
}

/// How long a disconnected player keeps their seat before being dropped.
pub fn disconnect_grace() -> Duration {
    Duration::from_secs(env_u64("DISCONNECT_GRACE_SECS", 60))
}

/// Interval between idle-room sweeps.
pub fn room_sweep_interval() -> Duration {
    Duration::from_secs(env_u64("ROOM_SWEEP_SECS", 300))
}

/// Age past which an empty room (no players, no spectators, no sockets)
/// is reclaimed by the sweep.
pub fn room_max_idle() -> Duration {
    Duration::from_secs(env_u64("ROOM_MAX_IDLE_SECS", 3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // Unset env vars fall back to the documented defaults.
        assert_eq!(queue_capacity(), 100);
        assert_eq!(disconnect_grace(), Duration::from_secs(60));
        assert_eq!(room_max_idle(), Duration::from_secs(3600));
    }
}

//! ID utilities (room codes, session codes).

use rand::Rng;

const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const SESSION_CODE_LEN: usize = 13;
const SESSION_CODE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a short human-shareable room code (6 uppercase alphanumerics).
///
/// Uniqueness is the registry's job; callers retry on collision.
pub fn new_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .collect()
}

/// Generate an opaque per-seat session code. Clients persist it and present
/// it on reconnect, so it acts as a bearer capability scoped to one room.
pub fn new_session_code() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_CODE_LEN)
        .map(|_| SESSION_CODE_CHARSET[rng.gen_range(0..SESSION_CODE_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_format() {
        for _ in 0..100 {
            let code = new_room_code();
            assert_eq!(code.len(), 6);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn session_code_format() {
        for _ in 0..100 {
            let code = new_session_code();
            assert_eq!(code.len(), 13);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn codes_are_not_trivially_repeating() {
        let a = new_session_code();
        let b = new_session_code();
        assert_ne!(a, b);
    }
}

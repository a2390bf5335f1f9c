//! Lexicographically sortable, time-prefixed id generation.
//!
//! Grounded in the teacher's digest-prefixed id convention, adapted to a
//! ULID-like shape (`{millis_base32}{random_base32}`) so snapshots
//! created earlier always sort before later ones (spec §5 ordering
//! guarantee) without adding a `ulid` dependency the teacher doesn't
//! carry.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

const CROCKFORD_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

fn base32_encode(mut value: u128, width: usize) -> String {
    let mut chars = vec![b'0'; width];
    for slot in chars.iter_mut().rev() {
        let idx = (value % 32) as usize;
        *slot = CROCKFORD_ALPHABET[idx];
        value /= 32;
    }
    String::from_utf8(chars).expect("crockford alphabet is ascii")
}

/// A new sortable id: 10 base32 chars of millisecond epoch time followed
/// by 16 base32 chars of randomness.
pub fn new_sortable_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis();
    let random = Uuid::new_v4().as_u128();
    format!("{}{}", base32_encode(millis, 10), base32_encode(random, 16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_fixed_width() {
        let id = new_sortable_id();
        assert_eq!(id.len(), 26);
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let a = new_sortable_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_sortable_id();
        assert!(a < b);
    }
}

//! Identifier generation.
//!
//! Signal, zone, and correlation identifiers are generated the same way the
//! host project generates `OrderId`s: a thread-local monotonic counter
//! combined with the current timestamp and a random salt, avoiding a hard
//! dependency on `uuid` for what only needs to be unique and sortable
//! within one process's lifetime.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

thread_local! {
    static COUNTER: Cell<u32> = const { Cell::new(0) };
}

/// Generates a 128-bit identifier unique within this process: high 64 bits
/// are the current unix epoch millis, low 32 bits are a thread-local
/// monotonic counter, and the remaining 32 bits are random salt to keep IDs
/// from different threads from colliding on the same millisecond/counter
/// pair.
pub fn generate_id() -> u128 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let counter = COUNTER.with(|c| {
        let next = c.get().wrapping_add(1);
        c.set(next);
        next
    });

    let salt: u32 = rand::random();

    ((millis as u128) << 64) | ((counter as u128) << 32) | salt as u128
}

/// Formats a generated id as a short hex string, for log lines and outbound
/// event payloads.
pub fn format_id(id: u128) -> String {
    format!("{id:032x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn format_id_is_fixed_width_hex() {
        let id = generate_id();
        assert_eq!(format_id(id).len(), 32);
    }
}

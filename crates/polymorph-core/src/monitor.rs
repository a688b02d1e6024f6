//! Key table monitoring.
//!
//! A snapshot of where each key stands in the rotation, safe to log or show:
//! keys are identified by fingerprint only. Both ends of an in-sync session
//! report identical snapshots.

use polymorph_crypto::{FINGERPRINT_SIZE, KeyTable};

/// Where a key stands relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// Seals or opens the next message.
    Current,
    /// Already used at least once.
    Used,
    /// Not used yet.
    Available,
}

/// One row of a key table snapshot.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyStatus {
    /// Position in the table.
    pub index: u32,
    /// Rotation state.
    pub state: KeyState,
    /// Truncated SHA-256 of the key.
    pub fingerprint: [u8; FINGERPRINT_SIZE],
}

impl std::fmt::Debug for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "K{} {:?} {}", self.index, self.state, hex(&self.fingerprint))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Snapshot `table` with the cursor at `key_index`.
///
/// Once the table has wrapped every key has been used, so only the current
/// one is reported differently.
pub(crate) fn snapshot(table: &KeyTable, key_index: u32, wrapped: bool) -> Vec<KeyStatus> {
    (0..table.len())
        .filter_map(|index| {
            let state = if index == key_index {
                KeyState::Current
            } else if wrapped || index < key_index {
                KeyState::Used
            } else {
                KeyState::Available
            };
            table.fingerprint(index).map(|fingerprint| KeyStatus { index, state, fingerprint })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use polymorph_crypto::generate_key_table;

    use super::*;

    fn states(snapshot: &[KeyStatus]) -> Vec<KeyState> {
        snapshot.iter().map(|s| s.state).collect()
    }

    #[test]
    fn fresh_table_has_one_current_key() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();

        let snapshot = snapshot(&table, 0, false);

        assert_eq!(
            states(&snapshot),
            [KeyState::Current, KeyState::Available, KeyState::Available, KeyState::Available]
        );
        assert_eq!(snapshot[0].fingerprint, table.fingerprint(0).unwrap());
    }

    #[test]
    fn keys_behind_the_cursor_are_used() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();

        let snapshot = snapshot(&table, 2, false);

        assert_eq!(
            states(&snapshot),
            [KeyState::Used, KeyState::Used, KeyState::Current, KeyState::Available]
        );
    }

    #[test]
    fn wrapped_table_has_no_available_keys() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();

        let snapshot = snapshot(&table, 1, true);

        assert_eq!(
            states(&snapshot),
            [KeyState::Used, KeyState::Current, KeyState::Used, KeyState::Used]
        );
    }

    #[test]
    fn debug_shows_fingerprint_not_key() {
        let table = generate_key_table(101, 103, 42, 4).unwrap();

        let debug = format!("{:?}", snapshot(&table, 0, false)[0]);

        assert_eq!(debug, "K0 Current 2831228f");
    }
}

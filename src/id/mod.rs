//! UUIDv7 generation and the `uuid_v7_time` inverse.
//!
//! UUIDv7 embeds a 48-bit millisecond Unix timestamp in its first 6 bytes,
//! which is what gives data file names (`<uuidv7>.parquet`) their
//! time-ordering property (spec invariant I5/I7).

use uuid::Uuid;

/// Generate a new time-ordered UUIDv7.
pub fn new_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Extract the embedded millisecond Unix timestamp from a UUIDv7.
///
/// Returns `None` if `id` is not a v7 UUID (no timestamp to extract).
pub fn uuid_v7_time_ms(id: Uuid) -> Option<i64> {
    let ts = id.get_timestamp()?;
    let (secs, nanos) = ts.to_unix();
    Some(secs as i64 * 1000 + (nanos / 1_000_000) as i64)
}

/// Render a UUID in canonical 8-4-4-4-12 lowercase hex, per spec row
/// marshalling rules (§4.3).
pub fn to_canonical_string(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_embedded_timestamp() {
        let before = now_ms();
        let id = new_uuid_v7();
        let after = now_ms();

        let extracted = uuid_v7_time_ms(id).expect("v7 uuid has a timestamp");
        assert!(extracted >= before - 1 && extracted <= after + 1);
    }

    #[test]
    fn canonical_string_has_five_groups() {
        let id = new_uuid_v7();
        let s = to_canonical_string(id);
        assert_eq!(s.matches('-').count(), 4);
        assert_eq!(s.len(), 36);
    }

    #[test]
    fn v4_uuid_has_no_v7_timestamp_claim() {
        // A v7 uuid always carries a timestamp; this just documents the
        // Option in the API rather than asserting on foreign UUIDs, since
        // `Uuid::get_timestamp()` depends on the version bits regardless of
        // how the UUID was constructed.
        let id = new_uuid_v7();
        assert!(uuid_v7_time_ms(id).is_some());
    }
}

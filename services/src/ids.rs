//! Opaque identifiers used across the pipeline.

use uuid::Uuid;

/// Fresh unique id for a review unit (one per hunk, per session).
pub fn new_unit_id() -> String {
    Uuid::new_v4().to_string()
}

/// Short trace id threaded through events and log files for correlation.
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_ids_are_unique() {
        assert_ne!(new_unit_id(), new_unit_id());
    }

    #[test]
    fn trace_id_is_short_hex() {
        let id = new_trace_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

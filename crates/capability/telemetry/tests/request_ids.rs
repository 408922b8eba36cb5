use ems_telemetry::new_request_ids;
use std::collections::HashSet;

#[test]
fn request_ids_are_unique_per_request() {
    let mut seen = HashSet::new();
    for _ in 0..32 {
        let ids = new_request_ids();
        assert!(!ids.request_id.is_empty());
        assert_ne!(ids.request_id, ids.trace_id);
        assert!(seen.insert(ids.request_id));
    }
}

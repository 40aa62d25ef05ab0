use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;

use session_profiler::history::SessionRequestEvent;

/// Strategy for HTTP methods in mixed case
pub fn method_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("GET".to_string()),
        Just("get".to_string()),
        Just("Post".to_string()),
        Just("PUT".to_string()),
        Just("delete".to_string()),
    ]
}

/// Strategy for request paths drawn from a small pool so rules actually match
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/".to_string()),
        Just("/login".to_string()),
        Just("login".to_string()),
        Just("/cart".to_string()),
        Just("/search".to_string()),
        Just(String::new()),
    ]
}

/// Strategy for arbitrary raw paths, with or without a leading slash
pub fn raw_path_strategy() -> impl Strategy<Value = String> {
    "/?[a-z0-9/_-]{0,24}"
}

/// Strategy for a chronologically ordered session history
pub fn events_strategy(max_len: usize) -> impl Strategy<Value = Vec<SessionRequestEvent>> {
    prop::collection::vec((method_strategy(), path_strategy()), 0..max_len).prop_map(|pairs| {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        pairs
            .into_iter()
            .enumerate()
            .map(|(i, (method, path))| {
                SessionRequestEvent::new(method, &path, start + ChronoDuration::seconds(i as i64))
            })
            .collect()
    })
}

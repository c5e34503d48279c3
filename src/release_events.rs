//! Next upcoming official release from the events feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::freshness::parse_timestamp;
use crate::ingest::types::ReleaseEventsPayload;

/// The chosen event: its original fields plus countdown and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextRelease {
    pub release_at_utc: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub countdown_seconds: i64,
    pub status: String,
}

/// Earliest event with a parseable `release_at_utc` at or after `now`.
pub fn next_release(payload: &ReleaseEventsPayload, now: DateTime<Utc>) -> Option<NextRelease> {
    payload
        .events
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|event| {
            let raw = event.get("release_at_utc")?.as_str()?;
            let at = parse_timestamp(raw)?;
            (at >= now).then_some((at, raw, event))
        })
        .min_by_key(|(at, _, _)| *at)
        .map(|(at, raw, event)| {
            let mut extra = event.clone();
            extra.remove("release_at_utc");
            extra.remove("countdown_seconds");
            extra.remove("status");
            NextRelease {
                release_at_utc: raw.to_string(),
                extra,
                countdown_seconds: (at - now).num_seconds().max(0),
                status: "upcoming".to_string(),
            }
        })
}

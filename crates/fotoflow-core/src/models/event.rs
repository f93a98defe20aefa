use serde::{Deserialize, Serialize};

use super::media::MediaKind;

/// The sole contract between work producers (intake, mark-ready, stalled
/// sweep) and the processing worker.
///
/// Delivery is at-least-once; the queue does not deduplicate. The worker
/// tolerates re-delivery by writing derivatives under a fresh generation
/// prefix and letting the last writer win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingEvent {
    pub media_id: i64,
    pub source_key: String,
    pub kind: MediaKind,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_through_json() {
        let event = ProcessingEvent {
            media_id: 42,
            source_key: "7/abcd.mp4".into(),
            kind: MediaKind::Video,
            content_type: "video/mp4".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "video");
        let back: ProcessingEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

//! S3 operation event feed
//!
//! Gateway nodes emit one JSON object per line describing each S3 request
//! they served:
//!
//! ```text
//! {"timestamp":"2026-08-25T10:00:00Z","operation":"PUT","bucket":"media","key":"a.jpg","status":200,"size":1024,"node":"filer1"}
//! ```
//!
//! `key`, `size` and `node` are optional; a line without a `node` is
//! attributed to the configured source label. Parsed events land in a
//! fixed-capacity ring buffer that evicts oldest-first, so the feed always
//! holds the most recent operations.

pub mod collector;

pub use collector::{EventCollector, LineSource, TcpLineSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ============================================================================
// Wire Format
// ============================================================================

/// Errors that can occur while parsing an event line
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    /// Line is not a valid JSON event record
    #[error("Invalid event record: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is present but empty
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// S3 operation kind
///
/// Operations outside the modeled set collapse to `Other` rather than
/// failing the whole line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum S3Operation {
    Get,
    Put,
    Delete,
    Head,
    List,
    Other,
}

impl S3Operation {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => S3Operation::Get,
            "PUT" => S3Operation::Put,
            "DELETE" => S3Operation::Delete,
            "HEAD" => S3Operation::Head,
            "LIST" => S3Operation::List,
            _ => S3Operation::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            S3Operation::Get => "GET",
            S3Operation::Put => "PUT",
            S3Operation::Delete => "DELETE",
            S3Operation::Head => "HEAD",
            S3Operation::List => "LIST",
            S3Operation::Other => "OTHER",
        }
    }
}

/// One S3 request as observed by a gateway node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3OperationEvent {
    /// When the gateway served the request
    pub timestamp: DateTime<Utc>,
    /// Request kind
    pub operation: S3Operation,
    /// Target bucket
    pub bucket: String,
    /// Object key, absent for bucket-level operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// HTTP status the gateway returned
    pub status: u16,
    /// Payload size in bytes, when the gateway reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Node that served the request
    pub node: String,
}

/// Raw line shape before normalization
#[derive(Debug, Deserialize)]
struct RawAccessRecord {
    timestamp: DateTime<Utc>,
    operation: String,
    bucket: String,
    #[serde(default)]
    key: Option<String>,
    status: u16,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    node: Option<String>,
}

/// Parse one wire line into an event
///
/// Lines missing a `node` attribute are credited to `source_label`.
pub fn parse_line(line: &str, source_label: &str) -> Result<S3OperationEvent, EventParseError> {
    let raw: RawAccessRecord = serde_json::from_str(line)?;

    if raw.bucket.is_empty() {
        return Err(EventParseError::MissingField("bucket"));
    }

    Ok(S3OperationEvent {
        timestamp: raw.timestamp,
        operation: S3Operation::parse(&raw.operation),
        bucket: raw.bucket,
        key: raw.key,
        status: raw.status,
        size: raw.size,
        node: raw.node.unwrap_or_else(|| source_label.to_string()),
    })
}

// ============================================================================
// Ring Buffer
// ============================================================================

/// Fixed-capacity FIFO buffer of recent events
///
/// When full, pushing evicts the oldest event. Events are kept in arrival
/// order, which is also how queries return them.
#[derive(Debug)]
pub struct EventBuffer {
    buffer: VecDeque<S3OperationEvent>,
    capacity: usize,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` events.
    ///
    /// A zero capacity would let `push` exceed its bound; configuration
    /// validation rejects it before a buffer is ever built.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "event buffer capacity must be at least 1");
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: S3OperationEvent) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    /// Events with a timestamp strictly after the cutoff, in arrival order
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<S3OperationEvent> {
        self.buffer
            .iter()
            .filter(|event| event.timestamp > cutoff)
            .cloned()
            .collect()
    }

    /// All buffered events in arrival order
    pub fn snapshot(&self) -> Vec<S3OperationEvent> {
        self.buffer.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 0).unwrap()
    }

    fn sample_event(seq: i64) -> S3OperationEvent {
        S3OperationEvent {
            timestamp: base_time() + chrono::Duration::seconds(seq),
            operation: S3Operation::Put,
            bucket: "media".to_string(),
            key: Some(format!("object-{}", seq)),
            status: 200,
            size: Some(seq as u64),
            node: "s3".to_string(),
        }
    }

    #[test]
    fn test_parse_full_line() {
        let line = r#"{"timestamp":"2026-08-25T10:00:00Z","operation":"PUT","bucket":"media","key":"a.jpg","status":200,"size":1024,"node":"filer1"}"#;
        let event = parse_line(line, "s3").unwrap();

        assert_eq!(event.operation, S3Operation::Put);
        assert_eq!(event.bucket, "media");
        assert_eq!(event.key.as_deref(), Some("a.jpg"));
        assert_eq!(event.status, 200);
        assert_eq!(event.size, Some(1024));
        assert_eq!(event.node, "filer1");
    }

    #[test]
    fn test_parse_minimal_line_uses_source_label() {
        let line = r#"{"timestamp":"2026-08-25T10:00:00Z","operation":"LIST","bucket":"media","status":200}"#;
        let event = parse_line(line, "s3").unwrap();

        assert_eq!(event.operation, S3Operation::List);
        assert!(event.key.is_none());
        assert!(event.size.is_none());
        assert_eq!(event.node, "s3");
    }

    #[test]
    fn test_parse_unknown_operation_collapses_to_other() {
        let line = r#"{"timestamp":"2026-08-25T10:00:00Z","operation":"COPY","bucket":"media","status":200}"#;
        let event = parse_line(line, "s3").unwrap();
        assert_eq!(event.operation, S3Operation::Other);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_line("not json at all", "s3"),
            Err(EventParseError::Json(_))
        ));
        // Valid JSON, wrong shape
        assert!(matches!(
            parse_line("[1,2,3]", "s3"),
            Err(EventParseError::Json(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_bucket() {
        let line = r#"{"timestamp":"2026-08-25T10:00:00Z","operation":"GET","bucket":"","status":200}"#;
        assert!(matches!(
            parse_line(line, "s3"),
            Err(EventParseError::MissingField("bucket"))
        ));
    }

    #[test]
    fn test_operation_parse_is_case_insensitive() {
        assert_eq!(S3Operation::parse("get"), S3Operation::Get);
        assert_eq!(S3Operation::parse("Delete"), S3Operation::Delete);
        assert_eq!(S3Operation::parse("HEAD"), S3Operation::Head);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_buffer_rejects_zero_capacity() {
        let _ = EventBuffer::new(0);
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buffer = EventBuffer::new(3);
        for seq in 0..5 {
            buffer.push(sample_event(seq));
        }

        assert_eq!(buffer.len(), 3);
        let contents = buffer.snapshot();
        assert_eq!(contents[0].size, Some(2));
        assert_eq!(contents[2].size, Some(4));
    }

    #[test]
    fn test_since_is_strictly_greater() {
        let mut buffer = EventBuffer::new(10);
        for seq in 0..5 {
            buffer.push(sample_event(seq));
        }

        // Cutoff equal to an event's timestamp excludes that event
        let cutoff = base_time() + chrono::Duration::seconds(2);
        let after = buffer.since(cutoff);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].size, Some(3));
        assert_eq!(after[1].size, Some(4));
    }

    #[test]
    fn test_since_preserves_arrival_order() {
        let mut buffer = EventBuffer::new(10);
        // Arrival order deliberately differs from timestamp order
        buffer.push(sample_event(3));
        buffer.push(sample_event(1));
        buffer.push(sample_event(2));

        let all = buffer.since(base_time());
        let sizes: Vec<_> = all.iter().map(|e| e.size.unwrap()).collect();
        assert_eq!(sizes, vec![3, 1, 2]);
    }

    proptest! {
        #[test]
        fn test_buffer_holds_most_recent(capacity in 1usize..32, count in 0usize..100) {
            let mut buffer = EventBuffer::new(capacity);
            for seq in 0..count {
                buffer.push(sample_event(seq as i64));
            }

            prop_assert!(buffer.len() <= capacity);

            let expected_start = count.saturating_sub(capacity);
            let contents = buffer.snapshot();
            prop_assert_eq!(contents.len(), count - expected_start);
            for (offset, event) in contents.iter().enumerate() {
                prop_assert_eq!(event.size, Some((expected_start + offset) as u64));
            }
        }
    }
}

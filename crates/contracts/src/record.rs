//! Record types flowing from the broker to the handler

use bytes::Bytes;
use std::fmt;

use crate::TopicName;

/// A partition of a topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: TopicName,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<TopicName>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Offset to commit for a partition
///
/// `offset` is the next offset to consume (last processed + 1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitOffset {
    pub partition: TopicPartition,
    pub offset: i64,
}

impl CommitOffset {
    /// Commit position after processing the record at `processed`
    pub fn after(partition: TopicPartition, processed: i64) -> Self {
        Self {
            partition,
            offset: processed + 1,
        }
    }
}

/// A single record header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Option<Bytes>,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

/// Record as delivered by the broker, before deserialization
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub topic: TopicName,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub payload: Option<Bytes>,
    /// Milliseconds since epoch
    pub timestamp: Option<i64>,
    pub headers: Vec<RecordHeader>,
}

impl RawRecord {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition {
            topic: self.topic.clone(),
            partition: self.partition,
        }
    }

    /// Header values whose key matches `name` case-insensitively
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers
            .iter()
            .filter(move |h| h.key.eq_ignore_ascii_case(name))
            .filter_map(|h| h.value.as_deref())
    }
}

/// Deserialized record handed to a [`MessageHandler`](crate::MessageHandler)
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRecord<K, V> {
    pub topic: TopicName,
    pub partition: i32,
    pub offset: i64,
    pub key: K,
    pub value: V,
    pub timestamp: Option<i64>,
    pub headers: Vec<RecordHeader>,
}

impl<K, V> ConsumerRecord<K, V> {
    /// Combine the metadata of `raw` with already deserialized key and value
    pub fn from_raw(raw: &RawRecord, key: K, value: V) -> Self {
        Self {
            topic: raw.topic.clone(),
            partition: raw.partition,
            offset: raw.offset,
            key,
            value,
            timestamp: raw.timestamp,
            headers: raw.headers.clone(),
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition {
            topic: self.topic.clone(),
            partition: self.partition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_offset_is_next_position() {
        let commit = CommitOffset::after(TopicPartition::new("orders", 0), 41);
        assert_eq!(commit.offset, 42);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let raw = RawRecord {
            topic: "orders".into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: None,
            timestamp: None,
            headers: vec![
                RecordHeader::new("Tenant-Id", "t1"),
                RecordHeader::new("trace", "x"),
                RecordHeader::new("tenant-id", "t2"),
            ],
        };
        let values: Vec<&[u8]> = raw.header_values("TENANT-ID").collect();
        assert_eq!(values, vec![b"t1".as_slice(), b"t2".as_slice()]);
    }

    #[test]
    fn test_topic_partition_display() {
        assert_eq!(TopicPartition::new("orders", 2).to_string(), "orders-2");
    }
}

//! 内存 Broker
//!
//! 用于单元测试和本地运行的 Kafka 替身：topic/partition 日志、consumer group
//! 分区分配与 rebalance、offset 提交，支持注入失败场景。

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use contracts::{
    BrokerConsumer, CommitMode, CommitOffset, ConsumerConfig, ConsumerFactory, ContractError,
    RawRecord, RecordHeader, TopicDescription, TopicMetadata, TopicName, TopicPartition,
};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// 失败注入配置
#[derive(Debug, Default, Clone)]
pub struct MemoryBrokerConfig {
    /// poll 返回 broker 错误
    pub fail_poll: bool,
    /// commit 返回 broker 错误
    pub fail_commit: bool,
    /// describe_topic 返回 broker 错误
    pub fail_describe: bool,
    /// create_consumer 返回 broker 错误
    pub fail_create: bool,
}

/// 一次 offset 提交记录（用于测试断言）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub group_id: String,
    pub client_id: String,
    pub offset: CommitOffset,
    pub mode: CommitMode,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<Bytes>,
    payload: Option<Bytes>,
    timestamp: i64,
    headers: Vec<RecordHeader>,
}

#[derive(Debug)]
struct TopicLog {
    partitions: Vec<Vec<StoredRecord>>,
    replication_factor: u32,
    config_entries: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct GroupState {
    generation: u64,
    /// member id -> 订阅的 topics
    members: BTreeMap<u64, Vec<TopicName>>,
    /// member id -> 分配到的 partitions
    assignment: HashMap<u64, Vec<TopicPartition>>,
    committed: HashMap<TopicPartition, i64>,
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: BTreeMap<TopicName, TopicLog>,
    groups: HashMap<String, GroupState>,
    commit_log: Vec<CommitEntry>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    config: Mutex<MemoryBrokerConfig>,
    /// 新消息写入或 rebalance 时唤醒等待中的 poll
    notify: Notify,
    next_member: AtomicU64,
    describe_calls: AtomicUsize,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn config(&self) -> MemoryBrokerConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 内存 Broker
///
/// Clone 之后共享同一份状态，可以同时作为 `ConsumerFactory` 和 `TopicMetadata` 使用。
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// 创建空 broker
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用失败注入配置创建 broker
    pub fn with_config(config: MemoryBrokerConfig) -> Self {
        let broker = Self::new();
        broker.set_config(config);
        broker
    }

    /// 运行时替换失败注入配置
    pub fn set_config(&self, config: MemoryBrokerConfig) {
        *self
            .shared
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// 创建 topic（replication factor 为 1，无额外配置）
    pub fn create_topic(&self, name: &str, partitions: u32) {
        self.create_topic_with(
            name,
            TopicDescription {
                partition_count: partitions,
                replication_factor: 1,
                config_entries: BTreeMap::new(),
            },
        );
    }

    /// 按给定描述创建 topic，已存在时不做任何修改
    pub fn create_topic_with(&self, name: &str, description: TopicDescription) {
        let topic = TopicName::from(name);
        let mut guard = self.shared.lock_state();
        let state = &mut *guard;
        if state.topics.contains_key(&topic) {
            return;
        }
        state.topics.insert(
            topic.clone(),
            TopicLog {
                partitions: vec![Vec::new(); description.partition_count as usize],
                replication_factor: description.replication_factor,
                config_entries: description.config_entries,
            },
        );
        for group in state.groups.values_mut() {
            if group.members.values().any(|topics| topics.contains(&topic)) {
                rebalance(group, &state.topics);
            }
        }
        drop(guard);
        self.shared.notify.notify_waiters();
    }

    /// 向 partition 追加一条消息，返回其 offset
    pub fn produce(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        payload: Option<Bytes>,
    ) -> Result<i64, ContractError> {
        self.produce_with_headers(topic, partition, key, payload, Vec::new())
    }

    /// 只带 value 的便捷写入
    pub fn send(
        &self,
        topic: &str,
        partition: i32,
        value: impl Into<Bytes>,
    ) -> Result<i64, ContractError> {
        self.produce(topic, partition, None, Some(value.into()))
    }

    pub fn produce_with_headers(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Bytes>,
        payload: Option<Bytes>,
        headers: Vec<RecordHeader>,
    ) -> Result<i64, ContractError> {
        let offset = {
            let mut state = self.shared.lock_state();
            let log = state
                .topics
                .get_mut(topic)
                .and_then(|t| usize::try_from(partition).ok().and_then(|p| t.partitions.get_mut(p)))
                .ok_or_else(|| {
                    ContractError::broker("produce", format!("unknown partition {topic}-{partition}"))
                })?;
            log.push(StoredRecord {
                key,
                payload,
                timestamp: now_millis(),
                headers,
            });
            (log.len() - 1) as i64
        };
        self.shared.notify.notify_waiters();
        Ok(offset)
    }

    /// group 在 partition 上已提交的 offset
    pub fn committed(&self, group_id: &str, partition: &TopicPartition) -> Option<i64> {
        self.shared
            .lock_state()
            .groups
            .get(group_id)
            .and_then(|g| g.committed.get(partition).copied())
    }

    /// 所有显式提交（按时间顺序）
    pub fn commit_log(&self) -> Vec<CommitEntry> {
        self.shared.lock_state().commit_log.clone()
    }

    /// `describe_topic` 被调用的次数
    pub fn describe_calls(&self) -> usize {
        self.shared.describe_calls.load(Ordering::SeqCst)
    }

    /// group 当前成员数
    pub fn group_members(&self, group_id: &str) -> usize {
        self.shared
            .lock_state()
            .groups
            .get(group_id)
            .map_or(0, |g| g.members.len())
    }

    /// partition 的下一个写入 offset
    pub fn end_offset(&self, partition: &TopicPartition) -> Option<i64> {
        let state = self.shared.lock_state();
        let topic = state.topics.get(&partition.topic)?;
        let log = topic.partitions.get(usize::try_from(partition.partition).ok()?)?;
        Some(log.len() as i64)
    }
}

impl TopicMetadata for MemoryBroker {
    #[instrument(name = "memory_broker_describe_topic", skip(self))]
    async fn describe_topic(&self, topic: &str) -> Result<Option<TopicDescription>, ContractError> {
        self.shared.describe_calls.fetch_add(1, Ordering::SeqCst);
        if self.shared.config().fail_describe {
            return Err(ContractError::broker("describe_topic", "injected metadata failure"));
        }
        let state = self.shared.lock_state();
        Ok(state.topics.get(topic).map(|log| TopicDescription {
            partition_count: log.partitions.len() as u32,
            replication_factor: log.replication_factor,
            config_entries: log.config_entries.clone(),
        }))
    }
}

impl ConsumerFactory for MemoryBroker {
    type Consumer = MemoryConsumer;

    fn create_consumer(
        &self,
        config: &ConsumerConfig,
        client_id: &str,
    ) -> Result<MemoryConsumer, ContractError> {
        if self.shared.config().fail_create {
            return Err(ContractError::broker("create_consumer", "injected create failure"));
        }
        let reset_latest = config
            .properties
            .get("auto.offset.reset")
            .is_some_and(|v| v == "latest");
        Ok(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            member_id: self.shared.next_member.fetch_add(1, Ordering::SeqCst),
            group_id: config.group_id.clone(),
            client_id: client_id.to_string(),
            auto_commit: config.commit_strategy.uses_auto_commit(),
            reset_latest,
            subscribed: false,
            generation: 0,
            assigned: Vec::new(),
            positions: HashMap::new(),
            stored: HashMap::new(),
            next_start: 0,
        })
    }
}

/// 内存 consumer 会话
///
/// 未提交的 offset 在 close / rebalance 后丢失，新的会话从已提交位置重新消费。
/// 未设置 `auto.offset.reset = latest` 时从最早的消息开始。
#[derive(Debug)]
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    member_id: u64,
    group_id: String,
    client_id: String,
    auto_commit: bool,
    reset_latest: bool,
    subscribed: bool,
    /// 最近一次同步的 group generation
    generation: u64,
    assigned: Vec<TopicPartition>,
    positions: HashMap<TopicPartition, i64>,
    /// 已处理完成、等待 auto-commit 的位置
    stored: HashMap<TopicPartition, i64>,
    /// 轮转 fetch 起点，避免单个 partition 独占 batch
    next_start: usize,
}

impl MemoryConsumer {
    fn sync_assignment(&mut self, state: &BrokerState) {
        let Some(group) = state.groups.get(&self.group_id) else {
            return;
        };
        if group.generation == self.generation {
            return;
        }
        let assigned = group
            .assignment
            .get(&self.member_id)
            .cloned()
            .unwrap_or_default();
        self.positions.retain(|tp, _| assigned.contains(tp));
        self.stored.retain(|tp, _| assigned.contains(tp));
        for tp in &assigned {
            if self.positions.contains_key(tp) {
                continue;
            }
            let start = match group.committed.get(tp) {
                Some(offset) => *offset,
                None if self.reset_latest => log_end(state, tp),
                None => 0,
            };
            self.positions.insert(tp.clone(), start);
        }
        debug!(
            client_id = %self.client_id,
            generation = group.generation,
            partitions = assigned.len(),
            "assignment updated"
        );
        self.assigned = assigned;
        self.generation = group.generation;
    }

    /// auto-commit：提交 `store_offsets` 记录的位置，而不是 fetch 位置
    fn commit_stored(&mut self, state: &mut BrokerState) {
        let Some(group) = state.groups.get_mut(&self.group_id) else {
            return;
        };
        for (tp, position) in self.stored.drain() {
            group.committed.insert(tp, position);
        }
    }

    fn fetch(&mut self, state: &BrokerState, max_records: usize) -> Vec<RawRecord> {
        let mut records = Vec::new();
        let count = self.assigned.len();
        for i in 0..count {
            if records.len() >= max_records {
                break;
            }
            let tp = &self.assigned[(self.next_start + i) % count];
            let Some(position) = self.positions.get_mut(tp) else {
                continue;
            };
            let Some(log) = state
                .topics
                .get(&tp.topic)
                .and_then(|t| t.partitions.get(tp.partition as usize))
            else {
                continue;
            };
            while records.len() < max_records {
                let Some(stored) = log.get(*position as usize) else {
                    break;
                };
                records.push(RawRecord {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    offset: *position,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                    timestamp: Some(stored.timestamp),
                    headers: stored.headers.clone(),
                });
                *position += 1;
            }
        }
        if count > 0 {
            self.next_start = (self.next_start + 1) % count;
        }
        records
    }

    fn leave_group(&mut self) {
        if !self.subscribed {
            return;
        }
        self.subscribed = false;
        let shared = Arc::clone(&self.shared);
        {
            let mut guard = shared.lock_state();
            let state = &mut *guard;
            if self.auto_commit {
                self.commit_stored(state);
            }
            if let Some(group) = state.groups.get_mut(&self.group_id) {
                group.members.remove(&self.member_id);
                rebalance(group, &state.topics);
            }
        }
        self.assigned.clear();
        self.positions.clear();
        self.stored.clear();
        shared.notify.notify_waiters();
    }
}

impl BrokerConsumer for MemoryConsumer {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    #[instrument(name = "memory_consumer_subscribe", skip(self, topics), fields(client_id = %self.client_id))]
    async fn subscribe(&mut self, topics: &[TopicName]) -> Result<(), ContractError> {
        let shared = Arc::clone(&self.shared);
        {
            let mut guard = shared.lock_state();
            let state = &mut *guard;
            let group = state.groups.entry(self.group_id.clone()).or_default();
            group.members.insert(self.member_id, topics.to_vec());
            rebalance(group, &state.topics);
        }
        self.subscribed = true;
        shared.notify.notify_waiters();
        Ok(())
    }

    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<RawRecord>, ContractError> {
        if !self.subscribed {
            return Err(ContractError::broker("poll", "consumer is not subscribed"));
        }
        let deadline = Instant::now() + timeout;
        let shared = Arc::clone(&self.shared);
        loop {
            let notified = shared.notify.notified();
            if shared.config().fail_poll {
                return Err(ContractError::broker("poll", "injected poll failure"));
            }
            let records = {
                let mut guard = shared.lock_state();
                self.sync_assignment(&guard);
                if self.auto_commit {
                    self.commit_stored(&mut guard);
                }
                self.fetch(&guard, max_records)
            };
            if !records.is_empty() {
                return Ok(records);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(records);
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    #[instrument(
        name = "memory_consumer_commit",
        skip(self, offsets),
        fields(client_id = %self.client_id, count = offsets.len())
    )]
    async fn commit(
        &mut self,
        offsets: &[CommitOffset],
        mode: CommitMode,
    ) -> Result<(), ContractError> {
        if self.shared.config().fail_commit {
            return Err(ContractError::broker("commit", "injected commit failure"));
        }
        let mut guard = self.shared.lock_state();
        let state = &mut *guard;
        let group = state
            .groups
            .get_mut(&self.group_id)
            .filter(|g| g.members.contains_key(&self.member_id))
            .ok_or_else(|| {
                ContractError::broker("commit", format!("'{}' is not a group member", self.client_id))
            })?;
        for offset in offsets {
            group
                .committed
                .insert(offset.partition.clone(), offset.offset);
            state.commit_log.push(CommitEntry {
                group_id: self.group_id.clone(),
                client_id: self.client_id.clone(),
                offset: offset.clone(),
                mode,
            });
        }
        Ok(())
    }

    fn store_offsets(&mut self, offsets: &[CommitOffset]) -> Result<(), ContractError> {
        for offset in offsets {
            if !self.assigned.contains(&offset.partition) {
                return Err(ContractError::broker(
                    "store_offsets",
                    format!("{} is not assigned to '{}'", offset.partition, self.client_id),
                ));
            }
            self.stored.insert(offset.partition.clone(), offset.offset);
        }
        Ok(())
    }

    fn assigned_partitions(&self) -> Vec<TopicPartition> {
        self.assigned.clone()
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.leave_group();
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        // 被强制中止的 worker 不会调用 close
        self.leave_group();
    }
}

/// 按 member id 顺序轮询分配每个 topic 的 partitions
fn rebalance(group: &mut GroupState, topics: &BTreeMap<TopicName, TopicLog>) {
    group.generation += 1;
    group.assignment.clear();
    let subscribed: BTreeSet<TopicName> = group.members.values().flatten().cloned().collect();
    for topic in subscribed {
        let Some(log) = topics.get(&topic) else {
            continue;
        };
        let members: Vec<u64> = group
            .members
            .iter()
            .filter(|(_, topics)| topics.contains(&topic))
            .map(|(id, _)| *id)
            .collect();
        for partition in 0..log.partitions.len() {
            let member = members[partition % members.len()];
            group
                .assignment
                .entry(member)
                .or_default()
                .push(TopicPartition::new(topic.clone(), partition as i32));
        }
    }
}

fn log_end(state: &BrokerState, tp: &TopicPartition) -> i64 {
    state
        .topics
        .get(&tp.topic)
        .and_then(|t| t.partitions.get(tp.partition as usize))
        .map_or(0, |log| log.len() as i64)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CommitStrategy;

    fn consumer_config(group: &str) -> ConsumerConfig {
        ConsumerConfig::new(group).with_commit_strategy(CommitStrategy::SyncAfterBatch)
    }

    async fn subscribed(broker: &MemoryBroker, group: &str, topic: &str) -> MemoryConsumer {
        let mut consumer = broker
            .create_consumer(&consumer_config(group), "test-0")
            .unwrap();
        consumer.subscribe(&[TopicName::from(topic)]).await.unwrap();
        consumer
    }

    #[tokio::test]
    async fn test_poll_returns_records_in_offset_order() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        for value in ["a", "b", "c"] {
            broker.send("orders", 0, value).unwrap();
        }

        let mut consumer = subscribed(&broker, "g", "orders").await;
        let records = consumer.poll(Duration::from_millis(50), 10).await.unwrap();

        let offsets: Vec<i64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert_eq!(records[1].payload.as_deref(), Some(&b"b"[..]));
    }

    #[tokio::test]
    async fn test_poll_respects_max_records() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        for i in 0..5 {
            broker.send("orders", 0, format!("v{i}")).unwrap();
        }

        let mut consumer = subscribed(&broker, "g", "orders").await;
        let first = consumer.poll(Duration::from_millis(50), 2).await.unwrap();
        let second = consumer.poll(Duration::from_millis(50), 10).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].offset, 2);
    }

    #[tokio::test]
    async fn test_poll_times_out_with_empty_batch() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let mut consumer = subscribed(&broker, "g", "orders").await;
        let records = consumer.poll(Duration::from_millis(20), 10).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_poll_wakes_on_produce() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        let mut consumer = subscribed(&broker, "g", "orders").await;

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.send("orders", 0, "late").unwrap();
        });

        let records = consumer.poll(Duration::from_secs(5), 10).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_resumes_from_committed_offset() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        for value in ["a", "b", "c"] {
            broker.send("orders", 0, value).unwrap();
        }

        let mut consumer = subscribed(&broker, "g", "orders").await;
        consumer.poll(Duration::from_millis(50), 10).await.unwrap();
        consumer
            .commit(
                &[CommitOffset::after(TopicPartition::new("orders", 0), 0)],
                CommitMode::Sync,
            )
            .await
            .unwrap();
        consumer.close().await.unwrap();

        let mut restarted = subscribed(&broker, "g", "orders").await;
        let records = restarted.poll(Duration::from_millis(50), 10).await.unwrap();
        let offsets: Vec<i64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![1, 2]);
        assert_eq!(broker.committed("g", &TopicPartition::new("orders", 0)), Some(1));
    }

    #[tokio::test]
    async fn test_group_members_split_partitions() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 4);

        let mut first = subscribed(&broker, "g", "orders").await;
        let mut second = subscribed(&broker, "g", "orders").await;
        first.poll(Duration::from_millis(1), 1).await.unwrap();
        second.poll(Duration::from_millis(1), 1).await.unwrap();

        assert_eq!(first.assigned_partitions().len(), 2);
        assert_eq!(second.assigned_partitions().len(), 2);
        assert_eq!(broker.group_members("g"), 2);

        drop(second);
        first.poll(Duration::from_millis(1), 1).await.unwrap();
        assert_eq!(first.assigned_partitions().len(), 4);
        assert_eq!(broker.group_members("g"), 1);
    }

    #[tokio::test]
    async fn test_auto_commit_on_poll_and_close() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        broker.send("orders", 0, "a").unwrap();
        let tp = TopicPartition::new("orders", 0);

        let config = ConsumerConfig::new("g").with_commit_strategy(CommitStrategy::Auto);
        let mut consumer = broker.create_consumer(&config, "auto-0").unwrap();
        consumer.subscribe(&[TopicName::from("orders")]).await.unwrap();
        let records = consumer.poll(Duration::from_millis(10), 10).await.unwrap();
        consumer
            .store_offsets(&[CommitOffset::after(tp.clone(), records[0].offset)])
            .unwrap();
        consumer.close().await.unwrap();

        assert_eq!(broker.committed("g", &tp), Some(1));
        assert!(broker.commit_log().is_empty());
    }

    #[tokio::test]
    async fn test_auto_commit_ignores_unstored_records() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        for value in ["a", "bad", "c"] {
            broker.send("orders", 0, value).unwrap();
        }
        let tp = TopicPartition::new("orders", 0);

        let config = ConsumerConfig::new("g").with_commit_strategy(CommitStrategy::Auto);
        let mut consumer = broker.create_consumer(&config, "auto-0").unwrap();
        consumer.subscribe(&[TopicName::from("orders")]).await.unwrap();
        let records = consumer.poll(Duration::from_millis(10), 10).await.unwrap();
        assert_eq!(records.len(), 3);
        // only "a" was resolved
        consumer
            .store_offsets(&[CommitOffset::after(tp.clone(), 0)])
            .unwrap();
        consumer.poll(Duration::from_millis(10), 10).await.unwrap();
        consumer.close().await.unwrap();

        assert_eq!(broker.committed("g", &tp), Some(1));

        let mut restarted = broker.create_consumer(&config, "auto-1").unwrap();
        restarted.subscribe(&[TopicName::from("orders")]).await.unwrap();
        let redelivered = restarted.poll(Duration::from_millis(10), 10).await.unwrap();
        let offsets: Vec<i64> = redelivered.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_store_offsets_rejects_unassigned_partition() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);

        let config = ConsumerConfig::new("g").with_commit_strategy(CommitStrategy::Auto);
        let mut consumer = broker.create_consumer(&config, "auto-0").unwrap();
        let err = consumer
            .store_offsets(&[CommitOffset::after(TopicPartition::new("orders", 0), 0)])
            .unwrap_err();
        assert!(err.to_string().contains("store_offsets"));
    }

    #[tokio::test]
    async fn test_latest_reset_skips_existing_records() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        broker.send("orders", 0, "old").unwrap();

        let config = consumer_config("g").with_property("auto.offset.reset", "latest");
        let mut consumer = broker.create_consumer(&config, "latest-0").unwrap();
        consumer.subscribe(&[TopicName::from("orders")]).await.unwrap();
        assert!(consumer.poll(Duration::from_millis(10), 10).await.unwrap().is_empty());

        broker.send("orders", 0, "new").unwrap();
        let records = consumer.poll(Duration::from_millis(50), 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let broker = MemoryBroker::with_config(MemoryBrokerConfig {
            fail_poll: true,
            fail_describe: true,
            ..Default::default()
        });
        broker.create_topic("orders", 1);

        let mut consumer = subscribed(&broker, "g", "orders").await;
        let err = consumer.poll(Duration::from_millis(10), 10).await.unwrap_err();
        assert!(err.is_broker_error());

        let err = broker.describe_topic("orders").await.unwrap_err();
        assert!(err.is_broker_error());
        assert_eq!(broker.describe_calls(), 1);
    }

    #[tokio::test]
    async fn test_describe_topic() {
        let broker = MemoryBroker::new();
        broker.create_topic_with(
            "orders",
            TopicDescription {
                partition_count: 3,
                replication_factor: 2,
                config_entries: BTreeMap::from([("cleanup.policy".into(), "compact".into())]),
            },
        );

        let found = broker.describe_topic("orders").await.unwrap().unwrap();
        assert_eq!(found.partition_count, 3);
        assert_eq!(found.replication_factor, 2);
        assert!(broker.describe_topic("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_produce_to_unknown_partition_fails() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);
        assert!(broker.send("orders", 5, "x").is_err());
        assert!(broker.send("missing", 0, "x").is_err());
    }
}

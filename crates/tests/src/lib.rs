//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置文件 -> registration -> dispatch engine 的完整链路
//! - 基于内存 broker 的 e2e 场景（无需 Kafka）

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use broker::MemoryBroker;
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        ConsumerRecord, Decision, DispatchContext, FailureKind, HandlerError, JsonDeserializer,
        KafkaSettings, LongDeserializer, Nullable, RawRecord, RecordFailure, RecordHeader,
        StringDeserializer, TopicPartition,
    };
    use dispatcher::{DispatchEngine, LifecycleState};
    use error_policies::{RetryErrorHandler, StopOnErrorHandler};
    use registration::Registration;
    use serde::Deserialize;

    const SETTINGS: &str = r#"
brokers = ["localhost:9092"]

[listeners.orders]
poll_timeout_ms = 20
instances = 1
shutdown_timeout_ms = 2000
metadata_fields = ["tenant"]

[listeners.shared]
poll_timeout_ms = 20
instances = 2
shutdown_timeout_ms = 2000

[consumers.billing]
group = "billing"
client_id = "billing"
commit_strategy = "sync_after_record"

[consumers.audit]
group = "audit"
client_id = "audit"
commit_strategy = "sync_after_batch"

[topics.orders]
name = "orders"
partitions = 3

[topics.orders.config]
"cleanup.policy" = "delete"

[topics.payments]
name = "payments"
partitions = 2
"#;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Order {
        id: u32,
        amount: i64,
    }

    fn settings() -> KafkaSettings {
        ConfigLoader::load_from_str(SETTINGS, ConfigFormat::Toml).unwrap()
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    /// End-to-end test: TOML -> named configs -> engine -> handler
    ///
    /// 验证完整的数据流：
    /// 1. 配置文件提供 listener / consumer / topic 条目
    /// 2. registration 按名字引用，并启用 topic 校验
    /// 3. handler 收到反序列化后的 record 和 metadata header
    #[tokio::test]
    async fn test_e2e_named_configuration_pipeline() {
        let settings = settings();
        let broker = MemoryBroker::new();
        broker.create_topic_with(
            "orders",
            contracts::TopicDescription {
                partition_count: 3,
                replication_factor: 1,
                config_entries: [("cleanup.policy".to_string(), "delete".to_string())].into(),
            },
        );
        for (partition, id) in [(0, 1), (1, 2), (2, 3), (0, 4)] {
            broker
                .produce_with_headers(
                    "orders",
                    partition,
                    Some(format!("k{id}").into()),
                    Some(format!(r#"{{"id": {id}, "amount": {}}}"#, id * 10).into()),
                    vec![RecordHeader::new("Tenant", format!("t{id}"))],
                )
                .unwrap();
        }

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let registration = Registration::<Option<String>, Order>::builder()
            .with_listener_config_name("orders")
            .for_topic_configs([settings.topic("orders").unwrap()])
            .check_topic_configuration()
            .with_consumer_config_name("billing")
            .with_key_deserializer(Nullable(StringDeserializer))
            .with_value_deserializer(JsonDeserializer::<Order>::new())
            .with_handler_fn(
                move |record: &ConsumerRecord<Option<String>, Order>, ctx: &DispatchContext| {
                    sink.lock().unwrap().push((
                        record.key.clone(),
                        record.value.clone(),
                        ctx.metadata_value("tenant").map(str::to_string),
                    ));
                    Ok(())
                },
            )
            .with_name("billing-orders")
            .build()
            .unwrap();

        let mut engine = DispatchEngine::new(broker.clone(), broker.clone()).with_settings(settings);
        engine.submit(registration).await.unwrap();
        assert_eq!(broker.describe_calls(), 1);

        eventually(|| received.lock().unwrap().len() == 4).await;
        let statuses = engine.shutdown().await;
        assert_eq!(statuses[0].state, LifecycleState::Stopped);

        let received = received.lock().unwrap();
        let first = received
            .iter()
            .find(|(key, _, _)| key.as_deref() == Some("k1"))
            .unwrap();
        assert_eq!(first.1, Order { id: 1, amount: 10 });
        assert_eq!(first.2.as_deref(), Some("t1"));

        assert_eq!(
            broker.committed("billing", &TopicPartition::new("orders", 0)),
            Some(2)
        );
        // sync_after_record: one commit per record
        assert_eq!(broker.commit_log().len(), 4);
        assert!(broker
            .commit_log()
            .iter()
            .all(|entry| entry.client_id == "billing-0"));
    }

    /// 配置文件期望 3 个 partition，实际只有 1 个
    #[tokio::test]
    async fn test_e2e_partition_mismatch_blocks_startup() {
        let settings = settings();
        let broker = MemoryBroker::new();
        broker.create_topic("orders", 1);

        let registration = Registration::<Option<String>, String>::builder()
            .with_listener_config_name("orders")
            .for_topic_configs([settings.topic("orders").unwrap()])
            .check_topic_configuration()
            .with_consumer_config_name("billing")
            .with_key_deserializer(Nullable(StringDeserializer))
            .with_value_deserializer(StringDeserializer)
            .with_handler_fn(|_: &ConsumerRecord<Option<String>, String>, _: &DispatchContext| {
                Ok(())
            })
            .build()
            .unwrap();

        let mut engine = DispatchEngine::new(broker.clone(), broker.clone()).with_settings(settings);
        let err = engine.submit(registration).await.unwrap_err();

        assert!(err.is_topic_mismatch());
        let message = err.to_string();
        for expected in ["orders", "expected 3", "actual 1", "cleanup.policy"] {
            assert!(message.contains(expected), "missing '{expected}' in {message}");
        }
        assert_eq!(broker.group_members("billing"), 0);
        assert_eq!(engine.status()[0].state, LifecycleState::Failed);
        assert!(engine.status()[0].workers.is_empty());
    }

    /// STOP 之后重新提交：只重投未提交的 record，成功恰好一次
    #[tokio::test]
    async fn test_e2e_stop_and_restart_with_batch_commits() {
        let broker = MemoryBroker::new();
        broker.create_topic("payments", 1);
        for value in [1i64, 2, 3, 4] {
            broker
                .send("payments", 0, value.to_be_bytes().to_vec())
                .unwrap();
        }

        let successes = Arc::new(Mutex::new(Vec::new()));
        let poisoned = Arc::new(Mutex::new(true));

        let build = |successes: &Arc<Mutex<Vec<i64>>>, poisoned: &Arc<Mutex<bool>>| {
            let successes = Arc::clone(successes);
            let poisoned = Arc::clone(poisoned);
            Registration::<Option<String>, i64>::builder()
                .with_listener_config_name("orders")
                .for_topic("payments")
                .with_consumer_config_name("audit")
                .with_key_deserializer(Nullable(StringDeserializer))
                .with_value_deserializer(LongDeserializer)
                .with_handler_fn(
                    move |record: &ConsumerRecord<Option<String>, i64>, _: &DispatchContext| {
                        if record.value == 3 && *poisoned.lock().unwrap() {
                            return Err(HandlerError::new("downstream unavailable"));
                        }
                        successes.lock().unwrap().push(record.value);
                        Ok(())
                    },
                )
                .with_error_handler(StopOnErrorHandler)
                .with_name("audit-payments")
                .build()
                .unwrap()
        };

        let mut engine =
            DispatchEngine::new(broker.clone(), broker.clone()).with_settings(settings());
        engine
            .submit(build(&successes, &poisoned))
            .await
            .unwrap()
            .wait_until_terminal()
            .await;

        assert_eq!(engine.status()[0].state, LifecycleState::Failed);
        // records before the failing one are committed
        assert_eq!(
            broker.committed("audit", &TopicPartition::new("payments", 0)),
            Some(2)
        );

        *poisoned.lock().unwrap() = false;
        engine.submit(build(&successes, &poisoned)).await.unwrap();
        eventually(|| successes.lock().unwrap().len() == 4).await;
        engine.shutdown().await;

        assert_eq!(*successes.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(
            broker.committed("audit", &TopicPartition::new("payments", 0)),
            Some(4)
        );
    }

    /// 反序列化失败不重试，直接交给 fallback 策略跳过
    #[tokio::test]
    async fn test_e2e_deserialization_failure_skipped_by_fallback() {
        let broker = MemoryBroker::new();
        broker.create_topic("payments", 1);
        broker.send("payments", 0, 7i64.to_be_bytes().to_vec()).unwrap();
        broker.send("payments", 0, &b"short"[..]).unwrap();
        broker.send("payments", 0, 9i64.to_be_bytes().to_vec()).unwrap();

        let values = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let observed = Arc::clone(&failures);

        let retry = RetryErrorHandler::new(3)
            .with_initial_interval(Duration::from_millis(5))
            .retry_handler_exceptions_only()
            .with_fallback(move |record: &RawRecord, failure: &RecordFailure| {
                observed
                    .lock()
                    .unwrap()
                    .push((record.offset, failure.kind));
                Decision::Continue
            });

        let registration = Registration::<Option<String>, i64>::builder()
            .with_listener_config_name("orders")
            .for_topic("payments")
            .with_consumer_config_name("audit")
            .with_key_deserializer(Nullable(StringDeserializer))
            .with_value_deserializer(LongDeserializer)
            .with_handler_fn(
                move |record: &ConsumerRecord<Option<String>, i64>, _: &DispatchContext| {
                    sink.lock().unwrap().push(record.value);
                    Ok(())
                },
            )
            .with_error_handler(retry)
            .build()
            .unwrap();

        let mut engine =
            DispatchEngine::new(broker.clone(), broker.clone()).with_settings(settings());
        engine.submit(registration).await.unwrap();
        eventually(|| values.lock().unwrap().len() == 2).await;
        let statuses = engine.shutdown().await;

        assert_eq!(*values.lock().unwrap(), vec![7, 9]);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(failures[0].1.is_deserialization());
        assert!(matches!(failures[0].1, FailureKind::DeserializationFailure(_)));
        assert_eq!(statuses[0].workers[0].metrics.retries, 0);
    }

    /// 两个 worker 共享同一个 consumer group
    #[tokio::test]
    async fn test_e2e_workers_share_consumer_group() {
        let broker = MemoryBroker::new();
        broker.create_topic("payments", 2);
        for i in 0..10i64 {
            broker
                .send("payments", (i % 2) as i32, i.to_be_bytes().to_vec())
                .unwrap();
        }

        let seen = Arc::new(Mutex::new(BTreeSet::new()));
        let sink = Arc::clone(&seen);
        let registration = Registration::<Option<String>, i64>::builder()
            .with_listener_config_name("shared")
            .for_topic("payments")
            .with_consumer_config_name("audit")
            .with_key_deserializer(Nullable(StringDeserializer))
            .with_value_deserializer(LongDeserializer)
            .with_handler_fn(
                move |record: &ConsumerRecord<Option<String>, i64>, ctx: &DispatchContext| {
                    assert_eq!(ctx.partition, record.partition);
                    sink.lock().unwrap().insert(record.value);
                    Ok(())
                },
            )
            .build()
            .unwrap();

        let mut engine =
            DispatchEngine::new(broker.clone(), broker.clone()).with_settings(settings());
        let handle = engine.submit(registration).await.unwrap();
        assert_eq!(handle.workers().len(), 2);
        for worker in handle.workers() {
            worker.wait_for_state(LifecycleState::Running).await;
        }
        assert_eq!(broker.group_members("audit"), 2);

        eventually(|| seen.lock().unwrap().len() == 10).await;
        let statuses = engine.shutdown().await;
        assert!(statuses[0]
            .workers
            .iter()
            .all(|w| w.state == LifecycleState::Stopped));
        assert_eq!(broker.group_members("audit"), 0);
        for partition in 0..2 {
            assert_eq!(
                broker.committed("audit", &TopicPartition::new("payments", partition)),
                Some(5)
            );
        }
    }
}

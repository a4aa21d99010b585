// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod common;

use amqp_listener::{
    delivery::AckMode,
    drain::{AmqpQueueInspector, DrainObserver, QueueInspector},
    errors::AmqpError,
    handlers::{LoggingCancelHandler, LoggingHandler},
    listener::RabbitMQListener,
};
use common::{configs, fresh_topology, publish, until_count};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a RabbitMQ broker on localhost:5672"]
async fn wait_for_drain_returns_after_the_message_is_consumed() {
    fresh_topology("drain-exchange", "drain-queue", "drain-key").await;
    let inspector = AmqpQueueInspector::new(configs());
    assert_eq!(inspector.message_count("drain-queue").await.unwrap(), 0);

    publish("drain-exchange", "drain-key", "aBody").await;
    assert_eq!(inspector.message_count("drain-queue").await.unwrap(), 1);

    let consumed = Arc::new(AtomicUsize::new(0));
    let counter = consumed.clone();
    let mut listener = RabbitMQListener::new(
        configs(),
        "drain-queue",
        Arc::new(LoggingHandler::new("drain", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })),
        Arc::new(LoggingCancelHandler),
        AckMode::Auto,
    );
    listener.start();

    DrainObserver::connect(configs())
        .wait_for_drain_within("drain-queue", Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(inspector.message_count("drain-queue").await.unwrap(), 0);
    assert!(until_count(&consumed, 1, Duration::from_secs(5)).await);
    listener.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a RabbitMQ broker on localhost:5672"]
async fn purge_discards_pending_messages() {
    fresh_topology("purge-exchange", "purge-queue", "purge-key").await;

    publish("purge-exchange", "purge-key", "one").await;
    publish("purge-exchange", "purge-key", "two").await;

    let observer = DrainObserver::connect(configs());
    observer.purge("purge-queue").await.unwrap();

    assert_eq!(
        AmqpQueueInspector::new(configs())
            .message_count("purge-queue")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a RabbitMQ broker on localhost:5672"]
async fn undrained_queue_times_out() {
    fresh_topology("stuck-exchange", "stuck-queue", "stuck-key").await;
    publish("stuck-exchange", "stuck-key", "nobody listens").await;

    let err = DrainObserver::connect(configs())
        .wait_for_drain_within("stuck-queue", Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(matches!(err, AmqpError::DrainTimeout(_)));
}

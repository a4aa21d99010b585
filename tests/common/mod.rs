// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

#![allow(dead_code)]

use amqp_listener::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::Configs,
    drain::DrainObserver,
    publisher::RabbitMQPublisher,
    topology::{declare, TopologyDescriptor},
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{sleep, Instant};

pub fn configs() -> Arc<Configs> {
    Arc::new(Configs::from_env().expect("invalid test configs"))
}

/// Declares `exchange/queue/key` and empties the queue.
pub async fn fresh_topology(exchange: &str, queue: &str, key: &str) -> TopologyDescriptor {
    let cfg = configs();
    let descriptor = TopologyDescriptor::new(exchange, queue, key);

    declare(&cfg, &descriptor).await.expect("declare failed");
    DrainObserver::connect(cfg)
        .purge(queue)
        .await
        .expect("purge failed");

    descriptor
}

pub async fn publish_all(exchange: &str, key: &str, bodies: &[String]) {
    let (conn, channel) = new_amqp_channel(&configs()).await.expect("connect failed");
    let publisher = RabbitMQPublisher::new(channel.clone());

    for body in bodies {
        publisher
            .publish(exchange, key, body.as_bytes())
            .await
            .expect("publish failed");
    }

    close_amqp_channel(&conn, &channel).await;
}

pub async fn publish(exchange: &str, key: &str, body: &str) {
    publish_all(exchange, key, &[body.to_owned()]).await;
}

pub fn bodies(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{}.{}", prefix, i)).collect()
}

/// Polls `counter` until it equals `expected` or `deadline` passes.
pub async fn until_count(counter: &AtomicUsize, expected: usize, deadline: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if counter.load(Ordering::SeqCst) == expected {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    counter.load(Ordering::SeqCst) == expected
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Drain Observation
//!
//! Test and operations helper that resets a queue or waits until it has no
//! pending messages. Waiting polls the broker's message count; it cannot tell
//! a drained queue from one that never received anything, so callers should
//! publish before waiting. [`DrainObserver::wait_for_drain`] has no deadline,
//! use [`DrainObserver::wait_for_drain_within`] in automated contexts.

use crate::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::Configs,
    errors::AmqpError,
};
use async_trait::async_trait;
use lapin::{
    options::{QueueDeclareOptions, QueuePurgeOptions},
    types::FieldTable,
};
#[cfg(test)]
use mockall::automock;
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};

/// Interval between two message count reads.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Broker queries the observer relies on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueInspector: Send + Sync {
    /// Number of messages ready for delivery in `queue`.
    async fn message_count(&self, queue: &str) -> Result<u32, AmqpError>;

    /// Drops every ready message of `queue`, returning how many were dropped.
    async fn purge(&self, queue: &str) -> Result<u32, AmqpError>;
}

/// Inspects queues through a short-lived connection per call.
pub struct AmqpQueueInspector {
    cfg: Arc<Configs>,
}

impl AmqpQueueInspector {
    pub fn new(cfg: Arc<Configs>) -> AmqpQueueInspector {
        AmqpQueueInspector { cfg }
    }
}

#[async_trait]
impl QueueInspector for AmqpQueueInspector {
    async fn message_count(&self, queue: &str) -> Result<u32, AmqpError> {
        let (conn, channel) = new_amqp_channel(&self.cfg).await?;

        let result = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map(|declared| declared.message_count())
            .map_err(|err| {
                error!(error = err.to_string(), queue, "failure to inspect queue");
                AmqpError::InspectQueueError(queue.to_owned())
            });

        close_amqp_channel(&conn, &channel).await;
        result
    }

    async fn purge(&self, queue: &str) -> Result<u32, AmqpError> {
        let (conn, channel) = new_amqp_channel(&self.cfg).await?;

        let result = channel
            .queue_purge(queue, QueuePurgeOptions { nowait: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), queue, "failure to purge queue");
                AmqpError::PurgeQueueError(queue.to_owned())
            });

        close_amqp_channel(&conn, &channel).await;
        result
    }
}

pub struct DrainObserver<I> {
    inspector: I,
}

impl DrainObserver<AmqpQueueInspector> {
    /// Observer talking to the broker described by `cfg`.
    pub fn connect(cfg: Arc<Configs>) -> DrainObserver<AmqpQueueInspector> {
        DrainObserver::new(AmqpQueueInspector::new(cfg))
    }
}

impl<I> DrainObserver<I>
where
    I: QueueInspector,
{
    pub fn new(inspector: I) -> DrainObserver<I> {
        DrainObserver { inspector }
    }

    /// Discards every ready message of `queue`.
    pub async fn purge(&self, queue: &str) -> Result<(), AmqpError> {
        let purged = self.inspector.purge(queue).await?;
        info!(queue, purged, "queue purged");
        Ok(())
    }

    /// Blocks until `queue` reports no ready message.
    ///
    /// Reads the count, sleeps [`DRAIN_POLL_INTERVAL`] and repeats while the
    /// count was positive, so it always sleeps at least once. Never returns
    /// if the queue never drains.
    pub async fn wait_for_drain(&self, queue: &str) -> Result<(), AmqpError> {
        loop {
            let count = self.inspector.message_count(queue).await?;
            debug!(queue, count, "waiting for consumers");

            sleep(DRAIN_POLL_INTERVAL).await;

            if count == 0 {
                return Ok(());
            }
        }
    }

    /// Like [`wait_for_drain`](Self::wait_for_drain) but gives up after
    /// `deadline` with [`AmqpError::DrainTimeout`].
    pub async fn wait_for_drain_within(
        &self,
        queue: &str,
        deadline: Duration,
    ) -> Result<(), AmqpError> {
        match timeout(deadline, self.wait_for_drain(queue)).await {
            Ok(result) => result,
            Err(_) => {
                error!(queue, ?deadline, "queue did not drain in time");
                Err(AmqpError::DrainTimeout(queue.to_owned()))
            }
        }
    }
}

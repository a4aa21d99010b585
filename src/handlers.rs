// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Ready-made handler variants, selected when the listener is built:
//!
//! - [`LoggingHandler`] for [`AckMode::Auto`](crate::delivery::AckMode::Auto)
//!   listeners: logs and runs the processing function, never touches the channel.
//! - [`ManualAckHandler`] for [`AckMode::Manual`](crate::delivery::AckMode::Manual)
//!   listeners: runs the processing function and acks the delivery once it
//!   succeeds.
//! - [`LoggingCancelHandler`] logs broker-side consumer cancellation.

use crate::{
    delivery::{CancelHandler, DeliveryChannel, DeliveryContext, DeliveryHandler},
    errors::AmqpError,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct LoggingHandler<F> {
    name: String,
    process: F,
}

impl<F> LoggingHandler<F>
where
    F: Fn(&DeliveryContext) -> Result<(), AmqpError> + Send + Sync,
{
    pub fn new(name: &str, process: F) -> LoggingHandler<F> {
        LoggingHandler {
            name: name.to_owned(),
            process,
        }
    }
}

#[async_trait]
impl<F> DeliveryHandler for LoggingHandler<F>
where
    F: Fn(&DeliveryContext) -> Result<(), AmqpError> + Send + Sync,
{
    async fn bind_channel(&self, _channel: Arc<dyn DeliveryChannel>) {}

    async fn on_delivery(
        &self,
        ctx: &DeliveryContext,
        _token: &CancellationToken,
    ) -> Result<(), AmqpError> {
        info!(
            handler = self.name,
            delivery_tag = ctx.delivery_tag,
            "handling '{}'",
            ctx.body_lossy()
        );

        (self.process)(ctx)
    }
}

/// Acknowledges each delivery on its bound channel after `process` succeeds.
///
/// A failing `process` leaves the delivery unacknowledged: the broker holds
/// it in flight and only redelivers it once the channel closes. The handler
/// does not reject it nor close the channel.
pub struct ManualAckHandler<F> {
    name: String,
    process: F,
    channel: RwLock<Option<Arc<dyn DeliveryChannel>>>,
}

impl<F> ManualAckHandler<F>
where
    F: Fn(&DeliveryContext) -> Result<(), AmqpError> + Send + Sync,
{
    pub fn new(name: &str, process: F) -> ManualAckHandler<F> {
        ManualAckHandler {
            name: name.to_owned(),
            process,
            channel: RwLock::new(None),
        }
    }
}

#[async_trait]
impl<F> DeliveryHandler for ManualAckHandler<F>
where
    F: Fn(&DeliveryContext) -> Result<(), AmqpError> + Send + Sync,
{
    async fn bind_channel(&self, channel: Arc<dyn DeliveryChannel>) {
        *self.channel.write().await = Some(channel);
    }

    async fn on_delivery(
        &self,
        ctx: &DeliveryContext,
        _token: &CancellationToken,
    ) -> Result<(), AmqpError> {
        info!(
            handler = self.name,
            delivery_tag = ctx.delivery_tag,
            "manually handling '{}'",
            ctx.body_lossy()
        );

        (self.process)(ctx)?;

        let guard = self.channel.read().await;
        let Some(channel) = guard.as_ref() else {
            return Err(AmqpError::HandlerError(format!(
                "no channel bound to handler `{}`",
                self.name
            )));
        };

        channel.ack(ctx.delivery_tag).await
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCancelHandler;

impl CancelHandler for LoggingCancelHandler {
    fn on_cancel(&self, consumer_tag: &str) {
        warn!(consumer_tag, "consumer was cancelled by the broker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MockDeliveryChannel;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delivery(tag: u64) -> DeliveryContext {
        DeliveryContext {
            consumer_tag: "test-consumer".into(),
            delivery_tag: tag,
            exchange: "test-exchange".into(),
            routing_key: "test-key".into(),
            redelivered: false,
            body: b"aBody".to_vec(),
        }
    }

    #[tokio::test]
    async fn logging_handler_runs_process_without_channel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = LoggingHandler::new("single.1", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let mut channel = MockDeliveryChannel::new();
        channel.expect_ack().times(0);
        handler.bind_channel(Arc::new(channel)).await;

        handler
            .on_delivery(&delivery(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn logging_handler_surfaces_process_failure() {
        let handler =
            LoggingHandler::new("failing", |_| Err(AmqpError::HandlerError("boom".into())));

        let err = handler
            .on_delivery(&delivery(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, AmqpError::HandlerError("boom".into()));
    }

    #[tokio::test]
    async fn manual_handler_acks_the_exact_delivery_tag() {
        let handler = ManualAckHandler::new("many.1", |_| Ok(()));

        let mut channel = MockDeliveryChannel::new();
        channel
            .expect_ack()
            .with(eq(42))
            .times(1)
            .returning(|_| Ok(()));
        handler.bind_channel(Arc::new(channel)).await;

        handler
            .on_delivery(&delivery(42), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn manual_handler_leaves_failed_delivery_unacknowledged() {
        let handler =
            ManualAckHandler::new("failing", |_| Err(AmqpError::HandlerError("boom".into())));

        let mut channel = MockDeliveryChannel::new();
        channel.expect_ack().times(0);
        channel.expect_reject().times(0);
        handler.bind_channel(Arc::new(channel)).await;

        let result = handler
            .on_delivery(&delivery(7), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AmqpError::HandlerError(_))));
    }

    #[tokio::test]
    async fn manual_handler_without_channel_fails() {
        let handler = ManualAckHandler::new("unbound", |_| Ok(()));

        let result = handler
            .on_delivery(&delivery(1), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AmqpError::HandlerError(_))));
    }

    #[tokio::test]
    async fn manual_handler_reports_ack_failure() {
        let handler = ManualAckHandler::new("many.2", |_| Ok(()));

        let mut channel = MockDeliveryChannel::new();
        channel
            .expect_ack()
            .returning(|tag| Err(AmqpError::AckMessageError(tag)));
        handler.bind_channel(Arc::new(channel)).await;

        let result = handler
            .on_delivery(&delivery(3), &CancellationToken::new())
            .await;

        assert_eq!(result, Err(AmqpError::AckMessageError(3)));
    }

    #[tokio::test]
    async fn rebinding_replaces_the_channel() {
        let handler = ManualAckHandler::new("rebound", |_| Ok(()));

        let mut stale = MockDeliveryChannel::new();
        stale.expect_ack().times(0);
        handler.bind_channel(Arc::new(stale)).await;

        let mut fresh = MockDeliveryChannel::new();
        fresh.expect_ack().times(1).returning(|_| Ok(()));
        handler.bind_channel(Arc::new(fresh)).await;

        handler
            .on_delivery(&delivery(1), &CancellationToken::new())
            .await
            .unwrap();
    }
}

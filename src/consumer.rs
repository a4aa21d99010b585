// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Dispatch
//!
//! Turns one broker delivery into a [`DeliveryContext`], runs the handler
//! under a consumer span and logs the outcome. The acknowledgment mode only
//! changes how a failure is reported: under auto-ack the message is already
//! gone from the broker, under manual-ack it stays in flight until the
//! channel closes.

use crate::{
    delivery::{AckMode, DeliveryContext, DeliveryHandler},
    errors::AmqpError,
    otel,
};
use lapin::message::Delivery;
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub(crate) fn delivery_context(consumer_tag: &str, delivery: &Delivery) -> DeliveryContext {
    DeliveryContext {
        consumer_tag: consumer_tag.to_owned(),
        delivery_tag: delivery.delivery_tag,
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        redelivered: delivery.redelivered,
        body: delivery.data.clone(),
    }
}

/// Runs the handler for one delivery.
///
/// # Returns
/// The handler's result; failures are already logged with the message
/// identity when this returns.
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    delivery: &Delivery,
    consumer_tag: &str,
    mode: AckMode,
    handler: &dyn DeliveryHandler,
    token: &CancellationToken,
) -> Result<(), AmqpError> {
    let (_ctx, mut span) = otel::new_span(&delivery.properties, tracer, consumer_tag);
    let ctx = delivery_context(consumer_tag, delivery);

    debug!(
        consumer_tag,
        delivery_tag = ctx.delivery_tag,
        redelivered = ctx.redelivered,
        "received from exchange: {}",
        ctx.exchange
    );

    match handler.on_delivery(&ctx, token).await {
        Ok(()) => {
            span.set_status(Status::Ok);
            Ok(())
        }
        Err(err) => {
            report_failure(mode, &ctx, &err);
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
            Err(err)
        }
    }
}

fn report_failure(mode: AckMode, ctx: &DeliveryContext, err: &AmqpError) {
    match mode {
        AckMode::Auto => error!(
            error = err.to_string(),
            consumer_tag = ctx.consumer_tag,
            delivery_tag = ctx.delivery_tag,
            routing_key = ctx.routing_key,
            body = ctx.body_lossy(),
            "handler failed on an auto-acked message, the message is lost"
        ),
        AckMode::Manual => warn!(
            error = err.to_string(),
            consumer_tag = ctx.consumer_tag,
            delivery_tag = ctx.delivery_tag,
            routing_key = ctx.routing_key,
            "handler failed, the message stays unacknowledged until the channel closes"
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::delivery::MockDeliveryHandler;
    use opentelemetry::global;

    pub(crate) fn delivery(tag: u64, body: &[u8], redelivered: bool) -> Delivery {
        Delivery {
            delivery_tag: tag,
            exchange: "test-exchange".into(),
            routing_key: "test-key".into(),
            redelivered,
            properties: Default::default(),
            data: body.to_vec(),
            acker: Default::default(),
        }
    }

    #[test]
    fn context_carries_the_message_identity() {
        let ctx = delivery_context("test-consumer", &delivery(7, b"aBody", true));

        assert_eq!(
            ctx,
            DeliveryContext {
                consumer_tag: "test-consumer".to_owned(),
                delivery_tag: 7,
                exchange: "test-exchange".to_owned(),
                routing_key: "test-key".to_owned(),
                redelivered: true,
                body: b"aBody".to_vec(),
            }
        );
    }

    #[tokio::test]
    async fn handler_receives_the_delivery() {
        let mut handler = MockDeliveryHandler::new();
        handler
            .expect_on_delivery()
            .withf(|ctx, token| {
                ctx.delivery_tag == 3 && ctx.body == b"aBody" && !token.is_cancelled()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let result = consume(
            &global::tracer("test"),
            &delivery(3, b"aBody", false),
            "test-consumer",
            AckMode::Auto,
            &handler,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn handler_failure_is_returned_in_both_modes() {
        for mode in [AckMode::Auto, AckMode::Manual] {
            let mut handler = MockDeliveryHandler::new();
            handler
                .expect_on_delivery()
                .times(1)
                .returning(|_, _| Err(AmqpError::HandlerError("boom".to_owned())));

            let result = consume(
                &global::tracer("test"),
                &delivery(4, b"aBody", false),
                "test-consumer",
                mode,
                &handler,
                &CancellationToken::new(),
            )
            .await;

            assert_eq!(result, Err(AmqpError::HandlerError("boom".to_owned())));
        }
    }
}

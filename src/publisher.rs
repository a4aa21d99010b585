// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Sends opaque byte payloads to an `(exchange, routing key)` pair. Producers
//! serialize their own messages; the publisher only adds a message id,
//! persistent delivery mode and the current trace context.

use crate::{errors::AmqpError, otel::HeaderInjector};
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::{global, Context};
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;
use uuid::Uuid;

/// Delivery mode flag for messages the broker should write to disk.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

pub struct RabbitMQPublisher {
    channel: Arc<Channel>,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `channel` - A channel to the RabbitMQ server
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(channel: Arc<Channel>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { channel })
    }

    /// Publishes `body` to `exchange` under `routing_key`, propagating the
    /// current OpenTelemetry context in the headers.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), AmqpError> {
        self.publish_with_context(&Context::current(), exchange, routing_key, body)
            .await
    }

    pub async fn publish_with_context(
        &self,
        ctx: &Context,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), AmqpError> {
        let mut btree = BTreeMap::<ShortString, AMQPValue>::default();

        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(ctx, &mut HeaderInjector::new(&mut btree))
        });

        match self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                body,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
                    .with_headers(FieldTable::from(btree)),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    exchange, routing_key, "error publishing message"
                );
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Contract
//!
//! The traits a message handler implements to be driven by a
//! [`RabbitMQListener`](crate::listener::RabbitMQListener):
//!
//! - [`DeliveryHandler`] receives the channel once per consumer registration
//!   and every message delivered on it, one at a time.
//! - [`CancelHandler`] is told when the broker cancels the consumer out of band.
//! - [`DeliveryChannel`] is the slice of the channel a handler may use: ack or
//!   reject the delivery it was handed.
//!
//! Under [`AckMode::Auto`] the broker considers a message acknowledged as
//! soon as it is sent, so a handler failure loses it. Under
//! [`AckMode::Manual`] the handler must ack or reject before returning; a
//! message left unacknowledged is only redelivered once the channel closes.

use crate::errors::AmqpError;
use async_trait::async_trait;
use lapin::{
    options::{BasicAckOptions, BasicRejectOptions},
    Channel,
};
#[cfg(test)]
use mockall::automock;
use std::{fmt, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Acknowledgment semantics of one listener, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// The broker acknowledges on send: at-most-once.
    #[default]
    Auto,
    /// The handler acknowledges after processing: at-least-once.
    Manual,
}

impl AckMode {
    /// Value of the `no_ack` flag of `basic.consume`.
    pub fn no_ack(&self) -> bool {
        matches!(self, AckMode::Auto)
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMode::Auto => write!(f, "auto"),
            AckMode::Manual => write!(f, "manual"),
        }
    }
}

/// One delivered message.
///
/// `delivery_tag` is only meaningful on the channel that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContext {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub body: Vec<u8>,
}

impl DeliveryContext {
    /// Body as text, replacing invalid UTF-8.
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Acknowledgment operations available to a handler on its bound channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Positively acknowledges exactly the given delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError>;

    /// Rejects exactly the given delivery, optionally requeuing it.
    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;
}

#[async_trait]
impl DeliveryChannel for Channel {
    async fn ack(&self, delivery_tag: u64) -> Result<(), AmqpError> {
        self.basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), delivery_tag, "error whiling ack msg");
                AmqpError::AckMessageError(delivery_tag)
            })
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), delivery_tag, "error whiling reject msg");
                AmqpError::RejectMessageError(delivery_tag)
            })
    }
}

/// Message handler driven by a listener.
///
/// `on_delivery` runs on the listener's task and blocks further deliveries on
/// that channel until it returns. Handlers owned by different listeners run
/// concurrently. `token` is cancelled when the listener is stopped; the
/// listener never interrupts a running call, so long handlers should check it
/// at safe points.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Called once per consumer registration, before any delivery, with the
    /// channel the following deliveries arrive on. The channel must not be
    /// used outside the deliveries it carries.
    async fn bind_channel(&self, channel: Arc<dyn DeliveryChannel>);

    /// Processes one delivery.
    async fn on_delivery(
        &self,
        ctx: &DeliveryContext,
        token: &CancellationToken,
    ) -> Result<(), AmqpError>;
}

/// Notified when the broker cancels a consumer, for instance because its
/// queue was deleted. The listener re-registers on its next iteration.
#[cfg_attr(test, automock)]
pub trait CancelHandler: Send + Sync {
    fn on_cancel(&self, consumer_tag: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_sets_no_ack() {
        assert!(AckMode::Auto.no_ack());
        assert!(!AckMode::Manual.no_ack());
        assert_eq!(AckMode::default(), AckMode::Auto);
    }

    #[test]
    fn displays_mode() {
        assert_eq!(AckMode::Auto.to_string(), "auto");
        assert_eq!(AckMode::Manual.to_string(), "manual");
    }

    #[test]
    fn body_lossy_replaces_invalid_bytes() {
        let ctx = DeliveryContext {
            consumer_tag: "tag".into(),
            delivery_tag: 1,
            exchange: "test-exchange".into(),
            routing_key: "test-key".into(),
            redelivered: false,
            body: vec![b'a', 0xff, b'b'],
        };

        assert_eq!(ctx.body_lossy(), "a\u{fffd}b");
    }
}

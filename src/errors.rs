// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Listener Subsystem
//!
//! `AmqpError` covers every failure the topology configurator, the consumer
//! loop, the drain observer and the producer side can report. Variants are
//! grouped in three classes: topology errors (broker rejected a declare,
//! bind, purge or inspection), connection errors (transient broker
//! unavailability, recovered by the consumer loop itself) and handler errors
//! (a delivery handler failed to process a message).

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error purging the given queue
    #[error("failure to purge queue `{0}`")]
    PurgeQueueError(String),

    /// Error reading the pending message count of the given queue
    #[error("failure to inspect queue `{0}`")]
    InspectQueueError(String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    BindingConsumerError(String),

    /// Error raised by the consumer stream while consuming
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// A delivery handler failed to process a message
    #[error("handler failure: {0}")]
    HandlerError(String),

    /// Error acknowledging the delivery with the given tag
    #[error("failure to ack message `{0}`")]
    AckMessageError(u64),

    /// Error rejecting the delivery with the given tag
    #[error("failure to reject message `{0}`")]
    RejectMessageError(u64),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// The queue still held messages when the caller's deadline passed
    #[error("queue `{0}` did not drain in time")]
    DrainTimeout(String),

    /// Configuration could not be loaded
    #[error("invalid configs: {0}")]
    InvalidConfigs(String),
}

impl AmqpError {
    /// Whether the broker rejected a topology operation (declare, bind, purge
    /// or inspection). These are fatal at startup.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            AmqpError::DeclareExchangeError(_)
                | AmqpError::DeclareQueueError(_)
                | AmqpError::BindingExchangeToQueueError(_, _)
                | AmqpError::PurgeQueueError(_)
                | AmqpError::InspectQueueError(_)
        )
    }

    /// Whether the error is a transient connection failure the consumer loop
    /// recovers from by reconnecting.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            AmqpError::ConnectionError(_)
                | AmqpError::ChannelError(_)
                | AmqpError::BindingConsumerError(_)
                | AmqpError::ConsumerError(_)
        )
    }
}

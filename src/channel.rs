// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation and teardown of AMQP connections and
//! channels. Every consumer loop iteration, topology declaration and drain
//! inspection opens its own pair and closes it when done; pairs are never
//! shared between listeners.

use crate::{configs::Configs, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Reply code sent to the broker on a normal close.
pub const AMQP_REPLY_SUCCESS: u16 = 200;

/// Creates a new AMQP connection and a channel on it.
///
/// # Parameters
/// * `cfg` - Configuration with the broker host, port, credentials and vhost
///
/// # Returns
/// * `Result<(Arc<Connection>, Arc<Channel>), AmqpError>` -
///   A tuple containing the connection and channel on success, or an error on failure.
pub async fn new_amqp_channel(cfg: &Configs) -> Result<(Arc<Connection>, Arc<Channel>), AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app.name.clone()));

    let conn = match Connection::connect(&cfg.rabbitmq.uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), host = cfg.rabbitmq.host, "failure to connect");
            Err(AmqpError::ConnectionError(err.to_string()))
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError(err.to_string()))
        }
    }
}

/// Closes the channel, then its connection.
///
/// Closing releases every delivery still unacknowledged on the channel back
/// to the queue. Failures are only logged: the pair is unusable either way.
pub async fn close_amqp_channel(conn: &Connection, channel: &Channel) {
    if channel.status().connected() {
        if let Err(err) = channel.close(AMQP_REPLY_SUCCESS, "OK").await {
            debug!(error = err.to_string(), "failure to close the channel");
        }
    }

    if conn.status().connected() {
        if let Err(err) = conn.close(AMQP_REPLY_SUCCESS, "OK").await {
            debug!(error = err.to_string(), "failure to close the connection");
        }
    }
    debug!("amqp connection closed");
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Purchase Producers
//!
//! The producer half of the purchase flow. A [`Worker`] executes tasks handed
//! to it by a scheduler living outside this crate; [`PurchaseRecorder`] turns
//! each [`PurchaseTask`] into a JSON message on the products exchange, where
//! the listeners pick it up.

use crate::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::Configs,
    errors::AmqpError,
    publisher::RabbitMQPublisher,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

pub const PRODUCTS_EXCHANGE: &str = "products-exchange";

/// A purchase of `amount` units of product `id`, decrementing its inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseTask {
    pub id: i64,
    pub name: String,
    pub amount: i32,
}

impl PurchaseTask {
    pub fn to_bytes(&self) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(self).map_err(|_| AmqpError::ParsePayloadError)
    }

    pub fn from_bytes(body: &[u8]) -> Result<PurchaseTask, AmqpError> {
        serde_json::from_slice(body).map_err(|_| AmqpError::ParsePayloadError)
    }
}

#[async_trait]
pub trait Worker<T: Send + 'static>: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, task: T);
}

/// Publishes purchases to [`PRODUCTS_EXCHANGE`] under a fixed routing key,
/// opening a connection per task. Failures are logged, never returned.
pub struct PurchaseRecorder {
    cfg: Arc<Configs>,
    routing_key: String,
    name: String,
}

impl PurchaseRecorder {
    pub fn new(cfg: Arc<Configs>, routing_key: &str, name: &str) -> PurchaseRecorder {
        PurchaseRecorder {
            cfg,
            routing_key: routing_key.to_owned(),
            name: name.to_owned(),
        }
    }

    async fn record(&self, task: &PurchaseTask) -> Result<(), AmqpError> {
        let body = task.to_bytes()?;
        let (conn, channel) = new_amqp_channel(&self.cfg).await?;

        let result = RabbitMQPublisher::new(channel.clone())
            .publish(PRODUCTS_EXCHANGE, &self.routing_key, &body)
            .await;
        close_amqp_channel(&conn, &channel).await;

        result
    }
}

#[async_trait]
impl Worker<PurchaseTask> for PurchaseRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: PurchaseTask) {
        info!(
            worker = self.name,
            product_id = task.id,
            "publishing purchase of {} x{}",
            task.name,
            task.amount
        );

        if let Err(err) = self.record(&task).await {
            error!(
                error = err.to_string(),
                worker = self.name,
                product_id = task.id,
                "failed to publish purchase of {} x{}",
                task.name,
                task.amount
            );
        }
    }
}

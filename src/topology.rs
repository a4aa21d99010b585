// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares the exchanges, queues and bindings the listeners rely
//! on. Declarations are broker-side idempotent: installing the same topology
//! twice, from one or many processes, leaves the broker state unchanged. A
//! declaration that conflicts with an existing entity (for instance a durable
//! queue of the same name) fails with a topology error and is not retried.
//!
//! The main components are:
//! - `TopologyDescriptor`: one exchange/queue/routing-key triple
//! - `declare`: opens a connection, installs a descriptor and closes it
//! - `Topology` trait and `AmqpTopology`: builder for arbitrary topologies

use crate::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::Configs,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, ExchangeKind,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error, info};

/// Identifies one exchange, one queue and the routing-key binding between
/// them. The exchange is declared as a non-durable direct exchange and the
/// queue as a non-durable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDescriptor {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl TopologyDescriptor {
    pub fn new(exchange: &str, queue: &str, routing_key: &str) -> TopologyDescriptor {
        TopologyDescriptor {
            exchange: exchange.to_owned(),
            queue: queue.to_owned(),
            routing_key: routing_key.to_owned(),
        }
    }
}

/// Declares the descriptor's exchange, queue and binding on a dedicated
/// connection, closing it afterwards.
///
/// # Returns
/// Ok(()) when the topology exists on the broker, a topology error when the
/// broker rejects a declaration, or a connection error when it is unreachable.
pub async fn declare(cfg: &Configs, descriptor: &TopologyDescriptor) -> Result<(), AmqpError> {
    let (conn, channel) = new_amqp_channel(cfg).await?;

    let result = install_descriptor(channel.clone(), descriptor).await;
    close_amqp_channel(&conn, &channel).await;

    if result.is_ok() {
        info!(
            exchange = descriptor.exchange,
            queue = descriptor.queue,
            routing_key = descriptor.routing_key,
            "topology declared"
        );
    }

    result
}

/// Declares the descriptor's topology on an already open channel.
pub async fn install_descriptor(
    channel: Arc<Channel>,
    descriptor: &TopologyDescriptor,
) -> Result<(), AmqpError> {
    let exchange = ExchangeDefinition::new(&descriptor.exchange);
    let queue = QueueDefinition::new(&descriptor.queue);
    let binding = QueueBinding::new(&descriptor.queue)
        .exchange(&descriptor.exchange)
        .routing_key(&descriptor.routing_key);

    AmqpTopology::new(channel)
        .exchange(&exchange)
        .queue(&queue)
        .queue_binding(&binding)
        .install()
        .await
}

/// Trait defining the interface for topology management.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: &'tp ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: &'tp QueueBinding) -> Self;

    /// Installs the topology to the RabbitMQ server.
    ///
    /// This creates all the exchanges and queues, and sets up all the bindings.
    async fn install(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Topology trait.
pub struct AmqpTopology<'tp> {
    channel: Arc<Channel>,
    pub(crate) queues: HashMap<&'tp str, &'tp QueueDefinition>,
    pub(crate) queues_binding: Vec<&'tp QueueBinding<'tp>>,
    pub(crate) exchanges: Vec<&'tp ExchangeDefinition<'tp>>,
}

impl<'tp> AmqpTopology<'tp> {
    pub fn new(channel: Arc<Channel>) -> AmqpTopology<'tp> {
        AmqpTopology {
            channel,
            queues: HashMap::default(),
            queues_binding: vec![],
            exchanges: vec![],
        }
    }
}

#[async_trait]
impl<'tp> Topology<'tp> for AmqpTopology<'tp> {
    fn exchange(mut self, def: &'tp ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.insert(&def.name, def);
        self
    }

    fn queue_binding(mut self, binding: &'tp QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    /// Installs the topology to the RabbitMQ server.
    ///
    /// This method performs the following operations in order:
    /// 1. Creates all exchanges
    /// 2. Creates all queues
    /// 3. Sets up queue-to-exchange bindings
    async fn install(&self) -> Result<(), AmqpError> {
        self.install_exchange().await?;
        self.install_queue().await?;
        self.binding_queues().await
    }
}

impl<'tp> AmqpTopology<'tp> {
    async fn install_exchange(&self) -> Result<(), AmqpError> {
        for exch in self.exchanges.iter() {
            debug!("creating exchange: {}", exch.name);

            match self
                .channel
                .exchange_declare(
                    exch.name,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        passive: false,
                        durable: exch.durable,
                        auto_delete: false,
                        internal: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = exch.name,
                        "error to declare the exchange"
                    );
                    Err(AmqpError::DeclareExchangeError(exch.name.to_owned()))
                }
                _ => Ok(()),
            }?;

            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn install_queue(&self) -> Result<(), AmqpError> {
        for (name, def) in self.queues.iter() {
            debug!("creating queue: {}", name);

            match self
                .channel
                .queue_declare(
                    name,
                    QueueDeclareOptions {
                        passive: false,
                        durable: def.durable,
                        exclusive: false,
                        auto_delete: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), name, "error to declare the queue");
                    Err(AmqpError::DeclareQueueError((*name).to_owned()))
                }
                _ => {
                    debug!("queue: {} was created", name);
                    Ok(())
                }
            }?;
        }

        Ok(())
    }

    async fn binding_queues(&self) -> Result<(), AmqpError> {
        for binding in self.queues_binding.iter() {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );

            match self
                .channel
                .queue_bind(
                    binding.queue_name,
                    binding.exchange_name,
                    binding.routing_key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error to bind queue to exchange");

                    Err(AmqpError::BindingExchangeToQueueError(
                        binding.exchange_name.to_owned(),
                        binding.queue_name.to_owned(),
                    ))
                }
                _ => Ok(()),
            }?;
        }

        debug!("queues were bound");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_keeps_names() {
        let descriptor = TopologyDescriptor::new("test-exchange", "test-queue", "test-key");

        assert_eq!(descriptor.exchange, "test-exchange");
        assert_eq!(descriptor.queue, "test-queue");
        assert_eq!(descriptor.routing_key, "test-key");
    }
}

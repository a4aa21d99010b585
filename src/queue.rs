// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Builders for queue declarations and queue-to-exchange bindings. Queues are
//! non-exclusive and non-auto-delete, and non-durable unless marked durable,
//! so a broker restart resets them.

/// Definition of a RabbitMQ queue.
#[derive(Debug, Clone, Default)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
}

impl QueueDefinition {
    /// Creates a new transient queue definition with the given name.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// Configuration for binding a queue to an exchange.
///
/// Queue bindings define how messages flow from exchanges to queues based on
/// routing keys and exchange types.
#[derive(Debug, Clone)]
pub struct QueueBinding<'qeb> {
    pub(crate) queue_name: &'qeb str,
    pub(crate) exchange_name: &'qeb str,
    pub(crate) routing_key: &'qeb str,
}

impl<'qeb> QueueBinding<'qeb> {
    /// Creates a new queue binding for the given queue.
    ///
    /// By default, the exchange name and routing key are empty strings.
    /// These should be set using the `exchange` and `routing_key` methods.
    pub fn new(queue: &'qeb str) -> QueueBinding<'qeb> {
        QueueBinding {
            queue_name: queue,
            exchange_name: "",
            routing_key: "",
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &'qeb str) -> Self {
        self.exchange_name = exchange;
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &'qeb str) -> Self {
        self.routing_key = key;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_transient_queue() {
        let def = QueueDefinition::new("products");

        assert_eq!(def.name(), "products");
        assert!(!def.durable);
        assert!(QueueDefinition::new("products").durable().durable);
    }

    #[test]
    fn binding_builder() {
        let binding = QueueBinding::new("products")
            .exchange("products-exchange")
            .routing_key("auto");

        assert_eq!(binding.queue_name, "products");
        assert_eq!(binding.exchange_name, "products-exchange");
        assert_eq!(binding.routing_key, "auto");
    }
}

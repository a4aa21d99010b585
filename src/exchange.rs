// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Exchanges receive published messages and route them to bound queues by
//! exact routing key. Definitions describe a direct exchange, non-durable and
//! non-auto-delete unless marked durable.

/// Definition of a direct RabbitMQ exchange.
#[derive(Debug, Clone)]
pub struct ExchangeDefinition<'ex> {
    pub(crate) name: &'ex str,
    pub(crate) durable: bool,
}

impl<'ex> ExchangeDefinition<'ex> {
    /// Creates a new non-durable direct exchange definition with the given name.
    pub fn new(name: &'ex str) -> ExchangeDefinition<'ex> {
        ExchangeDefinition {
            name,
            durable: false,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_transient_exchange() {
        let def = ExchangeDefinition::new("products-exchange");

        assert_eq!(def.name(), "products-exchange");
        assert!(!def.durable);
    }

    #[test]
    fn durable_exchange() {
        assert!(ExchangeDefinition::new("events").durable().durable);
    }
}

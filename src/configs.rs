// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Listener Configuration
//!
//! Connection and application settings shared by the topology configurator,
//! the consumer loop, the drain observer and the publisher. Settings are read
//! from a TOML document or from the process environment; anything missing
//! falls back to the defaults of a local RabbitMQ broker.

use crate::errors::AmqpError;
use serde::Deserialize;
use std::{env, fs, path::Path};

pub const ENV_APP_NAME: &str = "APP_NAME";
pub const ENV_RABBITMQ_HOST: &str = "RABBITMQ_HOST";
pub const ENV_RABBITMQ_PORT: &str = "RABBITMQ_PORT";
pub const ENV_RABBITMQ_USER: &str = "RABBITMQ_USER";
pub const ENV_RABBITMQ_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const ENV_RABBITMQ_VHOST: &str = "RABBITMQ_VHOST";

/// Application identity, reported to the broker as the connection name and
/// used as the consumer tag prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfigs {
    pub name: String,
}

impl Default for AppConfigs {
    fn default() -> Self {
        AppConfigs {
            name: "amqp-listener".to_owned(),
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for RabbitMQConfigs {
    fn default() -> Self {
        RabbitMQConfigs {
            host: "localhost".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
        }
    }
}

impl RabbitMQConfigs {
    /// Renders the AMQP URI. User, password and vhost are percent-encoded,
    /// so the default vhost `/` becomes `%2F`.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
}

impl Configs {
    /// Loads the configs from the process environment.
    pub fn from_env() -> Result<Configs, AmqpError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configs from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Configs, AmqpError> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|err| {
            AmqpError::InvalidConfigs(format!("{}: {}", path.as_ref().display(), err))
        })?;

        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Configs, AmqpError> {
        toml::from_str(raw).map_err(|err| AmqpError::InvalidConfigs(err.to_string()))
    }

    fn from_lookup<F>(lookup: F) -> Result<Configs, AmqpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Configs::default();

        if let Some(name) = lookup(ENV_APP_NAME) {
            cfg.app.name = name;
        }
        if let Some(host) = lookup(ENV_RABBITMQ_HOST) {
            cfg.rabbitmq.host = host;
        }
        if let Some(port) = lookup(ENV_RABBITMQ_PORT) {
            cfg.rabbitmq.port = port.parse().map_err(|_| {
                AmqpError::InvalidConfigs(format!(
                    "{} is not a port: `{}`",
                    ENV_RABBITMQ_PORT, port
                ))
            })?;
        }
        if let Some(user) = lookup(ENV_RABBITMQ_USER) {
            cfg.rabbitmq.user = user;
        }
        if let Some(password) = lookup(ENV_RABBITMQ_PASSWORD) {
            cfg.rabbitmq.password = password;
        }
        if let Some(vhost) = lookup(ENV_RABBITMQ_VHOST) {
            cfg.rabbitmq.vhost = vhost;
        }

        Ok(cfg)
    }
}

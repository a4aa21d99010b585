// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`)
/// and compact UTC-timestamped output.
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_target(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    tracing::subscriber::set_global_default(subscriber)
}

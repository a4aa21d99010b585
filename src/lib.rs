// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod consumer;
mod otel;

pub mod channel;
pub mod configs;
pub mod delivery;
pub mod drain;
pub mod errors;
pub mod exchange;
pub mod handlers;
pub mod listener;
pub mod logging;
pub mod publisher;
pub mod queue;
pub mod topology;
pub mod worker;

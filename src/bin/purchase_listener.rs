// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! purchase-listener: declares the products topology and consumes purchase
//! events from two queues, `products` with auto-ack and `safer-products`
//! with manual ack, until Ctrl+C.
//
//  $ purchase-listener --config listener.toml
//  $ RABBITMQ_HOST=broker purchase-listener

use amqp_listener::{
    configs::Configs,
    delivery::{AckMode, DeliveryContext},
    errors::AmqpError,
    handlers::{LoggingCancelHandler, LoggingHandler, ManualAckHandler},
    listener::RabbitMQListener,
    logging::init_logging,
    topology::{declare, TopologyDescriptor},
    worker::{PurchaseTask, PRODUCTS_EXCHANGE},
};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "purchase-listener", version, about = "Consumes purchase events")]
struct Cli {
    /// Path to a TOML config file; the environment is used when omitted
    #[arg(short, long)]
    config: Option<String>,
}

fn record_purchase(ctx: &DeliveryContext) -> Result<(), AmqpError> {
    let purchase = PurchaseTask::from_bytes(&ctx.body)?;
    info!(
        product_id = purchase.id,
        redelivered = ctx.redelivered,
        "received purchase for {}, quantity={}",
        purchase.name,
        purchase.amount
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let cfg = Arc::new(match cli.config {
        Some(path) => Configs::from_toml_file(path)?,
        None => Configs::from_env()?,
    });

    declare(&cfg, &TopologyDescriptor::new(PRODUCTS_EXCHANGE, "products", "auto")).await?;
    declare(
        &cfg,
        &TopologyDescriptor::new(PRODUCTS_EXCHANGE, "safer-products", "safer"),
    )
    .await?;

    let mut listeners = vec![
        RabbitMQListener::new(
            cfg.clone(),
            "products",
            Arc::new(LoggingHandler::new("products", record_purchase)),
            Arc::new(LoggingCancelHandler),
            AckMode::Auto,
        ),
        RabbitMQListener::new(
            cfg.clone(),
            "safer-products",
            Arc::new(ManualAckHandler::new("safer-products", record_purchase)),
            Arc::new(LoggingCancelHandler),
            AckMode::Manual,
        ),
    ];
    listeners.iter_mut().for_each(RabbitMQListener::start);

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl+C, stopping listeners");

    for listener in listeners.iter_mut() {
        listener.stop().await;
    }

    Ok(())
}

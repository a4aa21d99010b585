// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Listener
//!
//! A [`RabbitMQListener`] consumes one queue on a background task with a
//! fixed acknowledgment mode, reconnecting after any failure. Each listener
//! owns its connection and channel; several listeners on the same queue form
//! a competing-consumer set and the broker spreads deliveries among them.
//!
//! Every loop iteration:
//! 1. opens a connection and a channel,
//! 2. binds the handler to the channel,
//! 3. registers a consumer on the queue and processes its deliveries one at
//!    a time until the listener is stopped, the broker cancels the consumer
//!    or the stream fails,
//! 4. closes the channel and connection and logs any error,
//! 5. sleeps [`LOOP_INTERVAL`] whatever the outcome.
//!
//! Stopping is cooperative: it is observed between deliveries, never inside
//! a running handler, and [`RabbitMQListener::stop`] only waits one interval
//! before returning. A restarted listener waits for its previous loop to exit
//! before opening a new channel, so a handler still finishing a delivery
//! never sees its channel rebound.

use crate::{
    channel::{close_amqp_channel, new_amqp_channel},
    configs::Configs,
    consumer::consume,
    delivery::{AckMode, CancelHandler, DeliveryChannel, DeliveryHandler},
    errors::AmqpError,
};
use futures_util::{Stream, StreamExt};
use lapin::{message::Delivery, options::BasicConsumeOptions, types::FieldTable};
use opentelemetry::global;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Pause between two loop iterations, and the time `stop` waits.
pub const LOOP_INTERVAL: Duration = Duration::from_millis(100);

pub struct RabbitMQListener {
    inner: Arc<ListenerInner>,
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct ListenerInner {
    cfg: Arc<Configs>,
    queue: String,
    mode: AckMode,
    handler: Arc<dyn DeliveryHandler>,
    cancel: Arc<dyn CancelHandler>,
}

impl RabbitMQListener {
    /// Creates a stopped listener for `queue`.
    pub fn new(
        cfg: Arc<Configs>,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
        cancel: Arc<dyn CancelHandler>,
        mode: AckMode,
    ) -> RabbitMQListener {
        RabbitMQListener {
            inner: Arc::new(ListenerInner {
                cfg,
                queue: queue.to_owned(),
                mode,
                handler,
                cancel,
            }),
            token: None,
            task: None,
        }
    }

    pub fn queue(&self) -> &str {
        &self.inner.queue
    }

    pub fn mode(&self) -> AckMode {
        self.inner.mode
    }

    pub fn is_running(&self) -> bool {
        self.token
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }

    /// Spawns the consumer loop and returns immediately, without waiting for
    /// a connection. Must be called within a tokio runtime. Starting a
    /// running listener does nothing.
    ///
    /// When a previous loop of this listener is still winding down, the new
    /// loop only begins once it has exited.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!(queue = self.inner.queue, "listener already running");
            return;
        }

        let token = CancellationToken::new();
        let inner = self.inner.clone();
        let child = token.clone();
        let previous = self.task.take();

        info!(queue = self.inner.queue, mode = %self.inner.mode, "starting listener");
        self.task = Some(tokio::spawn(async move {
            inner.wait_previous(previous).await;
            inner.run(child).await
        }));
        self.token = Some(token);
    }

    /// Signals the loop to stop, then waits one [`LOOP_INTERVAL`].
    ///
    /// No new consumer is registered once this returns, but a delivery that
    /// was being handled may still be running.
    pub async fn stop(&mut self) {
        if let Some(token) = self.token.as_ref() {
            token.cancel();
            info!(queue = self.inner.queue, "stopping listener");
        }

        sleep(LOOP_INTERVAL).await;

        if let Some(task) = self.task.as_ref() {
            if !task.is_finished() {
                debug!(queue = self.inner.queue, "listener task still winding down");
            }
        }
    }
}

impl Drop for RabbitMQListener {
    fn drop(&mut self) {
        if let Some(token) = self.token.as_ref() {
            token.cancel();
        }
    }
}

impl ListenerInner {
    async fn wait_previous(&self, previous: Option<JoinHandle<()>>) {
        let Some(previous) = previous else {
            return;
        };

        if !previous.is_finished() {
            debug!(queue = self.queue, "waiting for the previous loop to exit");
        }

        if let Err(err) = previous.await {
            error!(error = err.to_string(), queue = self.queue, "previous loop failed");
        }
    }

    async fn run(&self, token: CancellationToken) {
        while !token.is_cancelled() {
            if let Err(err) = self.consume_once(&token).await {
                error!(
                    error = err.to_string(),
                    queue = self.queue,
                    "listener iteration failed, reconnecting"
                );
            }

            sleep(LOOP_INTERVAL).await;
        }

        debug!(queue = self.queue, "listener loop exited");
    }

    async fn consume_once(&self, token: &CancellationToken) -> Result<(), AmqpError> {
        let (conn, channel) = new_amqp_channel(&self.cfg).await?;

        let result = self.consume_channel(channel.clone(), token).await;
        close_amqp_channel(&conn, &channel).await;

        result
    }

    async fn consume_channel(
        &self,
        channel: Arc<lapin::Channel>,
        token: &CancellationToken,
    ) -> Result<(), AmqpError> {
        let handler_channel: Arc<dyn DeliveryChannel> = channel.clone();
        self.handler.bind_channel(handler_channel).await;

        let consumer_tag = format!("{}-{}", self.cfg.app.name, Uuid::new_v4());

        let consumer = match channel
            .basic_consume(
                &self.queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: self.mode.no_ack(),
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = self.queue,
                    "error to create the consumer"
                );
                Err(AmqpError::BindingConsumerError(self.queue.clone()))
            }
            Ok(c) => Ok(c),
        }?;

        info!(queue = self.queue, consumer_tag, mode = %self.mode, "consuming");

        self.consume_stream(consumer, &consumer_tag, token).await
    }

    /// Hands deliveries to the handler one at a time until the token is
    /// cancelled, the stream ends (the broker cancelled the consumer) or the
    /// stream yields an error.
    async fn consume_stream<S>(
        &self,
        mut deliveries: S,
        consumer_tag: &str,
        token: &CancellationToken,
    ) -> Result<(), AmqpError>
    where
        S: Stream<Item = Result<Delivery, lapin::Error>> + Unpin,
    {
        let tracer = global::tracer("amqp consumer");

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!(consumer_tag, "listener stopped, leaving the consumer");
                    return Ok(());
                }

                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        if let Err(err) = consume(
                            &tracer,
                            &delivery,
                            consumer_tag,
                            self.mode,
                            self.handler.as_ref(),
                            token,
                        )
                        .await
                        {
                            debug!(error = err.to_string(), consumer_tag, "delivery not processed");
                        }
                    }
                    Some(Err(err)) => {
                        return Err(AmqpError::ConsumerError(err.to_string()));
                    }
                    None => {
                        self.cancel.on_cancel(consumer_tag);
                        return Ok(());
                    }
                }
            }
        }
    }
}

//! # Receive Pump
//!
//! One pump per subscribed event name. The pump pulls peek-locked messages
//! from `{App}.{EventName}` and hands each to a worker task; a semaphore
//! caps in-flight workers at `max_concurrent_calls`.
//!
//! Disposition per message:
//!
//! | Dispatch result | Action |
//! |-----------------|--------|
//! | `Ok(true)` | complete |
//! | `Ok(false)` | abandon (`unrouted`) |
//! | `Err(_)` | exception hook, then abandon |
//!
//! Abandoned messages are redelivered by the broker until its max delivery
//! count, then dead-lettered.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eventbus_base::{DispatchEngine, EventBusError};
use eventbus_telemetry::{
    bus_span, log_message_event, metric_inc, time_histogram, ACTIVE_SUBSCRIPTIONS, DISPATCH_DURATION,
    HANDLER_FAILURES, MESSAGES_ABANDONED, MESSAGES_COMPLETED, MESSAGES_RECEIVED,
};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::domain::{BrokerError, LockToken, ReceivedMessage, RetryPolicy, ServiceBusMessage};
use crate::ports::ServiceBusConnection;
use crate::COMPONENT;

/// How long a stopping pump waits for in-flight messages to settle.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// What the adapter was doing when an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    /// Pulling from the subscription.
    Receive,
    /// Running handlers.
    Dispatch,
    /// Settling a processed message.
    Complete,
    /// Returning a message for redelivery.
    Abandon,
}

impl fmt::Display for MessageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageAction::Receive => "receive",
            MessageAction::Dispatch => "dispatch",
            MessageAction::Complete => "complete",
            MessageAction::Abandon => "abandon",
        })
    }
}

/// Error report passed to the exception hook.
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    /// Step that failed.
    pub action: MessageAction,
    /// `{topic}/Subscriptions/{subscription}`.
    pub entity_path: String,
    /// Canonical event name the pump serves.
    pub event_name: String,
    /// Message involved, if any.
    pub message_id: Option<String>,
    /// Rendered error.
    pub error: String,
}

/// User callback invoked for every message-processing failure.
pub type ExceptionHandler = Arc<dyn Fn(&ExceptionContext) + Send + Sync>;

pub(crate) struct PumpContext {
    pub engine: Arc<DispatchEngine>,
    pub connection: Arc<dyn ServiceBusConnection>,
    pub topic: String,
    pub subscription: String,
    pub event_name: String,
    pub max_concurrent_calls: usize,
    pub receive_wait: Duration,
    pub handler_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub exception_handler: Option<ExceptionHandler>,
}

impl PumpContext {
    fn entity_path(&self) -> String {
        format!("{}/Subscriptions/{}", self.topic, self.subscription)
    }

    fn raise_exception(&self, action: MessageAction, message_id: Option<&str>, err: &dyn fmt::Display) {
        let context = ExceptionContext {
            action,
            entity_path: self.entity_path(),
            event_name: self.event_name.clone(),
            message_id: message_id.map(str::to_string),
            error: err.to_string(),
        };

        error!(
            component = COMPONENT,
            action = %context.action,
            entity_path = %context.entity_path,
            event_name = %context.event_name,
            message_id = context.message_id.as_deref().unwrap_or("-"),
            error = %context.error,
            "ERROR handling message"
        );

        if let Some(handler) = &self.exception_handler {
            handler(&context);
        }
    }

    async fn abandon(&self, message: &ServiceBusMessage, lock_token: LockToken, reason: &str) {
        let result = self
            .retry
            .run("abandon", || {
                self.connection
                    .abandon(&self.topic, &self.subscription, lock_token)
            })
            .await;

        match result {
            Ok(()) => {
                metric_inc!(MESSAGES_ABANDONED, &[self.event_name.as_str(), reason]);
                log_message_event!(
                    debug,
                    COMPONENT,
                    "Message abandoned",
                    self.event_name,
                    message.message_id,
                    reason
                );
            }
            Err(err) => self.raise_exception(MessageAction::Abandon, Some(&message.message_id), &err),
        }
    }
}

/// Running receive loop for one subscription.
pub(crate) struct ReceivePump {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReceivePump {
    /// Spawn the receive loop.
    pub fn start(context: PumpContext) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(run(Arc::new(context), signal));
        Self { shutdown, task }
    }

    /// Ask the loop to stop; in-flight messages still settle.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Stop and wait for the loop and its in-flight messages.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(component = COMPONENT, error = %e, "Receive pump task failed");
        }
    }
}

async fn run(ctx: Arc<PumpContext>, mut signal: watch::Receiver<bool>) {
    let permits = ctx
        .max_concurrent_calls
        .clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
    let workers = Arc::new(Semaphore::new(permits));

    ACTIVE_SUBSCRIPTIONS.inc();
    info!(
        component = COMPONENT,
        event_name = %ctx.event_name,
        subscription = %ctx.subscription,
        max_concurrent_calls = permits,
        "Receive pump started"
    );

    loop {
        if *signal.borrow() {
            break;
        }

        let permit = tokio::select! {
            _ = signal.changed() => break,
            permit = Arc::clone(&workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let received = tokio::select! {
            _ = signal.changed() => break,
            received = ctx.connection.receive(&ctx.topic, &ctx.subscription, ctx.receive_wait) => received,
        };

        match received {
            Ok(Some(received)) => {
                let span = bus_span!(
                    "message",
                    event_name = %ctx.event_name,
                    message_id = %received.message.message_id
                );
                let ctx = Arc::clone(&ctx);
                tokio::spawn(
                    async move {
                        handle_message(&ctx, received).await;
                        drop(permit);
                    }
                    .instrument(span),
                );
            }
            Ok(None) => {}
            Err(BrokerError::Closed) => break,
            Err(err) => {
                ctx.raise_exception(MessageAction::Receive, None, &err);
                tokio::select! {
                    _ = signal.changed() => break,
                    _ = tokio::time::sleep(ctx.retry.backoff(0)) => {}
                }
            }
        }
    }

    // All permits back means every worker has settled its message.
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, workers.acquire_many(permits as u32)).await;
    if drained.is_err() {
        warn!(
            component = COMPONENT,
            event_name = %ctx.event_name,
            "Receive pump stopped with messages still in flight"
        );
    }

    ACTIVE_SUBSCRIPTIONS.dec();
    info!(
        component = COMPONENT,
        event_name = %ctx.event_name,
        "Receive pump stopped"
    );
}

async fn handle_message(ctx: &PumpContext, received: ReceivedMessage) {
    let ReceivedMessage {
        message,
        lock_token,
        delivery_count,
    } = received;

    metric_inc!(MESSAGES_RECEIVED, &[ctx.event_name.as_str()]);
    log_message_event!(
        debug,
        COMPONENT,
        "Message received",
        message.label,
        message.message_id,
        delivery_count
    );

    let outcome = {
        let _timer = time_histogram!(DISPATCH_DURATION);
        let dispatch = ctx.engine.process_event(&message.label, &message.body);
        match ctx.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, dispatch)
                .await
                .unwrap_or_else(|_| {
                    Err(EventBusError::HandlerTimeout {
                        event_name: ctx.event_name.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }),
            None => dispatch.await,
        }
    };

    match outcome {
        Ok(true) => {
            let completed = ctx
                .retry
                .run("complete", || {
                    ctx.connection
                        .complete(&ctx.topic, &ctx.subscription, lock_token)
                })
                .await;
            match completed {
                Ok(()) => {
                    metric_inc!(MESSAGES_COMPLETED, &[ctx.event_name.as_str()]);
                    debug!(
                        component = COMPONENT,
                        event_name = %ctx.event_name,
                        message_id = %message.message_id,
                        "Message completed"
                    );
                }
                Err(err) => {
                    ctx.raise_exception(MessageAction::Complete, Some(&message.message_id), &err)
                }
            }
        }
        Ok(false) => ctx.abandon(&message, lock_token, "unrouted").await,
        Err(err) => {
            metric_inc!(HANDLER_FAILURES, &[ctx.event_name.as_str()]);
            ctx.raise_exception(MessageAction::Dispatch, Some(&message.message_id), &err);
            ctx.abandon(&message, lock_token, abandon_reason(&err)).await;
        }
    }
}

fn abandon_reason(err: &EventBusError) -> &'static str {
    match err {
        EventBusError::HandlerTimeout { .. } => "timeout",
        EventBusError::Deserialization { .. } | EventBusError::EventTypeNotFound(_) => "decode",
        EventBusError::Disposed => "disposed",
        _ => "handler_failed",
    }
}

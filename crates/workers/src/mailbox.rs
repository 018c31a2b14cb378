//! Sequential mailboxes with asynchronous reply delivery.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use weather_common::{Correlated, WeatherError, WeatherResult};

use crate::ticker::Ticker;

/// The compute routine behind a worker.
///
/// Ad-hoc requests and timer ticks both land here.
#[async_trait]
pub trait Compute: Send + Sync + 'static {
    type Request: Correlated + Debug + Send + Sync + 'static;
    type Output: Send + 'static;

    /// Short worker name used in logs and metrics labels.
    fn role(&self) -> &'static str;

    async fn compute(&self, request: &Self::Request) -> WeatherResult<Self::Output>;
}

/// A computed result addressed to the request that asked for it.
#[derive(Debug)]
pub struct Reply<T> {
    pub request_id: Uuid,
    pub result: WeatherResult<T>,
}

/// Where a reply is delivered once the compute finishes.
#[derive(Debug)]
pub enum ReplyTo<T> {
    /// A single waiting caller
    Once(oneshot::Sender<Reply<T>>),
    /// A shared inbox; callers correlate on `request_id`
    Channel(mpsc::Sender<Reply<T>>),
}

impl<T> ReplyTo<T> {
    pub async fn deliver(self, reply: Reply<T>) {
        let request_id = reply.request_id;
        let delivered = match self {
            ReplyTo::Once(tx) => tx.send(reply).is_ok(),
            ReplyTo::Channel(tx) => tx.send(reply).await.is_ok(),
        };

        if !delivered {
            debug!(request_id = %request_id, "Requester gone, reply discarded");
        }
    }
}

/// Inbound mailbox message.
#[derive(Debug)]
pub enum Message<Req, Out> {
    Request { request: Req, reply_to: ReplyTo<Out> },
    /// Self-triggered recompute; the result is discarded
    Tick(Req),
}

/// Mailbox sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Messages buffered before senders wait
    pub capacity: usize,
    /// Computations one worker runs at once; 1 keeps it strictly sequential
    pub max_in_flight: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_in_flight: 1,
        }
    }
}

/// Cloneable sender side of a worker mailbox.
pub struct WorkerHandle<Req, Out> {
    role: &'static str,
    tx: mpsc::Sender<Message<Req, Out>>,
}

impl<Req, Out> Clone for WorkerHandle<Req, Out> {
    fn clone(&self) -> Self {
        Self {
            role: self.role,
            tx: self.tx.clone(),
        }
    }
}

impl<Req, Out> WorkerHandle<Req, Out> {
    pub fn role(&self) -> &'static str {
        self.role
    }

    /// Enqueue a request whose reply goes to `reply_to`.
    pub async fn send(&self, request: Req, reply_to: ReplyTo<Out>) -> WeatherResult<()> {
        self.tx
            .send(Message::Request { request, reply_to })
            .await
            .map_err(|_| WeatherError::WorkerUnavailable(format!("{} mailbox closed", self.role)))
    }

    /// Enqueue a request and wait for its reply.
    pub async fn ask(&self, request: Req) -> WeatherResult<Out> {
        let (tx, rx) = oneshot::channel();
        self.send(request, ReplyTo::Once(tx)).await?;

        let reply = rx.await.map_err(|_| {
            WeatherError::WorkerUnavailable(format!("{} worker dropped the reply", self.role))
        })?;
        reply.result
    }

    /// Best-effort tick; dropped when the mailbox is full or closed.
    pub fn try_tick(&self, request: Req) -> bool {
        match self.tx.try_send(Message::Tick(request)) {
            Ok(()) => true,
            Err(_) => {
                debug!(role = self.role, "Tick dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start a mailbox task for `compute`. It runs until `shutdown` is cancelled
/// or every handle is dropped.
pub fn spawn_worker<C: Compute>(
    compute: C,
    config: &MailboxConfig,
    shutdown: CancellationToken,
) -> (WorkerHandle<C::Request, C::Output>, JoinHandle<()>) {
    let role = compute.role();
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));

    let task = tokio::spawn(run_mailbox(Arc::new(compute), rx, permits, shutdown));

    (WorkerHandle { role, tx }, task)
}

async fn run_mailbox<C: Compute>(
    compute: Arc<C>,
    mut rx: mpsc::Receiver<Message<C::Request, C::Output>>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let role = compute.role();
    info!(role = role, "Worker started");

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // Permits are taken in receipt order, so handling starts in receipt order
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let compute = compute.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match message {
                Message::Request { request, reply_to } => {
                    counter!("worker_requests_total", "role" => role).increment(1);
                    let request_id = request.request_id();
                    let result = compute.compute(&request).await;
                    if let Err(e) = &result {
                        counter!("worker_errors_total", "role" => role).increment(1);
                        warn!(role = role, request_id = %request_id, error = %e, "Request failed");
                    }
                    reply_to.deliver(Reply { request_id, result }).await;
                }
                Message::Tick(request) => {
                    counter!("worker_ticks_total", "role" => role).increment(1);
                    match compute.compute(&request).await {
                        Ok(_) => debug!(role = role, request = ?request, "Tick computed"),
                        Err(e) => {
                            counter!("worker_errors_total", "role" => role).increment(1);
                            warn!(role = role, request = ?request, error = %e, "Tick failed");
                        }
                    }
                }
            }
        });
    }

    info!(role = role, "Worker stopped");
}

/// A running worker: its mailbox task, handle and timer registrations.
pub struct Worker<Req, Out> {
    handle: WorkerHandle<Req, Out>,
    ticker: Ticker,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl<Req, Out> Worker<Req, Out>
where
    Req: Send + 'static,
    Out: Send + 'static,
{
    pub fn spawn<C>(compute: C, config: &MailboxConfig, shutdown: &CancellationToken) -> Self
    where
        C: Compute<Request = Req, Output = Out>,
    {
        let token = shutdown.child_token();
        let (handle, task) = spawn_worker(compute, config, token.clone());
        let ticker = Ticker::new(&token);

        Self {
            handle,
            ticker,
            token,
            task,
        }
    }

    pub fn handle(&self) -> WorkerHandle<Req, Out> {
        self.handle.clone()
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Cancel every tick and stop the mailbox.
    pub async fn stop(self) {
        self.ticker.cancel();
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(role = self.handle.role, error = %e, "Worker task ended abnormally");
        }
    }
}

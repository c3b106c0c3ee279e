use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::BillingError;

/// Outbound side of the messaging platform. Failures are per recipient.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BillingError>;
}

pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), BillingError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ())
            .map_err(|e| BillingError::DeliveryFailed {
                chat_id,
                reason: e.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Sends in flight at once
    pub concurrency: usize,
    /// Minimum gap between two sends
    pub interval: Duration,
    pub queue_size: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            interval: Duration::from_millis(40),
            queue_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

struct Job {
    chat_id: i64,
    text: String,
    reply: Option<oneshot::Sender<Result<(), BillingError>>>,
}

/// Rate-limited outbound queue. Cloning is cheap; all clones feed the same worker.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
}

impl Dispatcher {
    pub fn spawn(messenger: Arc<dyn Messenger>, options: DispatchOptions) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(options.queue_size.max(1));
        let handle = tokio::spawn(run_worker(rx, messenger, options));
        (Self { tx }, handle)
    }

    /// Queues a message without waiting for delivery.
    pub async fn enqueue(&self, chat_id: i64, text: impl Into<String>) -> Result<(), BillingError> {
        self.tx
            .send(Job {
                chat_id,
                text: text.into(),
                reply: None,
            })
            .await
            .map_err(|_| stopped(chat_id))
    }

    /// Queues a message and waits for the send outcome.
    pub async fn deliver(&self, chat_id: i64, text: impl Into<String>) -> Result<(), BillingError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Job {
                chat_id,
                text: text.into(),
                reply: Some(reply),
            })
            .await
            .map_err(|_| stopped(chat_id))?;
        outcome.await.map_err(|_| stopped(chat_id))?
    }

    /// Sends `text` to every chat. A failing recipient is counted and skipped.
    pub async fn broadcast(&self, chat_ids: &[i64], text: &str) -> BroadcastReport {
        let mut pending = Vec::with_capacity(chat_ids.len());
        let mut report = BroadcastReport::default();

        for &chat_id in chat_ids {
            let (reply, outcome) = oneshot::channel();
            let job = Job {
                chat_id,
                text: text.to_string(),
                reply: Some(reply),
            };
            if self.tx.send(job).await.is_err() {
                report.failed += 1;
                continue;
            }
            pending.push(outcome);
        }

        for outcome in pending {
            match outcome.await {
                Ok(Ok(())) => report.succeeded += 1,
                _ => report.failed += 1,
            }
        }

        info!(
            "Broadcast complete: {}/{} sent, {} failed",
            report.succeeded,
            report.total(),
            report.failed
        );
        report
    }
}

fn stopped(chat_id: i64) -> BillingError {
    BillingError::DeliveryFailed {
        chat_id,
        reason: "dispatcher is not running".to_string(),
    }
}

async fn run_worker(rx: mpsc::Receiver<Job>, messenger: Arc<dyn Messenger>, options: DispatchOptions) {
    // tokio::time::interval panics on a zero period
    let mut ticker = tokio::time::interval(options.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let pacer = Arc::new(Mutex::new(ticker));

    info!(
        "Notification dispatcher started (concurrency {}, interval {:?})",
        options.concurrency, options.interval
    );

    ReceiverStream::new(rx)
        .for_each_concurrent(options.concurrency.max(1), |job| {
            let messenger = messenger.clone();
            let pacer = pacer.clone();
            async move {
                pacer.lock().await.tick().await;

                let result = messenger.send_text(job.chat_id, &job.text).await;
                match &result {
                    Ok(()) => debug!("Delivered message to chat {}", job.chat_id),
                    Err(e) => warn!("✗ {}", e),
                }
                if let Some(reply) = job.reply {
                    let _ = reply.send(result);
                }
            }
        })
        .await;

    info!("Notification dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMessenger;

    fn fast() -> DispatchOptions {
        DispatchOptions {
            concurrency: 2,
            interval: Duration::from_millis(1),
            queue_size: 8,
        }
    }

    #[tokio::test]
    async fn broadcast_isolates_failing_recipients() {
        let messenger = Arc::new(RecordingMessenger::failing_for([2]));
        let (dispatcher, _worker) = Dispatcher::spawn(messenger.clone(), fast());

        let report = dispatcher.broadcast(&[1, 2, 3], "hello").await;

        assert_eq!(report, BroadcastReport { succeeded: 2, failed: 1 });
        let mut chats: Vec<i64> = messenger.sent().await.into_iter().map(|(c, _)| c).collect();
        chats.sort();
        assert_eq!(chats, vec![1, 3]);
    }

    #[tokio::test]
    async fn deliver_reports_the_send_outcome() {
        let messenger = Arc::new(RecordingMessenger::failing_for([7]));
        let (dispatcher, _worker) = Dispatcher::spawn(messenger, fast());

        assert!(dispatcher.deliver(1, "ok").await.is_ok());
        assert!(matches!(
            dispatcher.deliver(7, "nope").await,
            Err(BillingError::DeliveryFailed { chat_id: 7, .. })
        ));
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let messenger = Arc::new(RecordingMessenger::default());
        let options = DispatchOptions {
            interval: Duration::ZERO,
            ..fast()
        };
        let (dispatcher, _worker) = Dispatcher::spawn(messenger.clone(), options);

        dispatcher.deliver(5, "tick").await.unwrap();
        assert_eq!(messenger.sent().await, vec![(5, "tick".to_string())]);
    }

    #[tokio::test]
    async fn empty_broadcast_is_a_no_op() {
        let (dispatcher, _worker) =
            Dispatcher::spawn(Arc::new(RecordingMessenger::default()), fast());
        assert_eq!(dispatcher.broadcast(&[], "x").await, BroadcastReport::default());
    }
}

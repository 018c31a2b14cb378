//! Ingestion queue: Redis Streams in production, a channel in-process.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, streams::*, AsyncCommands, Client};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

use weather_common::{RawObservation, WeatherError, WeatherResult};

const STREAM_KEY: &str = "weather:observations";
const CONSUMER_GROUP: &str = "ingesters";
const LINE_FIELD: &str = "line";
/// Reading a consumer's history from this id yields its pending entries
const PENDING_START: &str = "0";
const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

/// One delivered feed line plus the id used to commit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedObservation {
    pub entry_id: String,
    pub raw: RawObservation,
}

/// Consumer side of the ingestion queue.
#[async_trait]
pub trait ObservationSource: Send {
    /// Wait for the next observation. `None` once the source is closed.
    async fn next(&mut self) -> WeatherResult<Option<QueuedObservation>>;

    /// Record that `entry_id` has been handled and must not be redelivered.
    async fn commit(&mut self, entry_id: &str) -> WeatherResult<()>;
}

/// When to replay the delivered but uncommitted entries of this consumer.
#[derive(Debug, Clone)]
struct ReclaimSchedule {
    interval: Option<Duration>,
    last_scan: Instant,
}

impl ReclaimSchedule {
    fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last_scan: Instant::now(),
        }
    }

    fn due(&self) -> bool {
        self.interval
            .is_some_and(|interval| self.last_scan.elapsed() >= interval)
    }

    /// Time until the next scan, `None` when replay is disabled.
    fn remaining(&self) -> Option<Duration> {
        self.interval
            .map(|interval| interval.saturating_sub(self.last_scan.elapsed()))
    }

    fn finished(&mut self) {
        self.last_scan = Instant::now();
    }
}

/// Redis Streams consumer-group queue of raw observation lines.
///
/// Entries delivered to this consumer but never acknowledged stay in the
/// group's pending list. They are replayed on connect and again every
/// reclaim interval, so a write that exhausted its retries is attempted
/// again later.
pub struct ObservationQueue {
    conn: MultiplexedConnection,
    consumer: String,
    block_ms: usize,
    reclaim: ReclaimSchedule,
    /// Last pending id replayed in the current scan
    pending_cursor: Option<String>,
}

impl ObservationQueue {
    /// Connect to Redis and initialize the stream.
    pub async fn connect(redis_url: &str, consumer: impl Into<String>) -> WeatherResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| WeatherError::QueueError(format!("Redis connection failed: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WeatherError::QueueError(format!("Redis connection failed: {}", e)))?;

        // Create consumer group if it doesn't exist
        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(STREAM_KEY)
            .arg(CONSUMER_GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        Ok(Self {
            conn,
            consumer: consumer.into(),
            block_ms: 5000,
            reclaim: ReclaimSchedule::new(Some(DEFAULT_RECLAIM_INTERVAL)),
            // Entries left pending by a previous run come first
            pending_cursor: Some(PENDING_START.to_string()),
        })
    }

    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim = ReclaimSchedule::new(Some(interval));
        self
    }

    /// Append a batch of feed lines in one round trip.
    pub async fn publish_batch(&mut self, lines: &[String]) -> WeatherResult<usize> {
        if lines.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        for line in lines {
            pipe.cmd("XADD")
                .arg(STREAM_KEY)
                .arg("*")
                .arg(LINE_FIELD)
                .arg(line)
                .ignore();
        }

        let _: () = pipe
            .query_async(&mut self.conn)
            .await
            .map_err(|e| WeatherError::QueueError(format!("Publish failed: {}", e)))?;

        Ok(lines.len())
    }

    /// Read one entry after `id`: `">"` for new entries, a concrete id for
    /// this consumer's pending history.
    async fn read_entry(
        &mut self,
        id: &str,
        block_ms: Option<usize>,
    ) -> WeatherResult<Option<QueuedObservation>> {
        let mut opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.consumer)
            .count(1);
        if let Some(ms) = block_ms {
            opts = opts.block(ms);
        }

        let reply: StreamReadReply = self
            .conn
            .xread_options(&[STREAM_KEY], &[id], &opts)
            .await
            .map_err(|e| WeatherError::QueueError(format!("Read failed: {}", e)))?;

        Ok(reply
            .keys
            .into_iter()
            .flat_map(|stream_key| stream_key.ids)
            .next()
            .map(|entry| {
                // An entry without a line is delivered empty and dropped by the parser
                let line: String = entry.get(LINE_FIELD).unwrap_or_default();
                QueuedObservation {
                    entry_id: entry.id,
                    raw: RawObservation::new(line),
                }
            }))
    }
}

#[async_trait]
impl ObservationSource for ObservationQueue {
    async fn next(&mut self) -> WeatherResult<Option<QueuedObservation>> {
        loop {
            if self.pending_cursor.is_none() && self.reclaim.due() {
                self.pending_cursor = Some(PENDING_START.to_string());
            }

            if let Some(cursor) = self.pending_cursor.take() {
                match self.read_entry(&cursor, None).await? {
                    Some(entry) => {
                        debug!(entry_id = %entry.entry_id, "Replaying pending observation");
                        self.pending_cursor = Some(entry.entry_id.clone());
                        return Ok(Some(entry));
                    }
                    None => {
                        self.reclaim.finished();
                        continue;
                    }
                }
            }

            if let Some(entry) = self.read_entry(">", Some(self.block_ms)).await? {
                return Ok(Some(entry));
            }
        }
    }

    async fn commit(&mut self, entry_id: &str) -> WeatherResult<()> {
        let _: i64 = self
            .conn
            .xack(STREAM_KEY, CONSUMER_GROUP, &[entry_id])
            .await
            .map_err(|e| WeatherError::QueueError(format!("Ack failed: {}", e)))?;

        Ok(())
    }
}

/// Entry ids committed by a [`MemoryQueue`], in commit order.
pub type CommitLog = Arc<Mutex<Vec<String>>>;

/// Producer half of a [`MemoryQueue`].
#[derive(Clone)]
pub struct FeedSender {
    tx: mpsc::Sender<String>,
}

impl FeedSender {
    pub async fn publish(&self, line: impl Into<String>) -> WeatherResult<()> {
        self.tx
            .send(line.into())
            .await
            .map_err(|_| WeatherError::QueueError("memory queue closed".to_string()))
    }
}

/// Channel-backed queue; entry ids are delivery sequence numbers.
///
/// Like the Redis queue, delivered entries stay pending until committed.
/// With a reclaim interval set, pending entries are replayed once it
/// elapses, and the queue only reports closed once the feed is closed and
/// nothing is pending.
pub struct MemoryQueue {
    rx: mpsc::Receiver<String>,
    closed: bool,
    next_id: u64,
    pending: BTreeMap<u64, String>,
    reclaim: ReclaimSchedule,
    replay_cursor: Option<u64>,
    commits: CommitLog,
}

impl MemoryQueue {
    pub fn channel(capacity: usize) -> (FeedSender, MemoryQueue) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = MemoryQueue {
            rx,
            closed: false,
            next_id: 0,
            pending: BTreeMap::new(),
            reclaim: ReclaimSchedule::new(None),
            replay_cursor: None,
            commits: Arc::new(Mutex::new(Vec::new())),
        };
        (FeedSender { tx }, queue)
    }

    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim = ReclaimSchedule::new(Some(interval));
        self
    }

    pub fn commit_log(&self) -> CommitLog {
        self.commits.clone()
    }

    /// Number of delivered entries not yet committed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl ObservationSource for MemoryQueue {
    async fn next(&mut self) -> WeatherResult<Option<QueuedObservation>> {
        loop {
            if self.replay_cursor.is_none() && !self.pending.is_empty() && self.reclaim.due() {
                self.replay_cursor = Some(0);
            }

            if let Some(after) = self.replay_cursor.take() {
                if let Some((&id, line)) = self.pending.range(after + 1..).next() {
                    self.replay_cursor = Some(id);
                    return Ok(Some(QueuedObservation {
                        entry_id: id.to_string(),
                        raw: RawObservation::new(line.clone()),
                    }));
                }
                self.reclaim.finished();
                continue;
            }

            let replay_in = if self.pending.is_empty() {
                None
            } else {
                self.reclaim.remaining()
            };

            let received = if self.closed {
                match replay_in {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => return Ok(None),
                }
            } else {
                match replay_in {
                    Some(delay) => match tokio::time::timeout(delay, self.rx.recv()).await {
                        Ok(received) => received,
                        Err(_) => continue,
                    },
                    None => self.rx.recv().await,
                }
            };

            match received {
                Some(line) => {
                    self.next_id += 1;
                    self.pending.insert(self.next_id, line.clone());
                    return Ok(Some(QueuedObservation {
                        entry_id: self.next_id.to_string(),
                        raw: RawObservation::new(line),
                    }));
                }
                None => self.closed = true,
            }
        }
    }

    async fn commit(&mut self, entry_id: &str) -> WeatherResult<()> {
        if let Ok(id) = entry_id.parse::<u64>() {
            self.pending.remove(&id);
        }
        self.commits.lock().await.push(entry_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_delivers_in_order_and_closes() {
        let (feed, mut queue) = MemoryQueue::channel(8);
        feed.publish("a").await.unwrap();
        feed.publish("b").await.unwrap();
        drop(feed);

        let first = queue.next().await.unwrap().unwrap();
        let second = queue.next().await.unwrap().unwrap();
        assert_eq!(first.raw.line(), "a");
        assert_eq!(first.entry_id, "1");
        assert_eq!(second.entry_id, "2");
        assert!(queue.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_queue_records_commits() {
        let (feed, mut queue) = MemoryQueue::channel(8);
        let log = queue.commit_log();
        feed.publish("a").await.unwrap();

        let entry = queue.next().await.unwrap().unwrap();
        queue.commit(&entry.entry_id).await.unwrap();

        assert_eq!(*log.lock().await, vec!["1".to_string()]);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_without_reclaim_leaves_entries_pending() {
        let (feed, mut queue) = MemoryQueue::channel(8);
        feed.publish("a").await.unwrap();
        drop(feed);

        queue.next().await.unwrap().unwrap();
        assert!(queue.next().await.unwrap().is_none());
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncommitted_entries_are_replayed_after_reclaim_interval() {
        let (feed, queue) = MemoryQueue::channel(8);
        let mut queue = queue.with_reclaim_interval(Duration::from_secs(30));
        feed.publish("a").await.unwrap();
        feed.publish("b").await.unwrap();
        drop(feed);

        let first = queue.next().await.unwrap().unwrap();
        let second = queue.next().await.unwrap().unwrap();
        queue.commit(&second.entry_id).await.unwrap();

        let started = Instant::now();
        let replayed = queue.next().await.unwrap().unwrap();
        assert_eq!(replayed, first);
        assert!(started.elapsed() >= Duration::from_secs(29));

        queue.commit(&replayed.entry_id).await.unwrap();
        assert!(queue.next().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_feed_does_not_delay_replay() {
        let (feed, queue) = MemoryQueue::channel(8);
        let mut queue = queue.with_reclaim_interval(Duration::from_secs(5));
        feed.publish("a").await.unwrap();

        let first = queue.next().await.unwrap().unwrap();
        let replayed = queue.next().await.unwrap().unwrap();
        assert_eq!(replayed.entry_id, first.entry_id);
    }

    #[test]
    fn test_empty_queue_waits_for_an_entry() {
        let (feed, mut queue) = MemoryQueue::channel(8);
        let mut next = tokio_test::task::spawn(queue.next());
        tokio_test::assert_pending!(next.poll());

        feed.tx.try_send("a".to_string()).unwrap();
        assert!(next.is_woken());
        let entry = tokio_test::assert_ready!(next.poll()).unwrap().unwrap();
        assert_eq!(entry.raw.line(), "a");
    }
}

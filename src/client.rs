use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::decode::decode_snapshot;
use crate::error::{DashboardError, StoreError};
use crate::models::Delivery;
use crate::store::SnapshotStore;

/// Where the dashboard sends searches.
pub trait QuerySink {
    /// Starts a live query and returns its sequence number.
    fn subscribe(&mut self, student_id: &str) -> Result<u64, DashboardError>;
}

/// One live query. The pump task is aborted when this is cancelled or dropped.
pub struct Subscription {
    seq: u64,
    id: Uuid,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        debug!(seq = self.seq, subscription = %self.id, "subscription cancelled");
    }
}

/// Holds at most one live query at a time.
pub struct QueryClient {
    store: Arc<dyn SnapshotStore>,
    deliveries: UnboundedSender<Delivery>,
    last_seq: u64,
    current: Option<Subscription>,
}

impl QueryClient {
    pub fn new(store: Arc<dyn SnapshotStore>, deliveries: UnboundedSender<Delivery>) -> Self {
        Self {
            store,
            deliveries,
            last_seq: 0,
            current: None,
        }
    }

    pub fn active_seq(&self) -> Option<u64> {
        self.current.as_ref().map(Subscription::seq)
    }

    pub fn cancel(&mut self) {
        if let Some(subscription) = self.current.take() {
            subscription.cancel();
        }
    }
}

impl QuerySink for QueryClient {
    fn subscribe(&mut self, student_id: &str) -> Result<u64, DashboardError> {
        let student_id = student_id.trim();
        if student_id.is_empty() {
            return Err(DashboardError::Validation);
        }

        self.cancel();
        self.last_seq += 1;
        let seq = self.last_seq;
        let id = Uuid::new_v4();

        info!(seq, subscription = %id, student_id, "opening query");
        let snapshots = self.store.watch(student_id);
        let task = tokio::spawn(pump(seq, id, snapshots, self.deliveries.clone()));

        self.current = Some(Subscription { seq, id, task });
        Ok(seq)
    }
}

impl Drop for QueryClient {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Waits for the first delivery of the client's active query, skipping any
/// left over from earlier ones.
pub async fn first_delivery(
    client: &QueryClient,
    deliveries: &mut UnboundedReceiver<Delivery>,
    wait: Duration,
) -> anyhow::Result<Delivery> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let next = tokio::time::timeout_at(deadline, deliveries.recv())
            .await
            .context("timed out waiting for the Realtime Database")?
            .context("query ended before any data arrived")?;
        if Some(next.seq) == client.active_seq() {
            return Ok(next);
        }
        debug!(seq = next.seq, "skipping delivery from an earlier query");
    }
}

async fn pump(
    seq: u64,
    id: Uuid,
    mut snapshots: futures::stream::BoxStream<'static, Result<Value, StoreError>>,
    deliveries: UnboundedSender<Delivery>,
) {
    let mut delivered = false;
    while let Some(item) = snapshots.next().await {
        let (outcome, fatal) = match item {
            Ok(snapshot) => match decode_snapshot(&snapshot) {
                Ok(records) => {
                    debug!(seq, records = records.len(), "snapshot delivered");
                    (Ok(records), false)
                }
                Err(err) => {
                    error!(seq, subscription = %id, error = %err, "snapshot rejected");
                    (Err(DashboardError::from(err)), false)
                }
            },
            Err(err) => {
                error!(seq, subscription = %id, error = %err, "query stream failed");
                (Err(DashboardError::from(err)), true)
            }
        };

        if deliveries.send(Delivery { seq, outcome }).is_err() || fatal {
            return;
        }
        delivered = true;
    }

    if delivered {
        debug!(seq, subscription = %id, "query stream closed");
    } else {
        error!(seq, subscription = %id, "query stream closed before any snapshot");
        let outcome = Err(DashboardError::fetch("stream closed before any snapshot"));
        let _ = deliveries.send(Delivery { seq, outcome });
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::testing::{wait_closed, FakeStore};
    use super::*;

    fn client() -> (Arc<FakeStore>, QueryClient, UnboundedReceiver<Delivery>) {
        let store = Arc::new(FakeStore::default());
        let (tx, rx) = unbounded_channel();
        let client = QueryClient::new(store.clone(), tx);
        (store, client, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<Delivery>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("channel closed")
    }

    fn snapshot(courses: &[&str]) -> Value {
        let mut entries = serde_json::Map::new();
        for (i, course) in courses.iter().enumerate() {
            entries.insert(
                format!("-N{i}"),
                json!({
                    "name": "Avery Lee",
                    "SID": "S123",
                    "course": course,
                    "section": "A",
                    "timings": "Mon 09:00",
                    "timestamp": "2026-02-02 09:00:00"
                }),
            );
        }
        Value::Object(entries)
    }

    #[tokio::test]
    async fn blank_id_never_reaches_the_store() {
        let (store, mut client, _rx) = client();
        assert_eq!(client.subscribe("   "), Err(DashboardError::Validation));
        assert_eq!(client.subscribe(""), Err(DashboardError::Validation));
        assert!(store.queries().is_empty());
        assert_eq!(client.active_seq(), None);
    }

    #[tokio::test]
    async fn delivers_every_update_with_its_sequence() {
        let (store, mut client, mut rx) = client();
        let seq = client.subscribe(" S123 ").unwrap();
        assert_eq!(store.queries(), vec!["S123".to_string()]);

        let feed = store.feed(0);
        feed.unbounded_send(Ok(snapshot(&["Math", "Physics"]))).unwrap();
        feed.unbounded_send(Ok(Value::Null)).unwrap();

        let first = next(&mut rx).await;
        assert_eq!(first.seq, seq);
        assert_eq!(first.outcome.unwrap().len(), 2);

        let second = next(&mut rx).await;
        assert_eq!(second.outcome, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn malformed_snapshot_is_a_fetch_error_and_stream_stays_open() {
        let (store, mut client, mut rx) = client();
        client.subscribe("S123").unwrap();
        let feed = store.feed(0);

        feed.unbounded_send(Ok(json!({"-N0": {"course": "Math"}})))
            .unwrap();
        assert!(matches!(
            next(&mut rx).await.outcome,
            Err(DashboardError::Fetch { .. })
        ));

        feed.unbounded_send(Ok(snapshot(&["Math"]))).unwrap();
        assert_eq!(next(&mut rx).await.outcome.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_ends_the_subscription() {
        let (store, mut client, mut rx) = client();
        client.subscribe("S123").unwrap();
        let feed = store.feed(0);

        feed.unbounded_send(Err(StoreError::AuthRevoked)).unwrap();
        assert!(matches!(
            next(&mut rx).await.outcome,
            Err(DashboardError::Fetch { .. })
        ));
        assert!(wait_closed(&feed).await);
    }

    #[tokio::test]
    async fn new_search_cancels_the_previous_one() {
        let (store, mut client, _rx) = client();
        let first = client.subscribe("S123").unwrap();
        let second = client.subscribe("S123").unwrap();

        assert!(second > first);
        assert_eq!(client.active_seq(), Some(second));
        assert!(wait_closed(&store.feed(0)).await);
        assert!(!store.feed(1).is_closed());
    }

    #[tokio::test]
    async fn teardown_cancels_the_live_query() {
        let (store, mut client, _rx) = client();
        client.subscribe("S123").unwrap();
        drop(client);
        assert!(wait_closed(&store.feed(0)).await);
    }

    #[tokio::test]
    async fn first_delivery_skips_earlier_queries() {
        let store = Arc::new(FakeStore::default());
        let (tx, mut rx) = unbounded_channel();
        let mut client = QueryClient::new(store.clone(), tx.clone());
        let seq = client.subscribe("S123").unwrap();

        tx.send(Delivery {
            seq: seq + 100,
            outcome: Ok(Vec::new()),
        })
        .unwrap();
        store.feed(0).unbounded_send(Ok(snapshot(&["Math"]))).unwrap();

        let delivery = first_delivery(&client, &mut rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(delivery.seq, seq);
        assert_eq!(delivery.outcome.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_delivery_times_out_without_data() {
        let (_store, mut client, mut rx) = client();
        client.subscribe("S123").unwrap();

        let err = first_delivery(&client, &mut rx, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "timed out waiting for the Realtime Database");
    }

    #[tokio::test]
    async fn stream_closing_before_data_is_a_fetch_error() {
        let (store, mut client, mut rx) = client();
        let seq = client.subscribe("S123").unwrap();
        store.close(0);

        let delivery = first_delivery(&client, &mut rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(delivery.seq, seq);
        assert_eq!(
            delivery.outcome.unwrap_err().to_string(),
            "Error fetching student data"
        );
    }

    #[tokio::test]
    async fn first_delivery_reports_a_closed_channel() {
        let store = Arc::new(FakeStore::default());
        let (tx, mut rx) = unbounded_channel();
        let client = QueryClient::new(store, tx);
        drop(client);

        let other_client = {
            let (tx, _rx) = unbounded_channel();
            QueryClient::new(Arc::new(FakeStore::default()), tx)
        };
        let err = first_delivery(&other_client, &mut rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "query ended before any data arrived");
    }
}

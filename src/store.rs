use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::StoreConfig;
use crate::error::StoreError;

/// A live, filtered view of the attendance collection.
///
/// Every item of the returned stream is the complete current result of the
/// query. Dropping the stream ends the subscription.
pub trait SnapshotStore: Send + Sync {
    fn watch(&self, student_id: &str) -> BoxStream<'static, Result<Value, StoreError>>;
}

/// Realtime Database REST streaming client.
pub struct FirebaseStore {
    http: reqwest::Client,
    config: StoreConfig,
}

impl FirebaseStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn query_url(&self, student_id: &str) -> Result<Url, StoreError> {
        let base = self.config.database_url.as_str().trim_end_matches('/');
        let collection = self.config.collection.trim_matches('/');
        let mut url = Url::parse(&format!("{base}/{collection}.json"))
            .map_err(|err| StoreError::InvalidQuery(err.to_string()))?;

        let order_by = serde_json::to_string(&self.config.id_field)
            .map_err(|err| StoreError::InvalidQuery(err.to_string()))?;
        let equal_to = serde_json::to_string(student_id)
            .map_err(|err| StoreError::InvalidQuery(err.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("orderBy", &order_by);
            pairs.append_pair("equalTo", &equal_to);
            if let Some(token) = &self.config.auth_token {
                pairs.append_pair("auth", token);
            }
        }

        Ok(url)
    }
}

impl SnapshotStore for FirebaseStore {
    fn watch(&self, student_id: &str) -> BoxStream<'static, Result<Value, StoreError>> {
        let url = match self.query_url(student_id) {
            Ok(url) => url,
            Err(err) => return stream::once(async move { Err::<Value, _>(err) }).boxed(),
        };
        let request = self.http.get(url).header(ACCEPT, "text/event-stream");

        let connect = async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(StoreError::Status(status.as_u16()));
            }
            tracing::debug!(status = status.as_u16(), "stream connected");
            Ok::<_, StoreError>(snapshot_stream(response.bytes_stream().boxed()))
        };

        stream::once(connect).try_flatten().boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental server-sent events parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (&*line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[derive(Deserialize)]
struct PathUpdate {
    path: String,
    data: Value,
}

/// Local copy of the query result, kept current by stream events.
#[derive(Debug, Default)]
pub struct SnapshotTree {
    root: Value,
}

impl SnapshotTree {
    /// Applies one event. Returns the new snapshot when the tree changed.
    pub fn apply(&mut self, event: &SseEvent) -> Result<Option<Value>, StoreError> {
        match event.event.as_str() {
            "put" => {
                let update = parse_update(&event.data)?;
                set_path(&mut self.root, &update.path, update.data);
                Ok(Some(self.root.clone()))
            }
            "patch" => {
                let update = parse_update(&event.data)?;
                let Value::Object(children) = update.data else {
                    return Err(StoreError::Malformed(format!(
                        "patch at {} is not an object",
                        update.path
                    )));
                };
                let base = update.path.trim_end_matches('/');
                for (key, value) in children {
                    set_path(&mut self.root, &format!("{base}/{key}"), value);
                }
                Ok(Some(self.root.clone()))
            }
            "keep-alive" => Ok(None),
            "cancel" => Err(StoreError::Cancelled(event.data.clone())),
            "auth_revoked" => Err(StoreError::AuthRevoked),
            other => {
                tracing::debug!(event = other, "ignoring stream event");
                Ok(None)
            }
        }
    }
}

fn parse_update(data: &str) -> Result<PathUpdate, StoreError> {
    serde_json::from_str(data).map_err(|err| StoreError::Malformed(err.to_string()))
}

fn set_path(root: &mut Value, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = data;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = as_object(node)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = as_object(node);
    if data.is_null() {
        map.remove(*last);
    } else {
        map.insert(last.to_string(), data);
    }
}

/// Makes `node` an object in place. Arrays keep their elements under their
/// index keys, minus null holes; scalars are discarded.
fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    let converted = match std::mem::take(node) {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, item)| !item.is_null())
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
        _ => Map::new(),
    };
    *node = Value::Object(converted);
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just set to an object"),
    }
}

struct StreamState<S> {
    bytes: S,
    parser: SseParser,
    tree: SnapshotTree,
    pending: VecDeque<Result<Value, StoreError>>,
    finished: bool,
}

/// Turns a raw event-stream body into a stream of complete snapshots. The
/// stream ends after the first error.
pub fn snapshot_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<Value, StoreError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<StoreError>,
{
    let state = StreamState {
        bytes,
        parser: SseParser::default(),
        tree: SnapshotTree::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in state.parser.feed(chunk.as_ref()) {
                        match state.tree.apply(&event) {
                            Ok(Some(snapshot)) => state.pending.push_back(Ok(snapshot)),
                            Ok(None) => {}
                            Err(err) => {
                                state.pending.push_back(Err(err));
                                state.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    state.pending.push_back(Err(err.into()));
                    state.finished = true;
                }
                None => return None,
            }
        }
    })
}

//! End-to-end realtime pipeline tests: workers polling a generator source
//! and fanning records out across a stage DAG.

use std::sync::Arc;
use std::time::Duration;

use aqueduct_engine::config::parser;
use aqueduct_engine::dataset::{DatasetStore, InMemoryDatasetStore};
use aqueduct_engine::{deploy, PluginRegistry, Worker};
use aqueduct_state::{SqliteStateBackend, StateBackend};
use aqueduct_types::record::Value;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

fn deploy_worker(yaml: &str, datasets: Arc<InMemoryDatasetStore>) -> Worker {
    let config = parser::parse_pipeline_str(yaml).expect("pipeline should parse");
    let state = Arc::new(SqliteStateBackend::in_memory().expect("state backend"));
    let app = deploy(
        config,
        Arc::new(PluginRegistry::with_builtins()),
        datasets as Arc<dyn DatasetStore>,
        state as Arc<dyn StateBackend>,
    )
    .expect("pipeline should deploy");
    app.worker()
        .expect("realtime pipeline should produce a worker")
        .with_poll_interval(POLL_INTERVAL)
}

/// Poll until `check` passes or the timeout elapses.
async fn wait_until<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if check() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Generator to stream sink with two instances: events accumulate with the
/// generator's body and header, and start/stop are idempotent.
#[tokio::test]
async fn test_stream_sink_worker_lifecycle() {
    let yaml = r#"
version: "1.0"
pipeline: rt_stream
trigger:
  type: realtime
  instances: 2
sources:
  - name: gen
    plugin: data-generator
    properties:
      type: stream
sinks:
  - name: out
    plugin: stream
    properties:
      dataset: events
"#;
    let datasets = Arc::new(InMemoryDatasetStore::new());
    let mut worker = deploy_worker(yaml, Arc::clone(&datasets));

    assert!(!worker.is_running());
    worker.start().unwrap();
    assert!(worker.is_running());
    // Second start while running is a no-op.
    worker.start().unwrap();

    let store = Arc::clone(&datasets);
    wait_until("stream events", move || {
        store
            .read_events("events")
            .map(|events| events.len() >= 3)
            .unwrap_or(false)
    })
    .await;

    worker.stop().await;
    assert!(!worker.is_running());
    // Second stop is a no-op.
    worker.stop().await;

    let events = datasets.read_events("events").unwrap();
    assert!(events.len() >= 3);
    for event in &events {
        assert_eq!(event.body, b"Hello".to_vec());
        assert_eq!(event.headers.get("h1"), Some(&"v1".to_string()));
    }

    // No instance writes after stop.
    let count = datasets.read_events("events").unwrap().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(datasets.read_events("events").unwrap().len(), count);
}

/// A worker can be restarted after a stop.
#[tokio::test]
async fn test_worker_restart() {
    let yaml = r#"
version: "1.0"
pipeline: rt_restart
trigger:
  type: realtime
sources:
  - name: gen
    plugin: data-generator
sinks:
  - name: out
    plugin: stream
    properties:
      dataset: events
"#;
    let datasets = Arc::new(InMemoryDatasetStore::new());
    let mut worker = deploy_worker(yaml, Arc::clone(&datasets));

    worker.start().unwrap();
    let store = Arc::clone(&datasets);
    wait_until("first batch of events", move || {
        store.read_events("events").map(|e| !e.is_empty()).unwrap_or(false)
    })
    .await;
    worker.stop().await;

    let count = datasets.read_events("events").unwrap().len();
    worker.start().unwrap();
    let store = Arc::clone(&datasets);
    wait_until("events after restart", move || {
        store
            .read_events("events")
            .map(|e| e.len() > count)
            .unwrap_or(false)
    })
    .await;
    worker.stop().await;
}

/// DAG fan-out: the sink fed straight from the generator sees the original
/// record while the sink behind the script transform sees the rewritten
/// one. Edges are independent; the transform's changes never leak into the
/// sibling branch.
#[tokio::test]
async fn test_dag_fan_out_keeps_edges_independent() {
    let yaml = r#"
version: "1.0"
pipeline: rt_dag
trigger:
  type: realtime
sources:
  - name: gen
    plugin: data-generator
    properties:
      type: table
transforms:
  - name: rewrite
    plugin: script
    properties:
      set.name: Rob
      set.id: "2"
sinks:
  - name: original
    plugin: table
    properties:
      dataset: table1
      row.key.field: binary
  - name: rewritten
    plugin: table
    properties:
      dataset: table2
      row.key.field: binary
connections:
  - from: gen
    to: original
  - from: gen
    to: rewrite
  - from: rewrite
    to: rewritten
"#;
    let datasets = Arc::new(InMemoryDatasetStore::new());
    let mut worker = deploy_worker(yaml, Arc::clone(&datasets));
    worker.start().unwrap();

    let store = Arc::clone(&datasets);
    wait_until("both tables populated", move || {
        store.scan_rows("table1").map(|r| !r.is_empty()).unwrap_or(false)
            && store.scan_rows("table2").map(|r| !r.is_empty()).unwrap_or(false)
    })
    .await;
    worker.stop().await;

    let row = datasets.get_row("table1", b"Bob").unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&Value::String("Bob".into())));
    assert_eq!(row.get("id"), Some(&Value::Int(1)));
    assert_eq!(row.get("score"), Some(&Value::Double(3.4)));
    assert_eq!(row.get("graduated"), Some(&Value::Boolean(false)));
    assert!(!row.contains_key("binary"));

    let row = datasets.get_row("table2", b"Bob").unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&Value::String("Rob".into())));
    assert_eq!(row.get("id"), Some(&Value::Int(2)));
}

/// Realtime lookup: the script transform reads the key-value dataset on
/// every poll tick.
#[tokio::test]
async fn test_realtime_script_lookup() {
    let yaml = r#"
version: "1.0"
pipeline: rt_lookup
trigger:
  type: realtime
sources:
  - name: gen
    plugin: data-generator
    properties:
      type: table
transforms:
  - name: greet
    plugin: script
    properties:
      set.name: "${name}..hi..${lookup(lookupTable, name)}"
sinks:
  - name: out
    plugin: table
    properties:
      dataset: outputTable
      row.key.field: binary
"#;
    let datasets = Arc::new(InMemoryDatasetStore::new());
    datasets.put_kv("lookupTable", "Bob", "123").unwrap();
    let mut worker = deploy_worker(yaml, Arc::clone(&datasets));
    worker.start().unwrap();

    let store = Arc::clone(&datasets);
    wait_until("lookup output", move || {
        store
            .scan_rows("outputTable")
            .map(|r| !r.is_empty())
            .unwrap_or(false)
    })
    .await;
    worker.stop().await;

    let row = datasets.get_row("outputTable", b"Bob").unwrap().unwrap();
    assert_eq!(
        row.get("name"),
        Some(&Value::String("Bob..hi..123".into()))
    );
}

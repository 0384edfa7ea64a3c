use crate::{
    driver::TransferDriver,
    encoder::EncodingFormat,
    error::CopyError,
    session::{CopySession, IterSource, SessionParams, run},
};
use async_trait::async_trait;
use engine_config::settings::{BatchSettings, options::TextFormat};
use engine_core::{
    connectors::{
        ConnectionMode, ConnectionOpener, ConnectionRegistry, CopyResult, DestinationConnection,
        FlushStatus, Interest, ReadStatus, Readiness, ReadinessWait, SelectReadiness,
    },
    error::{IndexError, TransportError},
    metrics::Metrics,
    partition::{InMemoryPartitionIndex, PartitionIndex},
};
use model::{
    core::{
        data_type::DataType,
        identifiers::DestinationKey,
        value::{FieldValue, Value},
    },
    partition::{Chunk, Dimension, Point},
    records::{column::ColumnSpec, row::RowData},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

const HOUR: i64 = 3_600_000_000;

type Events = Arc<Mutex<Vec<String>>>;

/// Scripted behavior and observed calls of one mock data node.
#[derive(Debug)]
struct NodeState {
    mode: ConnectionMode,
    blocking: bool,
    flush_pending: usize,
    read_pending: usize,
    stuck: bool,
    ready_delay: Duration,
    end_results: Vec<CopyResult>,
    fail_put_end: bool,
    copy_in: bool,
    end_sent: bool,
    results: VecDeque<CopyResult>,
    data: Vec<u8>,
    commands: Vec<String>,
    cycles: usize,
    put_ends: usize,
    end_copies: usize,
    flush_calls: usize,
    read_calls: usize,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Idle,
            blocking: true,
            flush_pending: 0,
            read_pending: 0,
            stuck: false,
            ready_delay: Duration::from_millis(1),
            end_results: vec![CopyResult::CommandOk { rows: None }],
            fail_put_end: false,
            copy_in: false,
            end_sent: false,
            results: VecDeque::new(),
            data: Vec::new(),
            commands: Vec::new(),
            cycles: 0,
            put_ends: 0,
            end_copies: 0,
            flush_calls: 0,
            read_calls: 0,
        }
    }
}

type Node = Arc<Mutex<NodeState>>;

struct MockConnection {
    key: DestinationKey,
    state: Node,
    events: Events,
}

#[async_trait]
impl DestinationConnection for MockConnection {
    fn key(&self) -> &DestinationKey {
        &self.key
    }

    fn mode(&self) -> ConnectionMode {
        self.state.lock().unwrap().mode
    }

    fn set_mode(&mut self, mode: ConnectionMode) {
        self.state.lock().unwrap().mode = mode;
    }

    fn in_copy(&self) -> bool {
        self.state.lock().unwrap().copy_in
    }

    async fn begin_copy(&mut self, command: &str, _binary: bool) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.cycles += 1;
        state.commands.push(command.to_string());
        state.mode = ConnectionMode::BulkTransfer;
        state.copy_in = true;
        state.blocking = false;
        Ok(())
    }

    async fn put_copy_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.mode != ConnectionMode::BulkTransfer {
            return Err(TransportError::Rejected {
                destination: self.key.clone(),
                message: "not in COPY".into(),
            });
        }
        state.data.extend_from_slice(data);
        Ok(())
    }

    fn put_copy_end(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_put_end {
            return Err(TransportError::Io {
                destination: self.key.clone(),
                source: std::io::Error::other("connection reset"),
            });
        }
        state.put_ends += 1;
        state.copy_in = false;
        state.end_sent = true;
        self.events
            .lock()
            .unwrap()
            .push(format!("end:{}", self.key.node));
        Ok(())
    }

    fn try_flush(&mut self) -> Result<FlushStatus, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.flush_calls += 1;
        if state.flush_pending > 0 {
            state.flush_pending -= 1;
            return Ok(FlushStatus::Pending);
        }
        Ok(FlushStatus::Flushed)
    }

    fn try_read(&mut self) -> Result<ReadStatus, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.read_calls += 1;
        if state.stuck {
            return Ok(ReadStatus::WouldBlock);
        }
        if state.read_pending > 0 {
            state.read_pending -= 1;
            return Ok(ReadStatus::WouldBlock);
        }
        if state.end_sent {
            state.end_sent = false;
            let results = state.end_results.clone();
            state.results.extend(results);
        }
        Ok(ReadStatus::Ready)
    }

    async fn ready(&self, _interest: Interest) -> Result<(), TransportError> {
        let (stuck, delay) = {
            let state = self.state.lock().unwrap();
            (state.stuck, state.ready_delay)
        };
        if stuck {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn set_blocking(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().blocking = true;
        Ok(())
    }

    fn next_result(&mut self) -> Option<CopyResult> {
        self.state.lock().unwrap().results.pop_front()
    }

    async fn end_copy(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.end_copies += 1;
        state.copy_in = false;
        state.mode = ConnectionMode::Idle;
        state.blocking = true;
        Ok(())
    }
}

#[derive(Default)]
struct MockOpener {
    nodes: Mutex<HashMap<String, Node>>,
    opened: AtomicUsize,
    events: Events,
}

impl MockOpener {
    fn node(&self, name: &str) -> Node {
        self.nodes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn data(&self, name: &str) -> String {
        String::from_utf8(self.node(name).lock().unwrap().data.clone()).unwrap()
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionOpener for MockOpener {
    async fn open(
        &self,
        key: &DestinationKey,
    ) -> Result<Box<dyn DestinationConnection>, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            key: key.clone(),
            state: self.node(key.node.as_str()),
            events: self.events.clone(),
        }))
    }
}

/// In-memory index that records chunk creations into the shared event log.
struct CountingIndex {
    inner: InMemoryPartitionIndex,
    creates: AtomicUsize,
    marks: AtomicUsize,
    events: Events,
}

#[async_trait]
impl PartitionIndex for CountingIndex {
    async fn find_chunk_for_point(&self, point: &Point) -> Result<Option<Chunk>, IndexError> {
        self.inner.find_chunk_for_point(point).await
    }

    async fn create_chunk_for_point(&self, point: &Point) -> Result<Chunk, IndexError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push("create".into());
        self.inner.create_chunk_for_point(point).await
    }

    async fn mark_unordered(&self, chunk: &Chunk) -> Result<(), IndexError> {
        self.marks.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_unordered(chunk).await
    }
}

#[derive(Default)]
struct CountingReadiness {
    waits: AtomicUsize,
}

#[async_trait]
impl Readiness for CountingReadiness {
    async fn wait<'a>(
        &self,
        waits: &[ReadinessWait<'a>],
        timeout: Duration,
    ) -> Result<bool, TransportError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        SelectReadiness.wait(waits, timeout).await
    }
}

struct Harness {
    opener: Arc<MockOpener>,
    index: Arc<CountingIndex>,
    readiness: Arc<CountingReadiness>,
    cancel: CancellationToken,
}

impl Harness {
    fn new(nodes: &[&str]) -> Self {
        let opener = Arc::new(MockOpener::default());
        let index = Arc::new(CountingIndex {
            inner: InMemoryPartitionIndex::new(
                vec![Dimension::open("time", HOUR)],
                nodes.iter().map(|n| (*n).into()).collect(),
                1,
            ),
            creates: AtomicUsize::new(0),
            marks: AtomicUsize::new(0),
            events: opener.events.clone(),
        });
        Self {
            opener,
            index,
            readiness: Arc::new(CountingReadiness::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn session(&self, max_rows: usize) -> CopySession {
        let params = SessionParams {
            table: "conditions".into(),
            columns: vec![
                ColumnSpec::new("time", DataType::Long),
                ColumnSpec::new("value", DataType::Int),
            ],
            dimensions: vec![Dimension::open("time", HOUR)],
            format: EncodingFormat::Text(TextFormat::default()),
            command: r#"COPY "public"."conditions" FROM STDIN"#.into(),
            principal: "postgres".into(),
            batch: BatchSettings {
                max_rows,
                ..BatchSettings::default()
            },
            poll_timeout: Duration::from_millis(10),
            index: self.index.clone(),
            opener: self.opener.clone(),
            readiness: self.readiness.clone(),
            cancel: self.cancel.clone(),
        };
        CopySession::begin(params).unwrap()
    }

    fn waits(&self) -> usize {
        self.readiness.waits.load(Ordering::SeqCst)
    }
}

fn row(time: Option<i64>, value: i64) -> RowData {
    RowData::new(
        "conditions",
        vec![
            FieldValue::new("time", time.map(Value::Int), DataType::Long),
            FieldValue::new("value", Some(Value::Int(value)), DataType::Long),
        ],
    )
}

fn rows(points: impl IntoIterator<Item = (i64, i64)>) -> IterSource<std::vec::IntoIter<RowData>> {
    IterSource::new(
        points
            .into_iter()
            .map(|(time, value)| row(Some(time), value))
            .collect::<Vec<_>>(),
    )
}

#[tokio::test]
async fn test_all_ready_flush_completes_in_one_pass() {
    let harness = Harness::new(&["dn1", "dn2"]);
    let session = harness.session(1024);

    let summary = run(session, &mut rows([(0, 1), (HOUR, 2)])).await.unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(harness.waits(), 0);
    for name in ["dn1", "dn2"] {
        let node = harness.opener.node(name);
        let state = node.lock().unwrap();
        assert_eq!(state.put_ends, 1);
        assert_eq!(state.flush_calls, 1);
        assert_eq!(state.mode, ConnectionMode::Idle);
        assert!(state.blocking);
        assert!(state.results.is_empty());
    }
}

#[tokio::test]
async fn test_slow_destination_only_delays_itself() {
    let harness = Harness::new(&["dn1", "dn2"]);
    harness.opener.node("dn1").lock().unwrap().flush_pending = 3;
    let session = harness.session(1024);

    run(session, &mut rows([(0, 1), (HOUR, 2)])).await.unwrap();

    assert_eq!(harness.waits(), 3);
    let slow = harness.opener.node("dn1");
    let fast = harness.opener.node("dn2");
    assert_eq!(slow.lock().unwrap().flush_calls, 4);
    assert_eq!(fast.lock().unwrap().flush_calls, 1);
    assert_eq!(fast.lock().unwrap().read_calls, 1);
    assert_eq!(slow.lock().unwrap().mode, ConnectionMode::Idle);
}

#[tokio::test]
async fn test_pending_reads_are_waited_on() {
    let harness = Harness::new(&["dn1"]);
    harness.opener.node("dn1").lock().unwrap().read_pending = 2;
    let session = harness.session(1024);

    run(session, &mut rows([(0, 1)])).await.unwrap();

    assert_eq!(harness.waits(), 2);
    assert_eq!(harness.opener.node("dn1").lock().unwrap().read_calls, 3);
}

#[tokio::test]
async fn test_failed_completion_is_reported_and_connection_reset() {
    let harness = Harness::new(&["dn1"]);
    harness.opener.node("dn1").lock().unwrap().end_results = vec![CopyResult::Failed {
        message: "disk full".into(),
    }];
    let session = harness.session(1024);

    let err = run(session, &mut rows([(0, 1)])).await.unwrap_err();

    assert!(matches!(err, CopyError::Remote { ref message, .. } if message == "disk full"));
    let node = harness.opener.node("dn1");
    assert_eq!(node.lock().unwrap().mode, ConnectionMode::Idle);
    assert!(node.lock().unwrap().blocking);
}

#[tokio::test]
async fn test_trailing_result_is_a_protocol_violation() {
    let harness = Harness::new(&["dn1"]);
    harness.opener.node("dn1").lock().unwrap().end_results = vec![
        CopyResult::CommandOk { rows: None },
        CopyResult::CommandOk { rows: None },
    ];
    let session = harness.session(1024);

    let err = run(session, &mut rows([(0, 1)])).await.unwrap_err();
    assert!(matches!(err, CopyError::ProtocolStateViolation { .. }));
}

#[tokio::test]
async fn test_missing_result_is_a_protocol_violation() {
    let harness = Harness::new(&["dn1"]);
    harness.opener.node("dn1").lock().unwrap().end_results = vec![CopyResult::CopyIn];
    let session = harness.session(1024);

    let err = run(session, &mut rows([(0, 1)])).await.unwrap_err();
    assert!(matches!(err, CopyError::ProtocolStateViolation { .. }));
}

#[tokio::test]
async fn test_cancellation_interrupts_a_stuck_flush() {
    let harness = Harness::new(&["dn1"]);
    harness.opener.node("dn1").lock().unwrap().stuck = true;
    let session = harness.session(1024);

    let cancel = harness.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let err = run(session, &mut rows([(0, 1)])).await.unwrap_err();

    assert!(matches!(err, CopyError::Cancelled));
    let node = harness.opener.node("dn1");
    assert_eq!(node.lock().unwrap().mode, ConnectionMode::Idle);
    assert!(node.lock().unwrap().blocking);
}

#[tokio::test]
async fn test_batch_limit_splits_dispatch_cycles() {
    let harness = Harness::new(&["dn1"]);
    let session = harness.session(1024);

    let summary = run(session, &mut rows((0..1025).map(|i| (i, i))))
        .await
        .unwrap();

    assert_eq!(summary.rows, 1025);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.chunks_created, 1);

    let expected: String = (0..1025).map(|i| format!("{i}\t{i}\n")).collect();
    assert_eq!(harness.opener.data("dn1"), expected);

    let node = harness.opener.node("dn1");
    assert_eq!(node.lock().unwrap().cycles, 1);
    assert_eq!(node.lock().unwrap().put_ends, 1);
}

#[tokio::test]
async fn test_missing_chunk_flushes_once_before_creation() {
    let harness = Harness::new(&["dn1", "dn2"]);
    let session = harness.session(2);

    let summary = run(session, &mut rows([(0, 1), (1, 2), (HOUR, 3), (2 * HOUR, 4)]))
        .await
        .unwrap();

    assert_eq!(harness.index.creates.load(Ordering::SeqCst), 3);
    assert_eq!(
        harness.opener.events(),
        vec!["create", "end:dn1", "create", "create", "end:dn2", "end:dn1"]
    );
    assert_eq!(summary.flushes, 2);
    assert_eq!(harness.opener.node("dn1").lock().unwrap().cycles, 2);
    assert_eq!(harness.opener.data("dn1"), "0\t1\n1\t2\n7200000000\t4\n");
    assert_eq!(harness.opener.data("dn2"), "3600000000\t3\n");
}

#[tokio::test]
async fn test_null_time_is_rejected_before_batching() {
    let harness = Harness::new(&["dn1"]);
    let session = harness.session(1024);

    let mut source = IterSource::new(vec![row(Some(0), 1), row(None, 2)]);
    let err = run(session, &mut source).await.unwrap_err();

    assert!(matches!(err, CopyError::PartitioningViolation { .. }));
    assert_eq!(harness.opener.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rows_keep_source_order_per_destination() {
    let harness = Harness::new(&["dn1", "dn2"]);
    let session = harness.session(4);

    let input: Vec<(i64, i64)> = (0..10)
        .map(|i| if i % 2 == 0 { (i, i) } else { (HOUR + i, i) })
        .collect();
    run(session, &mut rows(input.clone())).await.unwrap();

    let expected = |hour_start: i64| -> String {
        input
            .iter()
            .filter(|(t, _)| t / HOUR == hour_start)
            .map(|(t, v)| format!("{t}\t{v}\n"))
            .collect()
    };
    assert_eq!(harness.opener.data("dn1"), expected(0));
    assert_eq!(harness.opener.data("dn2"), expected(1));
}

#[tokio::test]
async fn test_compressed_chunk_is_marked_unordered_once() {
    let harness = Harness::new(&["dn1"]);
    let chunk = harness
        .index
        .inner
        .create_chunk_for_point(&Point::new(vec![0]))
        .await
        .unwrap();
    harness.index.inner.compress_chunk(chunk.id).await.unwrap();
    let session = harness.session(1);

    let summary = run(session, &mut rows([(0, 1), (5, 2)])).await.unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.chunks_created, 0);
    assert_eq!(harness.index.marks.load(Ordering::SeqCst), 1);
    let stored = harness.index.inner.chunks().await;
    assert!(stored[0].is_unordered());
}

#[tokio::test]
async fn test_failed_end_still_ends_remaining_connections() {
    let harness = Harness::new(&["dn1", "dn2"]);
    harness.opener.node("dn1").lock().unwrap().fail_put_end = true;
    let session = harness.session(1024);

    let err = run(session, &mut rows([(0, 1), (HOUR, 2)])).await.unwrap_err();

    assert!(matches!(err, CopyError::Transport { .. }));
    for name in ["dn1", "dn2"] {
        let node = harness.opener.node(name);
        assert_eq!(node.lock().unwrap().end_copies, 1);
        assert_eq!(node.lock().unwrap().mode, ConnectionMode::Idle);
    }
}

#[tokio::test]
async fn test_routed_rows_bypass_batching() {
    let harness = Harness::new(&["dn1", "dn2"]);
    let mut session = harness.session(1024);
    let destinations = [
        DestinationKey::new("dn1", "postgres"),
        DestinationKey::new("dn2", "postgres"),
    ];

    session
        .send_routed_row(&row(Some(0), 1), &destinations)
        .await
        .unwrap();
    session
        .send_routed_row(&row(Some(1), 2), &destinations)
        .await
        .unwrap();
    session.end().await.unwrap();

    assert_eq!(session.summary().rows, 2);
    assert_eq!(session.registry().len(), 0);
    for name in ["dn1", "dn2"] {
        assert_eq!(harness.opener.data(name), "0\t1\n1\t2\n");
        let node = harness.opener.node(name);
        assert_eq!(node.lock().unwrap().cycles, 1);
        assert_eq!(node.lock().unwrap().put_ends, 1);
    }
}

fn driver() -> TransferDriver {
    TransferDriver::new(
        "COPY t FROM STDIN".into(),
        false,
        Arc::new(SelectReadiness),
        Duration::from_millis(10),
        CancellationToken::new(),
        Metrics::new(),
    )
}

#[tokio::test]
async fn test_activation_is_idempotent() {
    let opener = Arc::new(MockOpener::default());
    let mut registry = ConnectionRegistry::new(opener.clone());
    let mut driver = driver();
    let key = DestinationKey::new("dn1", "postgres");

    driver
        .send_routed(&mut registry, b"a\n", std::slice::from_ref(&key))
        .await
        .unwrap();
    driver
        .send_routed(&mut registry, b"b\n", std::slice::from_ref(&key))
        .await
        .unwrap();

    assert_eq!(driver.active().len(), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(opener.node("dn1").lock().unwrap().cycles, 1);
}

#[tokio::test]
async fn test_completing_connection_cannot_take_rows() {
    let opener = Arc::new(MockOpener::default());
    opener.node("dn1").lock().unwrap().mode = ConnectionMode::Completing;
    let mut registry = ConnectionRegistry::new(opener.clone());
    let mut driver = driver();

    let err = driver
        .send_routed(&mut registry, b"a\n", &[DestinationKey::new("dn1", "postgres")])
        .await
        .unwrap_err();

    assert!(matches!(err, CopyError::ProtocolStateViolation { .. }));
    assert!(opener.node("dn1").lock().unwrap().data.is_empty());
}

#[tokio::test]
async fn test_flush_without_active_connections_is_a_no_op() {
    let opener = Arc::new(MockOpener::default());
    let mut registry = ConnectionRegistry::new(opener);
    let mut driver = driver();

    assert_eq!(driver.flush_all(&mut registry).await.unwrap(), 0);
    driver.end_remaining(&mut registry).await.unwrap();
}

#[tokio::test]
async fn test_stale_copy_mode_is_a_protocol_violation() {
    let opener = Arc::new(MockOpener::default());
    let mut registry = ConnectionRegistry::new(opener.clone());
    let mut driver = driver();

    driver
        .send_routed(&mut registry, b"a\n", &[DestinationKey::new("dn1", "postgres")])
        .await
        .unwrap();
    // The node dropped out of COPY behind the connection's back.
    opener.node("dn1").lock().unwrap().copy_in = false;

    let err = driver.flush_all(&mut registry).await.unwrap_err();
    assert!(matches!(err, CopyError::ProtocolStateViolation { ref message, .. }
        if message.contains("no COPY is in progress")));

    driver.end_remaining(&mut registry).await.unwrap();
    let node = opener.node("dn1");
    let state = node.lock().unwrap();
    assert_eq!(state.mode, ConnectionMode::Idle);
    assert_eq!(state.put_ends, 0);
    assert_eq!(state.end_copies, 0);
}

/// Cancels the copy once a fixed number of rows has been handed out.
struct CancellingSource {
    rows: std::vec::IntoIter<RowData>,
    served: usize,
    cancel_after: usize,
    cancel: CancellationToken,
}

#[async_trait]
impl crate::session::RowSource for CancellingSource {
    async fn next_row(&mut self) -> Result<Option<RowData>, CopyError> {
        if self.served == self.cancel_after {
            self.cancel.cancel();
        }
        self.served += 1;
        Ok(self.rows.next())
    }
}

#[tokio::test]
async fn test_cancellation_stops_the_stream_between_rows() {
    let harness = Harness::new(&["dn1"]);
    let session = harness.session(2);
    let mut source = CancellingSource {
        rows: (0..5).map(|i| row(Some(i), i)).collect::<Vec<_>>().into_iter(),
        served: 0,
        cancel_after: 2,
        cancel: harness.cancel.clone(),
    };

    let err = run(session, &mut source).await.unwrap_err();

    assert!(matches!(err, CopyError::Cancelled));
    assert_eq!(source.served, 3);
    assert_eq!(harness.opener.data("dn1"), "0\t0\n1\t1\n");
    let node = harness.opener.node("dn1");
    let state = node.lock().unwrap();
    assert_eq!(state.cycles, 1);
    assert_eq!(state.put_ends, 1);
    assert_eq!(state.mode, ConnectionMode::Idle);
    assert!(state.blocking);
}

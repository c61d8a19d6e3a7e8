use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::{net::TcpListener, sync::oneshot};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status, transport::Server};

use crate::{
    config::{
        Compression, FailurePolicy, JobConfig, ListenAddr, ReduceMode, WorkerAddr, WorkerConfig,
        WorkerSet,
    },
    error::JobError,
    logformats::Combined,
    mr::{
        master::Master,
        rpc::{MapReduceService, MapReduceServiceServer, proto},
        worker::{Worker, WorkerService},
    },
    mrrt::sequential,
};

const SCENARIO_A: &[u8] = b"a - - [d] \"GET /x\" 200 10 \"-\" \"-\"\n\
b - - [d] \"GET /y\" 200 5 \"-\" \"-\"\n\
c - - [d] \"GET /z\" 404 3 \"-\" \"-\"\n";

fn expected_a() -> BTreeMap<String, i64> {
    [("200".to_string(), 2), ("404".to_string(), 1)].into()
}

fn generated_log(lines: usize) -> Vec<u8> {
    let statuses = [200, 200, 200, 301, 304, 404, 500, 503];
    let mut log = Vec::new();
    for i in 0..lines {
        if i % 97 == 0 {
            log.extend_from_slice(b"this line is not an access log entry\n");
        }
        let line = format!(
            "192.168.{}.{} - user{} [19/Oct/2026:10:{:02}:00 +0000] \"GET /item/{} HTTP/1.1\" {} {} \"https://example.com/\" \"agent/{}\"\n",
            i % 5,
            i % 250,
            i % 13,
            i % 60,
            i,
            statuses[i % statuses.len()],
            i * 7,
            i % 3
        );
        log.extend_from_slice(line.as_bytes());
    }
    log
}

/// Worker process stand-in. Keep the returned sender alive for as long as
/// the worker should run.
async fn spawn_worker() -> (WorkerAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let worker = Worker::new(WorkerConfig::new(ListenAddr::Tcp(addr)));
    tokio::spawn(worker.serve_tcp(listener, async move {
        stopped.await.ok();
    }));
    (addr.to_string().parse().unwrap(), stop)
}

#[derive(Clone, Default)]
struct Probe {
    seen: Arc<std::sync::Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl Probe {
    fn seen(&self) -> Vec<String> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort();
        seen
    }
}

/// Wraps the real service to record calls, delay them or fail them.
struct ProbeService {
    inner: WorkerService,
    probe: Probe,
    delay: Duration,
    fail: bool,
}

impl ProbeService {
    fn new(probe: &Probe) -> Self {
        ProbeService {
            inner: WorkerService::new(Arc::new(Combined::new().unwrap())),
            probe: probe.clone(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[tonic::async_trait]
impl MapReduceService for ProbeService {
    async fn process_map(
        &self,
        request: Request<proto::MapRequest>,
    ) -> Result<Response<proto::MapResponse>, Status> {
        self.probe
            .seen
            .lock()
            .unwrap()
            .push(request.get_ref().chunk_id.clone());
        let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(Status::internal("injected failure"));
        }
        let reply = self.inner.process_map(request).await;
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
        reply
    }

    async fn process_reduce(
        &self,
        request: Request<proto::ReduceRequest>,
    ) -> Result<Response<proto::ReduceResponse>, Status> {
        self.inner.process_reduce(request).await
    }
}

async fn spawn_probe(service: ProbeService) -> (WorkerAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(
        Server::builder()
            .add_service(MapReduceServiceServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                stopped.await.ok();
            }),
    );
    (addr.to_string().parse().unwrap(), stop)
}

fn master(workers: Vec<WorkerAddr>, chunk_size: usize) -> JobConfig {
    JobConfig::new(WorkerSet::new(workers).unwrap()).chunk_size(chunk_size)
}

#[tokio::test]
async fn scenario_a_single_chunk() {
    let (w, _stop) = spawn_worker().await;
    let report = Master::new(master(vec![w], 1 << 20))
        .unwrap()
        .run(SCENARIO_A)
        .await
        .unwrap();
    assert_eq!(report.totals, expected_a());
    assert_eq!(report.chunks, 1);
    assert_eq!(report.partial_results, 2);
    assert_eq!(report.bytes, SCENARIO_A.len() as u64);
}

#[tokio::test]
async fn scenario_b_split_across_two_workers() {
    let (p0, p1) = (Probe::default(), Probe::default());
    let (w0, _stop0) = spawn_probe(ProbeService::new(&p0)).await;
    let (w1, _stop1) = spawn_probe(ProbeService::new(&p1)).await;

    // 40 byte reads put every line in its own chunk
    let report = Master::new(master(vec![w0, w1], 40))
        .unwrap()
        .run(SCENARIO_A)
        .await
        .unwrap();
    assert_eq!(report.totals, expected_a());
    assert_eq!(report.chunks, 3);
    assert_eq!(p0.seen(), vec!["chunk-0", "chunk-2"]);
    assert_eq!(p1.seen(), vec!["chunk-1"]);
}

#[tokio::test]
async fn scenario_c_malformed_lines_are_counted_not_fatal() {
    let (w, _stop) = spawn_worker().await;
    let mut log = SCENARIO_A.to_vec();
    log.extend_from_slice(b"\nd - - [d] 200 10 \"-\" \"-\"\n\n");
    let report = Master::new(master(vec![w], 1 << 20))
        .unwrap()
        .run(&log[..])
        .await
        .unwrap();
    assert_eq!(report.totals, expected_a());
    assert_eq!(report.skipped_lines, 1);
}

#[tokio::test]
async fn scenario_d_unreachable_worker_aborts_the_job() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead: WorkerAddr = listener.local_addr().unwrap().to_string().parse().unwrap();
    drop(listener);
    let (alive, _stop) = spawn_worker().await;

    let res = Master::new(master(vec![alive, dead.clone()], 40))
        .unwrap()
        .run(SCENARIO_A)
        .await;
    match res {
        Err(JobError::Transport { worker, .. }) => assert_eq!(worker, dead.to_string()),
        other => panic!("expected a transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn error_reply_aborts_the_job() {
    let (ok, bad) = (Probe::default(), Probe::default());
    let (w0, _stop0) = spawn_probe(ProbeService::new(&ok)).await;
    let (w1, _stop1) = spawn_probe(ProbeService::new(&bad).failing()).await;

    let res = Master::new(master(vec![w0, w1], 40))
        .unwrap()
        .run(SCENARIO_A)
        .await;
    match res {
        Err(JobError::Rpc { call, status, .. }) => {
            assert_eq!(call, "chunk-1");
            assert_eq!(status.code(), tonic::Code::Internal);
        }
        other => panic!("expected an rpc error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_policy_does_not_wait_for_slow_calls() {
    let (slow, bad) = (Probe::default(), Probe::default());
    let (w0, _stop0) = spawn_probe(ProbeService::new(&slow).delay(Duration::from_secs(10))).await;
    let (w1, _stop1) = spawn_probe(ProbeService::new(&bad).failing()).await;

    let started = Instant::now();
    let res = Master::new(
        master(vec![w0, w1], 40).failure_policy(FailurePolicy::CancelInFlight),
    )
    .unwrap()
    .run(SCENARIO_A)
    .await;
    assert!(matches!(res, Err(JobError::Rpc { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(slow.finished.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn drain_policy_waits_for_in_flight_calls() {
    let (slow, bad) = (Probe::default(), Probe::default());
    let (w0, _stop0) =
        spawn_probe(ProbeService::new(&slow).delay(Duration::from_millis(300))).await;
    let (w1, _stop1) = spawn_probe(ProbeService::new(&bad).failing()).await;

    // two chunks: chunk-0 to the slow worker, chunk-1 to the failing one
    let log = &SCENARIO_A[..68];
    let res = Master::new(master(vec![w0, w1], 40).failure_policy(FailurePolicy::DrainInFlight))
        .unwrap()
        .run(log)
        .await;
    assert!(matches!(res, Err(JobError::Rpc { .. })));
    assert_eq!(slow.seen(), vec!["chunk-0"]);
    assert_eq!(slow.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_calls_respect_the_bound() {
    let probe = Probe::default();
    let (w, _stop) =
        spawn_probe(ProbeService::new(&probe).delay(Duration::from_millis(20))).await;
    let log = generated_log(200);

    let report = Master::new(master(vec![w], 512).max_in_flight(Some(2)))
        .unwrap()
        .run(&log[..])
        .await
        .unwrap();
    assert!(report.chunks > 10);
    assert_eq!(probe.finished.load(Ordering::SeqCst) as u64, report.chunks);
    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unbounded_dispatch_runs_chunks_concurrently() {
    let probe = Probe::default();
    let (w, _stop) =
        spawn_probe(ProbeService::new(&probe).delay(Duration::from_millis(100))).await;
    let log = generated_log(100);

    let report = Master::new(master(vec![w], 1024))
        .unwrap()
        .run(&log[..])
        .await
        .unwrap();
    assert!(report.chunks > 2);
    assert!(probe.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn hung_worker_hits_the_rpc_timeout() {
    let probe = Probe::default();
    let (w, _stop) = spawn_probe(ProbeService::new(&probe).delay(Duration::from_secs(30))).await;

    let res = Master::new(master(vec![w], 1 << 20).rpc_timeout(Some(Duration::from_millis(200))))
        .unwrap()
        .run(SCENARIO_A)
        .await;
    assert!(matches!(res, Err(JobError::Rpc { .. })), "{:?}", res);
}

#[tokio::test]
async fn remote_reduce_matches_local_reduce() {
    let (w0, _stop0) = spawn_worker().await;
    let (w1, _stop1) = spawn_worker().await;
    let log = generated_log(500);

    let local = Master::new(master(vec![w0.clone(), w1.clone()], 2048))
        .unwrap()
        .run(&log[..])
        .await
        .unwrap();
    let remote = Master::new(master(vec![w0, w1.clone()], 2048).reduce(ReduceMode::Remote(w1)))
        .unwrap()
        .run(&log[..])
        .await
        .unwrap();
    assert_eq!(local.totals, remote.totals);
    assert_eq!(local, remote);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distributed_totals_match_sequential_run() {
    let (w0, _stop0) = spawn_worker().await;
    let (w1, _stop1) = spawn_worker().await;
    let (w2, _stop2) = spawn_worker().await;
    let log = generated_log(3000);

    let expected = sequential::run(&Combined::new().unwrap(), &log[..], 1 << 20)
        .await
        .unwrap();
    for chunk_size in [300, 4096, 65536] {
        let report = Master::new(master(vec![w0.clone(), w1.clone(), w2.clone()], chunk_size))
            .unwrap()
            .run(&log[..])
            .await
            .unwrap();
        assert_eq!(report.totals, expected.totals, "chunk_size {}", chunk_size);
        assert_eq!(report.skipped_lines, expected.skipped_lines);
        assert_eq!(report.totals.values().sum::<i64>(), 3000);
    }
}

#[tokio::test]
async fn compressed_requests_are_accepted() {
    let (w, _stop) = spawn_worker().await;
    for compression in [Compression::Gzip, Compression::Zstd] {
        let report = Master::new(master(vec![w.clone()], 64).compression(Some(compression)))
            .unwrap()
            .run(SCENARIO_A)
            .await
            .unwrap();
        assert_eq!(report.totals, expected_a());
    }
}

#[tokio::test]
async fn workers_over_unix_sockets() {
    let path = std::env::temp_dir().join(format!("statusmr-test-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let worker = Worker::new(WorkerConfig::new(ListenAddr::Unix(path.clone())));
    tokio::spawn(worker.serve_unix(listener, async move {
        stopped.await.ok();
    }));

    let addr: WorkerAddr = format!("unix:{}", path.display()).parse().unwrap();
    let report = Master::new(master(vec![addr], 40))
        .unwrap()
        .run(SCENARIO_A)
        .await
        .unwrap();
    assert_eq!(report.totals, expected_a());

    drop(stop);
    let _ = std::fs::remove_file(&path);
}

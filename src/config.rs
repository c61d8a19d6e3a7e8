//! Job and worker configuration.
//!
//! Everything here is built once at startup and passed by value into the
//! master or worker; nothing is mutated while a job runs.

use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use tonic::codec::CompressionEncoding;

use crate::{error::JobError, logformats, util};

pub const DEFAULT_CHUNK_SIZE: usize = 50 * 1024 * 1024;
/// Room for protobuf framing on top of the chunk bytes.
pub const MESSAGE_HEADROOM: usize = 1024 * 1024;
/// A chunk carries at most one chunk-size read plus a leftover partial line
/// shorter than the chunk size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 2 * DEFAULT_CHUNK_SIZE + MESSAGE_HEADROOM;
pub const DEFAULT_WORKER_ADDR: &str = "127.0.0.1:50051";

/// Network address of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkerAddr {
    /// `http://host:port`
    Tcp(String),
    Unix(PathBuf),
}

impl fmt::Display for WorkerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerAddr::Tcp(uri) => f.write_str(uri),
            WorkerAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for WorkerAddr {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        util::parse_worker_addr(s)
    }
}

/// Address a worker listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp(addr) => write!(f, "{}", addr),
            ListenAddr::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for ListenAddr {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        util::parse_listen_addr(s)
    }
}

/// Ordered, fixed, non-empty list of workers shared read-only by every
/// dispatch task.
#[derive(Debug, Clone)]
pub struct WorkerSet(Arc<[WorkerAddr]>);

impl WorkerSet {
    pub fn new(addrs: Vec<WorkerAddr>) -> Result<Self, JobError> {
        if addrs.is_empty() {
            return Err(JobError::config("worker set is empty"));
        }
        Ok(WorkerSet(addrs.into()))
    }

    pub fn parse<I, S>(addrs: I) -> Result<Self, JobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addrs = addrs
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(addrs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Round-robin: chunk `id` goes to `workers[id % len]`.
    pub fn index_for(&self, chunk_id: u64) -> usize {
        (chunk_id % self.0.len() as u64) as usize
    }

    pub fn assign(&self, chunk_id: u64) -> &WorkerAddr {
        &self.0[self.index_for(chunk_id)]
    }

    pub fn get(&self, index: usize) -> Option<&WorkerAddr> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerAddr> {
        self.0.iter()
    }
}

/// What the dispatcher does with in-flight calls once one chunk has failed.
/// Either way the job returns the first error and no partial results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort every in-flight call right away.
    #[default]
    CancelInFlight,
    /// Stop issuing chunks but let in-flight calls run to completion first.
    DrainInFlight,
}

impl FromStr for FailurePolicy {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(FailurePolicy::CancelInFlight),
            "drain" => Ok(FailurePolicy::DrainInFlight),
            _ => Err(JobError::config(format!("unknown failure policy: {}", s))),
        }
    }
}

/// Where the reduce phase runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReduceMode {
    #[default]
    Local,
    /// Delegate to a worker through `ProcessReduce`.
    Remote(WorkerAddr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

impl Compression {
    pub fn encoding(self) -> CompressionEncoding {
        match self {
            Compression::Gzip => CompressionEncoding::Gzip,
            Compression::Zstd => CompressionEncoding::Zstd,
        }
    }
}

impl FromStr for Compression {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gzip" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(JobError::config(format!("unknown compression: {}", s))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub workers: WorkerSet,
    pub chunk_size: usize,
    /// `None` spawns one call per chunk with no cap.
    pub max_in_flight: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub reduce: ReduceMode,
    pub max_message_size: usize,
    /// `None` means calls may block forever on a hung worker.
    pub rpc_timeout: Option<Duration>,
    pub compression: Option<Compression>,
}

impl JobConfig {
    pub fn new(workers: WorkerSet) -> Self {
        JobConfig {
            workers,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_in_flight: None,
            failure_policy: FailurePolicy::default(),
            reduce: ReduceMode::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            rpc_timeout: None,
            compression: None,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn reduce(mut self, mode: ReduceMode) -> Self {
        self.reduce = mode;
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn rpc_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.workers.is_empty() {
            return Err(JobError::config("worker set is empty"));
        }
        if self.chunk_size == 0 {
            return Err(JobError::config("chunk size must be positive"));
        }
        if self.max_in_flight == Some(0) {
            return Err(JobError::config("max in-flight calls must be positive"));
        }
        Ok(())
    }

    /// Message size limit for both directions, never smaller than the
    /// largest chunk this job can produce.
    pub fn message_limit(&self) -> usize {
        let largest_chunk = self
            .chunk_size
            .saturating_mul(2)
            .saturating_add(MESSAGE_HEADROOM);
        self.max_message_size.max(largest_chunk)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub listen: ListenAddr,
    /// Name of the log format, see [`logformats::get_format`].
    pub format: String,
    pub max_message_size: usize,
}

impl WorkerConfig {
    pub fn new(listen: ListenAddr) -> Self {
        WorkerConfig {
            listen,
            format: logformats::DEFAULT_FORMAT.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

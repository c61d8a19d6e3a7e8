use std::{fmt, io};

/// Failure of a job stage.
///
/// Infrastructure failures end the job. Malformed log lines never show up
/// here: they are counted as skipped lines by the map phase instead.
#[derive(Debug)]
pub enum JobError {
    /// The input stream could not be opened or read.
    Input(io::Error),
    /// The job or worker configuration is unusable.
    Config(String),
    /// A connection to a worker could not be established.
    Transport {
        /// Address of the worker.
        worker: String,
        source: tonic::transport::Error,
    },
    /// A worker answered a call with an error status.
    Rpc {
        /// Name of the failed call, `chunk-<id>` for map calls.
        call: String,
        /// Address of the worker.
        worker: String,
        status: tonic::Status,
    },
    /// A dispatch task panicked.
    Task(String),
    /// A worker listener could not be bound.
    Bind { addr: String, source: io::Error },
    /// The worker gRPC server stopped with an error.
    Serve(tonic::transport::Error),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Input(e) => write!(f, "failed to read input: {}", e),
            JobError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            JobError::Transport { worker, source } => {
                write!(f, "failed to connect to worker {}: {}", worker, source)
            }
            JobError::Rpc { call, worker, status } => write!(
                f,
                "{} failed on worker {}: {} ({:?})",
                call,
                worker,
                status.message(),
                status.code()
            ),
            JobError::Task(msg) => write!(f, "dispatch task failed: {}", msg),
            JobError::Bind { addr, source } => write!(f, "failed to bind {}: {}", addr, source),
            JobError::Serve(e) => write!(f, "worker server failed: {}", e),
        }
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobError::Input(e) => Some(e),
            JobError::Transport { source, .. } => Some(source),
            JobError::Rpc { status, .. } => Some(status),
            JobError::Bind { source, .. } => Some(source),
            JobError::Serve(e) => Some(e),
            JobError::Config(_) | JobError::Task(_) => None,
        }
    }
}

impl JobError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        JobError::Config(msg.into())
    }

    /// Whether the failure came from talking to a worker.
    pub fn is_remote(&self) -> bool {
        matches!(self, JobError::Transport { .. } | JobError::Rpc { .. })
    }
}

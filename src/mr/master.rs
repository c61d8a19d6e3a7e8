use std::{fmt, path::Path};

use serde::Serialize;
use tokio::io::AsyncRead;
use tonic::Request;

use super::{
    chunker::LineChunker,
    dispatcher::{self, Dispatcher},
    reducer::{self, Totals},
    rpc::{self, proto},
    PartialResult,
};
use crate::{
    config::{JobConfig, ReduceMode, WorkerAddr},
    error::JobError,
};

/// Outcome of one job.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Final count per status code.
    pub totals: Totals,
    pub chunks: u64,
    pub bytes: u64,
    pub partial_results: usize,
    /// Lines that did not match the log format.
    pub skipped_lines: u64,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, total) in &self.totals {
            writeln!(f, "{} {}", key, total)?;
        }
        Ok(())
    }
}

/// Drives a job: chunk the input, map every chunk on the workers, reduce.
pub struct Master {
    config: JobConfig,
}

impl Master {
    pub fn new(config: JobConfig) -> Result<Self, JobError> {
        config.validate()?;
        Ok(Master { config })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<JobReport, JobError> {
        let path = path.as_ref();
        log::info!("Processing log file: {}", path.display());
        let file = tokio::fs::File::open(path).await.map_err(JobError::Input)?;
        self.run(file).await
    }

    pub async fn run<R>(&self, input: R) -> Result<JobReport, JobError>
    where
        R: AsyncRead + Unpin,
    {
        log::info!(
            "Master starting: {} workers, {} byte chunks",
            self.config.workers.len(),
            self.config.chunk_size
        );
        let chunks = LineChunker::new(input, self.config.chunk_size).into_stream();
        let outcome = Dispatcher::new(&self.config).run(chunks).await?;
        log::info!(
            "Finished reading the input: {} chunks, {} bytes",
            outcome.chunks,
            outcome.bytes
        );
        if outcome.skipped_lines > 0 {
            log::warn!("{} lines did not match the log format", outcome.skipped_lines);
        }

        let partial_results = outcome.partials.len();
        let totals = match &self.config.reduce {
            ReduceMode::Local => reducer::reduce(&outcome.partials),
            ReduceMode::Remote(addr) => self.remote_reduce(addr, outcome.partials).await?,
        };
        log::info!("Final aggregated results: {:?}", totals);

        Ok(JobReport {
            totals,
            chunks: outcome.chunks,
            bytes: outcome.bytes,
            partial_results,
            skipped_lines: outcome.skipped_lines,
        })
    }

    async fn remote_reduce(
        &self,
        addr: &WorkerAddr,
        partials: Vec<PartialResult>,
    ) -> Result<Totals, JobError> {
        log::info!("Reducing {} partial results on {}", partials.len(), addr);
        let channel = rpc::connect(addr)
            .await
            .map_err(|source| JobError::Transport {
                worker: addr.to_string(),
                source,
            })?;
        let mut client = dispatcher::client(
            channel,
            self.config.message_limit(),
            self.config.compression,
        );
        let reply = client
            .process_reduce(Request::new(proto::ReduceRequest {
                partial_results: partials,
            }))
            .await
            .map_err(|status| JobError::Rpc {
                call: "reduce".to_string(),
                worker: addr.to_string(),
                status,
            })?;
        Ok(reducer::from_aggregated(reply.into_inner().results))
    }
}

use std::{pin::pin, sync::Arc, time::Duration};

use futures::{Stream, StreamExt};
use tokio::{
    sync::{Mutex, OnceCell, Semaphore},
    task::{JoinError, JoinSet},
};
use tonic::{transport::Channel, Request, Status};

use super::{
    rpc::{self, proto, MapReduceServiceClient},
    Chunk, PartialResult,
};
use crate::{
    config::{Compression, FailurePolicy, JobConfig, WorkerAddr, WorkerSet},
    error::JobError,
};

/// Call settings shared by every dispatch task.
#[derive(Debug, Clone)]
struct CallOptions {
    message_limit: usize,
    rpc_timeout: Option<Duration>,
    compression: Option<Compression>,
}

/// Everything the dispatch tasks write, behind a single lock.
#[derive(Default)]
struct Collected {
    partials: Vec<PartialResult>,
    skipped_lines: u64,
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub partials: Vec<PartialResult>,
    pub chunks: u64,
    pub bytes: u64,
    /// Lines the workers could not parse.
    pub skipped_lines: u64,
}

/// Fans chunks out to the worker set and gathers the partial results.
///
/// Chunk `i` goes to `workers[i % n]`. Each chunk gets its own task as soon as
/// it is produced; channels are opened lazily, one per worker slot, and shared
/// by all calls to that slot.
pub struct Dispatcher {
    workers: WorkerSet,
    channels: Arc<[OnceCell<Channel>]>,
    max_in_flight: Option<usize>,
    failure_policy: FailurePolicy,
    options: CallOptions,
}

impl Dispatcher {
    pub fn new(config: &JobConfig) -> Self {
        let channels = (0..config.workers.len())
            .map(|_| OnceCell::new())
            .collect::<Vec<_>>();
        Dispatcher {
            workers: config.workers.clone(),
            channels: channels.into(),
            max_in_flight: config.max_in_flight,
            failure_policy: config.failure_policy,
            options: CallOptions {
                message_limit: config.message_limit(),
                rpc_timeout: config.rpc_timeout,
                compression: config.compression,
            },
        }
    }

    /// Dispatches every chunk of `chunks` and waits for all of them.
    ///
    /// The first failure, from the chunk stream or from a worker, stops
    /// dispatching and becomes the result; what happens to calls still in
    /// flight depends on the failure policy. Partial results are only
    /// returned when every chunk succeeded.
    pub async fn run<S>(&self, chunks: S) -> Result<DispatchOutcome, JobError>
    where
        S: Stream<Item = Result<Chunk, JobError>>,
    {
        let collected = Arc::new(Mutex::new(Collected::default()));
        let limit = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();
        let mut chunks = pin!(chunks);
        let mut failure = None;
        let mut dispatched = 0u64;
        let mut bytes = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            let permit = match &limit {
                Some(sem) => Some(
                    sem.clone()
                        .acquire_owned()
                        .await
                        .map_err(|e| JobError::Task(e.to_string()))?,
                ),
                None => None,
            };
            // surface failures of earlier chunks before issuing more work
            while let Some(res) = tasks.try_join_next() {
                if let Some(e) = settle(res) {
                    failure = Some(e);
                    break;
                }
            }
            if failure.is_some() {
                break;
            }

            let index = self.workers.index_for(chunk.id());
            let worker = self.workers.assign(chunk.id()).clone();
            dispatched += 1;
            bytes += chunk.len() as u64;
            log::debug!("Dispatching chunk#{} to {}", chunk.id(), worker);

            let channels = self.channels.clone();
            let options = self.options.clone();
            let collected = collected.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let channel = channel_for(&channels[index], &worker).await?;
                let reply = process_map(channel, &worker, chunk, &options).await?;
                let mut collected = collected.lock().await;
                collected.partials.extend(reply.partial_results);
                collected.skipped_lines += reply.skipped_lines;
                Ok::<_, JobError>(())
            });
        }

        if failure.is_some() && self.failure_policy == FailurePolicy::CancelInFlight {
            tasks.abort_all();
        }
        while let Some(res) = tasks.join_next().await {
            if let Some(e) = settle(res) {
                if failure.is_none() {
                    if self.failure_policy == FailurePolicy::CancelInFlight {
                        tasks.abort_all();
                    }
                    failure = Some(e);
                } else {
                    log::debug!("Ignoring later failure: {}", e);
                }
            }
        }

        if let Some(e) = failure {
            log::error!("Aborting job after {} dispatched chunks: {}", dispatched, e);
            return Err(e);
        }

        let collected = std::mem::take(&mut *collected.lock().await);
        log::info!(
            "Collected {} partial results from {} chunks",
            collected.partials.len(),
            dispatched
        );
        Ok(DispatchOutcome {
            partials: collected.partials,
            chunks: dispatched,
            bytes,
            skipped_lines: collected.skipped_lines,
        })
    }
}

/// Error carried by a finished task, if any. Tasks aborted by the failure
/// policy are not errors of their own.
fn settle(res: Result<Result<(), JobError>, JoinError>) -> Option<JobError> {
    match res {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) if e.is_cancelled() => None,
        Err(e) => Some(JobError::Task(e.to_string())),
    }
}

async fn channel_for(cell: &OnceCell<Channel>, worker: &WorkerAddr) -> Result<Channel, JobError> {
    let channel = cell
        .get_or_try_init(|| async {
            log::info!("Connecting to worker {}", worker);
            rpc::connect(worker)
                .await
                .map_err(|source| JobError::Transport {
                    worker: worker.to_string(),
                    source,
                })
        })
        .await?;
    Ok(channel.clone())
}

pub(crate) fn client(
    channel: Channel,
    message_limit: usize,
    compression: Option<Compression>,
) -> MapReduceServiceClient<Channel> {
    let mut client = MapReduceServiceClient::new(channel)
        .max_decoding_message_size(message_limit)
        .max_encoding_message_size(message_limit);
    if let Some(compression) = compression {
        client = client
            .send_compressed(compression.encoding())
            .accept_compressed(compression.encoding());
    }
    client
}

async fn process_map(
    channel: Channel,
    worker: &WorkerAddr,
    chunk: Chunk,
    options: &CallOptions,
) -> Result<proto::MapResponse, JobError> {
    let mut client = client(channel, options.message_limit, options.compression);
    let chunk_id = chunk.wire_id();
    let mut request = Request::new(proto::MapRequest {
        chunk_id: chunk_id.clone(),
        log_data: chunk.into_data(),
    });
    let call = match options.rpc_timeout {
        Some(timeout) => {
            request.set_timeout(timeout);
            tokio::time::timeout(timeout, client.process_map(request))
                .await
                .unwrap_or_else(|_| Err(Status::deadline_exceeded("map call timed out")))
        }
        None => client.process_map(request).await,
    };
    let reply = call
        .map_err(|status| JobError::Rpc {
            call: chunk_id.clone(),
            worker: worker.to_string(),
            status,
        })?
        .into_inner();
    log::debug!(
        "{} done on {}: {} keys, {} skipped lines",
        chunk_id,
        worker,
        reply.partial_results.len(),
        reply.skipped_lines
    );
    Ok(reply)
}

use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tonic::{async_trait, codec::CompressionEncoding, transport::Server, Request, Response, Status};

use super::{
    map::map_chunk,
    reducer,
    rpc::{proto, MapReduceService, MapReduceServiceServer},
    LogFormat,
};
use crate::{
    config::{ListenAddr, WorkerConfig},
    error::JobError,
    logformats::get_format,
};

/// The map and reduce calls a worker process serves.
#[derive(Clone)]
pub struct WorkerService {
    format: Arc<dyn LogFormat>,
}

impl WorkerService {
    pub fn new(format: Arc<dyn LogFormat>) -> Self {
        WorkerService { format }
    }
}

#[async_trait]
impl MapReduceService for WorkerService {
    async fn process_map(
        &self,
        request: Request<proto::MapRequest>,
    ) -> Result<Response<proto::MapResponse>, Status> {
        let proto::MapRequest { chunk_id, log_data } = request.into_inner();
        log::info!("Received map request for {} ({} bytes)", chunk_id, log_data.len());

        // parsing a chunk is CPU bound and can take a while for large chunks
        let format = self.format.clone();
        let output = tokio::task::spawn_blocking(move || map_chunk(format.as_ref(), &log_data))
            .await
            .map_err(|e| Status::internal(format!("map task for {} failed: {}", chunk_id, e)))?;

        if output.skipped_lines > 0 {
            log::warn!(
                "{}: skipped {} lines not in {} format",
                chunk_id,
                output.skipped_lines,
                self.format.name()
            );
        }
        let skipped_lines = output.skipped_lines;
        Ok(Response::new(proto::MapResponse {
            partial_results: output.into_partial_results(),
            skipped_lines,
        }))
    }

    async fn process_reduce(
        &self,
        request: Request<proto::ReduceRequest>,
    ) -> Result<Response<proto::ReduceResponse>, Status> {
        let request = request.into_inner();
        log::info!(
            "Received reduce request with {} partial results",
            request.partial_results.len()
        );
        let totals = reducer::reduce(&request.partial_results);
        Ok(Response::new(proto::ReduceResponse {
            results: reducer::to_aggregated(&totals),
        }))
    }
}

/// A worker process: one gRPC server hosting [`WorkerService`].
pub struct Worker {
    config: WorkerConfig,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Worker { config }
    }

    fn server(&self) -> Result<MapReduceServiceServer<WorkerService>, JobError> {
        let format = get_format(&self.config.format)?;
        log::info!("Worker parsing {} log lines", format.name());
        Ok(MapReduceServiceServer::new(WorkerService::new(format))
            .max_decoding_message_size(self.config.max_message_size)
            .max_encoding_message_size(self.config.max_message_size)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Zstd))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), JobError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.listen.clone();
        let bind_err = |source: std::io::Error| JobError::Bind {
            addr: addr.to_string(),
            source,
        };
        match &addr {
            ListenAddr::Tcp(sock) => {
                let listener = TcpListener::bind(sock).await.map_err(bind_err)?;
                self.serve_tcp(listener, shutdown).await
            }
            ListenAddr::Unix(path) => {
                // stale socket from an earlier run
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path).map_err(bind_err)?;
                let res = self.serve_unix(listener, shutdown).await;
                let _ = std::fs::remove_file(path);
                res
            }
        }
    }

    pub async fn serve_tcp<F>(self, listener: TcpListener, shutdown: F) -> Result<(), JobError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = self.server()?;
        if let Ok(addr) = listener.local_addr() {
            log::info!("Worker listening on {}", addr);
        }
        Server::builder()
            .add_service(server)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
            .map_err(JobError::Serve)?;
        log::info!("Worker exiting");
        Ok(())
    }

    pub async fn serve_unix<F>(self, listener: UnixListener, shutdown: F) -> Result<(), JobError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = self.server()?;
        log::info!("Worker listening on {}", self.config.listen);
        Server::builder()
            .add_service(server)
            .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
            .await
            .map_err(JobError::Serve)?;
        log::info!("Worker exiting");
        Ok(())
    }
}

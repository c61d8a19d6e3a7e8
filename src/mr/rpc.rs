use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::config::WorkerAddr;

pub mod proto {
    //! Wire messages of the `statusmr.MapReduceService` gRPC service and the
    //! client/server stubs generated for it by `build.rs`.

    #[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
    pub struct PartialResult {
        #[prost(string, tag = "1")]
        pub key: ::prost::alloc::string::String,
        #[prost(int64, tag = "2")]
        pub count: i64,
    }

    #[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
    pub struct AggregatedResult {
        #[prost(string, tag = "1")]
        pub key: ::prost::alloc::string::String,
        #[prost(int64, tag = "2")]
        pub total_count: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MapRequest {
        #[prost(string, tag = "1")]
        pub chunk_id: ::prost::alloc::string::String,
        #[prost(bytes = "vec", tag = "2")]
        pub log_data: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MapResponse {
        #[prost(message, repeated, tag = "1")]
        pub partial_results: ::prost::alloc::vec::Vec<PartialResult>,
        #[prost(uint64, tag = "2")]
        pub skipped_lines: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ReduceRequest {
        #[prost(message, repeated, tag = "1")]
        pub partial_results: ::prost::alloc::vec::Vec<PartialResult>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ReduceResponse {
        #[prost(message, repeated, tag = "1")]
        pub results: ::prost::alloc::vec::Vec<AggregatedResult>,
    }

    include!(concat!(env!("OUT_DIR"), "/statusmr.MapReduceService.rs"));
}

pub use proto::map_reduce_service_client::MapReduceServiceClient;
pub use proto::map_reduce_service_server::{MapReduceService, MapReduceServiceServer};

/// Opens a channel to `addr`. The connection is established before this
/// returns, so an unreachable worker fails here.
pub async fn connect(addr: &WorkerAddr) -> Result<Channel, tonic::transport::Error> {
    match addr {
        WorkerAddr::Tcp(uri) => Endpoint::from_shared(uri.clone())?.connect().await,
        WorkerAddr::Unix(path) => {
            let path = path.clone();
            // the uri is ignored by the connector
            Endpoint::from_static("http://[::1]:50051")
                .connect_with_connector(service_fn(move |_: Uri| {
                    let path = path.clone();
                    async move {
                        let stream = UnixStream::connect(path).await?;
                        Ok::<_, std::io::Error>(hyper_util::rt::TokioIo::new(stream))
                    }
                }))
                .await
        }
    }
}

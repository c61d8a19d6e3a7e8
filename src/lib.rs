//! Distributed counting of HTTP status codes in access logs.
//!
//! The master cuts a log into line-aligned chunks, sends each chunk to a
//! worker over gRPC (`ProcessMap`), and sums the per-chunk counts the workers
//! send back. See [`mr::master::Master`] and [`mr::worker::Worker`].

pub mod config;
pub mod error;
pub mod logformats;
pub mod mr;
pub mod mrrt;
mod util;

#[cfg(test)]
mod test_mr;

pub use config::{
    Compression, FailurePolicy, JobConfig, ListenAddr, ReduceMode, WorkerAddr, WorkerConfig,
    WorkerSet,
};
pub use error::JobError;

// address parsing

use std::{net::SocketAddr, path::PathBuf};

use tonic::transport::Uri;

use crate::{
    config::{ListenAddr, WorkerAddr},
    error::JobError,
};

const UNIX_PREFIX: &str = "unix:";

pub(crate) fn parse_worker_addr(s: &str) -> Result<WorkerAddr, JobError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(JobError::config("empty worker address"));
    }
    if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
        return unix_path(path).map(WorkerAddr::Unix);
    }
    let uri = if s.contains("://") {
        s.to_string()
    } else {
        format!("http://{}", s)
    };
    uri.parse::<Uri>()
        .map_err(|e| JobError::config(format!("bad worker address {:?}: {}", s, e)))?;
    Ok(WorkerAddr::Tcp(uri))
}

pub(crate) fn parse_listen_addr(s: &str) -> Result<ListenAddr, JobError> {
    let s = s.trim();
    if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
        return unix_path(path).map(ListenAddr::Unix);
    }
    s.parse::<SocketAddr>()
        .map(ListenAddr::Tcp)
        .map_err(|e| JobError::config(format!("bad listen address {:?}: {}", s, e)))
}

fn unix_path(path: &str) -> Result<PathBuf, JobError> {
    // unix:///tmp/x and unix:/tmp/x name the same socket
    let path = path.trim_start_matches("//");
    if path.is_empty() {
        return Err(JobError::config("empty unix socket path"));
    }
    Ok(PathBuf::from(path))
}

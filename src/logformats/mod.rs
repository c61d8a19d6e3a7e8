mod combined;
mod common;

use std::sync::Arc;

pub use combined::Combined;
pub use common::Common;

use crate::{error::JobError, mr::LogFormat};

pub const DEFAULT_FORMAT: &str = "combined";

pub fn get_format(name: &str) -> Result<Arc<dyn LogFormat>, JobError> {
    let format: Arc<dyn LogFormat> = match name {
        "combined" => Arc::new(Combined::new()?),
        "common" => Arc::new(Common::new()?),
        _ => return Err(JobError::config(format!("unknown log format: {}", name))),
    };
    Ok(format)
}

fn compile(pattern: &str) -> Result<regex::Regex, JobError> {
    regex::Regex::new(pattern).map_err(|e| JobError::config(format!("bad log pattern: {}", e)))
}

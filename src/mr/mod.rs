pub mod chunker;
pub mod dispatcher;
pub mod map;
pub mod master;
pub mod reducer;
pub mod rpc;
pub mod worker;

pub use rpc::proto::{AggregatedResult, PartialResult};

/// A line-safe slice of the input log.
///
/// Ids start at 0 and follow read order. The bytes never change after the
/// chunker hands the chunk out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    id: u64,
    data: Vec<u8>,
}

impl Chunk {
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        Chunk { id, data }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Id as sent over the wire.
    pub fn wire_id(&self) -> String {
        format!("chunk-{}", self.id)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Grammar that pulls the status code out of one access-log line.
pub trait LogFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the line does not match the grammar.
    fn status_code<'a>(&self, line: &'a str) -> Option<&'a str>;
}

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Chunk;
use crate::error::JobError;

const LINE_TERMINATOR: u8 = b'\n';

/// Splits a byte stream into chunks that end on a line terminator.
///
/// Each step reads up to `chunk_size` fresh bytes, prepends the partial line
/// left over from the previous step and cuts after the last `\n`. When the
/// fresh bytes hold no terminator at all the chunker keeps reading, so a line
/// longer than `chunk_size` ends up whole in one oversized chunk. At end of
/// stream whatever is left is emitted, terminated or not.
pub struct LineChunker<R> {
    reader: R,
    chunk_size: usize,
    leftover: Vec<u8>,
    next_id: u64,
    done: bool,
}

impl<R: AsyncRead + Unpin> LineChunker<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        LineChunker {
            reader,
            chunk_size: chunk_size.max(1),
            leftover: Vec::new(),
            next_id: 0,
            done: false,
        }
    }

    /// Next chunk in read order, `None` once the stream is exhausted.
    /// After a read error the chunker is finished.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, JobError> {
        if self.done {
            return Ok(None);
        }

        let mut buf = std::mem::take(&mut self.leftover);
        // the leftover never holds a terminator
        let mut searched = buf.len();
        loop {
            let eof = self.fill(&mut buf).await?;
            if eof {
                self.done = true;
                if buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.emit(buf)));
            }

            if let Some(pos) = buf[searched..].iter().rposition(|&b| b == LINE_TERMINATOR) {
                self.leftover = buf.split_off(searched + pos + 1);
                return Ok(Some(self.emit(buf)));
            }
            log::debug!(
                "no line terminator in {} bytes, reading on for chunk#{}",
                buf.len(),
                self.next_id
            );
            searched = buf.len();
        }
    }

    /// Appends up to `chunk_size` bytes to `buf`, retrying short reads.
    /// Returns whether the end of the stream was reached.
    async fn fill(&mut self, buf: &mut Vec<u8>) -> Result<bool, JobError> {
        let start = buf.len();
        let end = start + self.chunk_size;
        buf.resize(end, 0);

        let mut filled = start;
        let mut eof = false;
        while filled < end {
            match self.reader.read(&mut buf[filled..end]).await {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Err(JobError::Input(e));
                }
            }
        }
        buf.truncate(filled);
        Ok(eof)
    }

    fn emit(&mut self, data: Vec<u8>) -> Chunk {
        let chunk = Chunk::new(self.next_id, data);
        self.next_id += 1;
        log::debug!("chunk#{}: {} bytes", chunk.id(), chunk.len());
        chunk
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Result<Chunk, JobError>> {
        async_stream::try_stream! {
            while let Some(chunk) = self.next_chunk().await? {
                yield chunk;
            }
        }
    }
}

use tokio::io::AsyncRead;

use crate::{
    error::JobError,
    mr::{
        LogFormat,
        chunker::LineChunker,
        map::map_chunk,
        master::JobReport,
        reducer::{self, Totals},
    },
};

/// Runs chunking, map and reduce in this process, one chunk after another.
pub async fn run<R>(format: &dyn LogFormat, input: R, chunk_size: usize) -> Result<JobReport, JobError>
where
    R: AsyncRead + Unpin,
{
    let mut chunker = LineChunker::new(input, chunk_size);
    let mut report = JobReport::default();
    let mut totals = Totals::new();
    while let Some(chunk) = chunker.next_chunk().await? {
        let output = map_chunk(format, chunk.data());
        report.chunks += 1;
        report.bytes += chunk.len() as u64;
        report.skipped_lines += output.skipped_lines;
        let partials = output.into_partial_results();
        report.partial_results += partials.len();
        reducer::merge_into(&mut totals, &partials);
    }
    report.totals = totals;
    Ok(report)
}

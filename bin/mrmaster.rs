use std::time::Duration;

use clap::Parser;
use statusmr::{
    Compression, FailurePolicy, JobConfig, ReduceMode, WorkerAddr, WorkerSet,
    config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_WORKER_ADDR},
    mr::master::Master,
};

#[derive(Parser)]
#[command(name = "mrmaster", about = "Count HTTP status codes of an access log on remote workers")]
struct Args {
    /// Path to the log file
    #[arg(long)]
    file: String,
    /// Worker address, repeat for more workers (host:port, http://host:port or unix:/path)
    #[arg(long = "worker", default_value = DEFAULT_WORKER_ADDR)]
    workers: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Cap on concurrent map calls, unbounded when absent
    #[arg(long)]
    max_in_flight: Option<usize>,
    /// cancel or drain
    #[arg(long, default_value = "cancel")]
    on_failure: FailurePolicy,
    /// Run the reduce phase on this worker instead of locally
    #[arg(long)]
    reduce_on: Option<WorkerAddr>,
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,
    /// Per-call deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// gzip or zstd
    #[arg(long)]
    compression: Option<Compression>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let workers = WorkerSet::parse(&args.workers)?;
    let reduce = match args.reduce_on {
        Some(addr) => ReduceMode::Remote(addr),
        None => ReduceMode::Local,
    };
    let config = JobConfig::new(workers)
        .chunk_size(args.chunk_size)
        .max_in_flight(args.max_in_flight)
        .failure_policy(args.on_failure)
        .reduce(reduce)
        .max_message_size(args.max_message_size)
        .rpc_timeout(args.timeout_ms.map(Duration::from_millis))
        .compression(args.compression);

    let report = Master::new(config)?.run_file(&args.file).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

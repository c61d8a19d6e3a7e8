use clap::Parser;
use statusmr::{
    ListenAddr, WorkerConfig,
    config::DEFAULT_MAX_MESSAGE_SIZE,
    logformats::DEFAULT_FORMAT,
    mr::worker::Worker,
};

#[derive(Parser)]
#[command(name = "mrworker")]
struct Args {
    /// host:port or unix:/path
    #[arg(long, default_value = "0.0.0.0:50051")]
    listen: ListenAddr,
    /// Log format: combined or common
    #[arg(long, default_value = DEFAULT_FORMAT)]
    format: String,
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = WorkerConfig::new(args.listen)
        .format(args.format)
        .max_message_size(args.max_message_size);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("Shutting down");
    };
    Worker::new(config).run(shutdown).await?;

    Ok(())
}

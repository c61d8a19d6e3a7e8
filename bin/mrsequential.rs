use clap::Parser;
use statusmr::{config::DEFAULT_CHUNK_SIZE, logformats, mrrt::sequential};

#[derive(Parser)]
#[command(name = "mrsequential")]
struct Args {
    input_files: Vec<String>,
    #[arg(long, default_value = logformats::DEFAULT_FORMAT)]
    format: String,
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    let args = Args::try_parse()?;
    let format = logformats::get_format(&args.format)?;

    for file in args.input_files {
        let input = tokio::fs::File::open(&file).await?;
        let report = sequential::run(format.as_ref(), input, args.chunk_size).await?;
        println!("{}: {} lines skipped", file, report.skipped_lines);
        print!("{}", report);
    }

    Ok(())
}

//! Synthetic dataset generator for the packing advisor
//!
//! Writes a JSON array of packing records that the service can train on.
//!
//! Run: cargo run --bin generate-dataset -- --count 500 --output packing_data.json
use clap::Parser;
use packing_advisor::core::synthetic;
use packing_advisor::services::DatasetSource;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of records to generate
    #[arg(short, long, default_value_t = 100)]
    count: usize,

    /// Seed for the random generator
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Destination file
    #[arg(short, long, default_value = "packing_data.json")]
    output: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let records = synthetic::generate(args.count, args.seed);
    DatasetSource::new(&args.output).write(&records)?;

    info!("Wrote {} records to {}", records.len(), args.output);
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use shoal_app::{InitPolicy, RunOptions, load_config, run};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "shoal",
    version,
    about = "Schooling simulation on a periodic 3D domain"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Path for the per-snapshot position/velocity dump.
    #[arg(short, long, default_value = "output.txt")]
    output: PathBuf,

    /// Initial placement policy for the school.
    #[arg(long, value_enum, default_value_t = InitPolicy::Uniform)]
    init: InitPolicy,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    run(RunOptions {
        config,
        init: cli.init,
        output: cli.output,
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

use anyhow::{Context, Result};
use clap::Parser;
use georaw::cli::{Cli, Commands};
use georaw::{logging, run_geotag, run_series, Config, RunContext};
use series_detection::ExiftoolSource;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    let log_file = cli.log_file.as_deref().or(config.log_file.as_deref());
    let _log_guard = logging::init_tracing(level, cli.verbose, log_file)?;

    let source = ExiftoolSource::new();
    let ctx = RunContext::new();

    let summary = match &cli.command {
        Commands::Geotag(args) => run_geotag(&args.to_options(&config), &source, &ctx)?,
        Commands::Series(args) => run_series(&args.to_options(&config), &source, &ctx)?,
    };
    println!("{summary}");

    if let Some(output_path) = cli.command.output() {
        summary.write_json(output_path)?;
        println!("💾 Results saved to: {}", output_path.display());
    }

    Ok(())
}

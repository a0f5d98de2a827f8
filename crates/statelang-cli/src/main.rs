//! statelang CLI entry point.
//!
//! Binary name: `statelang`
//!
//! Parses CLI arguments, sets up tracing, then dispatches to the command
//! handler.

mod cli;

use clap::Parser;
use statelang_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::run::RunArgs;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,statelang_core=debug",
        _ => "trace",
    };

    let options = TracingOptions::new(filter).json(cli.json).otel(cli.otel);
    init_tracing(&options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate { file } => cli::validate::validate(&file, cli.json, cli.quiet),

        Commands::Run {
            file,
            input,
            input_file,
            execution_id,
            config,
            stubs,
        } => {
            let args = RunArgs {
                file,
                input,
                input_file,
                execution_id,
                config,
                stubs,
            };
            cli::run::run(args, cli.json, cli.quiet).await
        }

        Commands::Path { expr, input } => cli::inspect::print(&expr, &input, false, cli.json),

        Commands::Eval { call, input } => cli::inspect::print(&call, &input, true, cli.json),
    }
}

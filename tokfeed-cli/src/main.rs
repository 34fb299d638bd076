mod cli;
mod commands;
mod config;
mod output;

use std::process;

use anyhow::Result;
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands, OutputFormat},
    commands::CommandExecutor,
    config::{AppPaths, load_config},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json_output = matches!(
        &args.command,
        Commands::Feed { json: true, .. }
            | Commands::Feed {
                output: OutputFormat::Json | OutputFormat::JsonCompact,
                ..
            }
            | Commands::Cache {
                output: OutputFormat::Json | OutputFormat::JsonCompact,
                ..
            }
    );

    if let Err(e) = run(args).await {
        if json_output {
            let error_json = serde_json::json!({
                "status": "error",
                "message": format!("{e:#}"),
            });
            println!("{error_json}");
        } else {
            error!("Application error: {:#}", e);
            #[cfg(feature = "colored-output")]
            {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
            }
            #[cfg(not(feature = "colored-output"))]
            {
                eprintln!("Error: {:#}", e);
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;

    let config = load_config(args.config.as_deref()).await?;
    let paths = AppPaths::resolve(args.config.as_deref(), args.settings.as_deref(), &config)?;
    let executor = CommandExecutor::new(config, paths, cfg!(feature = "colored-output")).await?;

    match args.command {
        Commands::Sync { force } => executor.sync(force).await?,
        Commands::Feed { output, json } => {
            let format = if json { OutputFormat::Json } else { output };
            executor.feed(format).await?;
        }
        Commands::Cache { video_id, output } => executor.cache(&video_id, output).await?,
        Commands::Config => executor.show_config()?,
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}

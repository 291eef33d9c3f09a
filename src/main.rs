//! Main entry point for Sheet Translator CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sheet_translator::cli::commands::{self, Commands};
use sheet_translator::core::config::{parse_delimiter, ProcessorConfig, TranslatorConfig};

/// Sheet Translator - translate Chinese cells in Excel and CSV files to English
#[derive(Parser, Debug)]
#[command(name = "sheet-translator", version, about, long_about = None)]
struct Args {
    /// Translation service endpoint (defaults to TRANSLATE_API_ENDPOINT)
    #[arg(long)]
    api_endpoint: Option<String>,

    /// API key for the translation service (defaults to TRANSLATE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Backend configuration file (JSON); replaces the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Maximum concurrent requests
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// CSV field delimiter (a single character, or "tab")
    #[arg(long)]
    delimiter: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose {
        format!("{}=debug", env!("CARGO_CRATE_NAME"))
    } else {
        format!("{}=info", env!("CARGO_CRATE_NAME"))
    };
    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new(default_filter)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Override config with CLI args if provided
    let mut translator_config = match &args.config {
        Some(path) => TranslatorConfig::from_file(path)?,
        None => TranslatorConfig::from_env()?,
    };
    if let Some(endpoint) = args.api_endpoint {
        translator_config.api_endpoint = endpoint;
    }
    if args.api_key.is_some() {
        translator_config.api_key = args.api_key;
    }

    let mut processor_config = ProcessorConfig::from_env()?;
    if let Some(max_concurrent) = args.max_concurrent {
        translator_config.max_concurrent = max_concurrent;
        processor_config.max_concurrent = max_concurrent;
    }
    if let Some(delimiter) = &args.delimiter {
        processor_config.csv_delimiter = parse_delimiter(delimiter)?;
    }

    translator_config.validate()?;
    processor_config.validate()?;

    // Execute command
    match args.command {
        Some(Commands::Translate {
            file,
            output,
            recursive,
            on_error,
        }) => {
            if let Some(policy) = on_error {
                processor_config = processor_config.with_failure_policy(policy);
            }
            commands::handle_translate(file, output, recursive, translator_config, processor_config)
                .await?;
        }
        Some(Commands::Check { file, report }) => {
            commands::handle_check(file, report, processor_config).await?;
        }
        Some(Commands::Server { host, port }) => {
            commands::handle_server(host, port, translator_config, processor_config).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}

//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::capability::TranslationCapability;
use crate::core::client::AsyncTranslator;
use crate::core::config::{ProcessorConfig, TranslatorConfig};
use crate::core::models::{FailurePolicy, LanguagePair};
use crate::document::LeakInfo;
use crate::processors::document::output_file_name;
use crate::processors::DocumentProcessor;

/// Commands for Sheet Translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate Chinese cells of .xlsx workbooks and .csv tables to English
    Translate {
        /// Input file or directory (required)
        #[arg(short, long)]
        file: PathBuf,

        /// Output file (for a file) or directory (for a directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recursively translate subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// What to do when a cell fails to translate: abort | keep-source
        #[arg(long)]
        on_error: Option<FailurePolicy>,
    },

    /// List cells that still contain Chinese text
    Check {
        /// File or directory to check
        #[arg(short, long)]
        file: PathBuf,

        /// Save the findings as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Start HTTP API server
    Server {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port (default: 8000)
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
}

fn progress_bar(len: usize) -> anyhow::Result<indicatif::ProgressBar> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Output path for `input` found under `root`, mirrored below `output_root`
fn mirrored_output(root: &Path, input: &Path, output_root: &Path) -> PathBuf {
    let relative = input.strip_prefix(root).unwrap_or(input);
    let name = input
        .file_name()
        .map(|n| output_file_name(&n.to_string_lossy()))
        .unwrap_or_default();
    match relative.parent() {
        Some(parent) => output_root.join(parent).join(name),
        None => output_root.join(name),
    }
}

/// Handle translate command
pub async fn handle_translate(
    file: PathBuf,
    output: Option<PathBuf>,
    recursive: bool,
    translator_config: TranslatorConfig,
    processor_config: ProcessorConfig,
) -> anyhow::Result<()> {
    use std::time::Instant;
    use tracing::info;

    let start_time = Instant::now();

    info!("Starting translation");
    info!("Input: {}", file.display());
    info!("Backend: {}", translator_config.api_endpoint);
    info!("On error: {}", processor_config.failure_policy);

    // The backend must be ready before any document is read
    let capability = TranslationCapability::new();
    let translator = AsyncTranslator::new(translator_config)?;
    capability
        .install(Arc::new(translator), &LanguagePair::zh_en())
        .await?;

    let processor = DocumentProcessor::new(capability, processor_config);

    if !file.is_dir() {
        let (path, translated) = processor.translate_file(&file, output.as_deref()).await?;
        println!("\n✅ Translation completed!");
        println!("   Output: {}", path.display());
        println!(
            "   Cells: {} translated, {} failed",
            translated.report.translated, translated.report.failed
        );
        println!("   Time: {:?}", translated.elapsed);
        return Ok(());
    }

    let files = if recursive {
        processor.find_files_recursive(&file)?
    } else {
        processor.find_files(&file)?
    };

    if files.is_empty() {
        anyhow::bail!("No .xlsx or .csv files found");
    }

    let output_root = output.unwrap_or_else(|| file.clone());
    info!("Output: {}", output_root.display());

    let pb = progress_bar(files.len())?;

    // Process files
    let mut processed = 0;
    let mut failed = 0;
    let mut cells = 0;

    for file_path in &files {
        pb.set_message(format!("Processing: {}", file_path.display()));
        let target = mirrored_output(&file, file_path, &output_root);

        match processor.translate_file(file_path, Some(&target)).await {
            Ok((_, translated)) => {
                processed += 1;
                cells += translated.report.translated;
            }
            Err(e) => {
                failed += 1;
                pb.set_message(format!("Failed: {} - {}", file_path.display(), e));
                eprintln!("Error processing {}: {}", file_path.display(), e);
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("Completed");

    let duration = start_time.elapsed();
    info!(
        "Completed: {} processed, {} failed in {:?}",
        processed, failed, duration
    );

    println!("\n✅ Translation completed!");
    println!("   Processed: {}", processed);
    println!("   Failed: {}", failed);
    println!("   Cells translated: {}", cells);
    println!("   Time: {:?}", duration);

    if failed > 0 {
        anyhow::bail!("{} of {} documents failed", failed, files.len());
    }

    Ok(())
}

/// Handle check command
pub async fn handle_check(
    file: PathBuf,
    report: Option<PathBuf>,
    processor_config: ProcessorConfig,
) -> anyhow::Result<()> {
    use tracing::info;

    info!("Checking for untranslated content in: {}", file.display());

    // Checking never calls the backend
    let processor = DocumentProcessor::new(TranslationCapability::new(), processor_config);

    let files = if file.is_dir() {
        processor.find_files_recursive(&file)?
    } else {
        vec![file.clone()]
    };

    let mut leaks: Vec<LeakInfo> = Vec::new();
    for path in &files {
        let found = processor.check_file(path).await?;
        if files.len() > 1 {
            let name = path.strip_prefix(&file).unwrap_or(path).display().to_string();
            leaks.extend(found.into_iter().map(|leak| LeakInfo {
                location: format!("{}: {}", name, leak.location),
                original: leak.original,
            }));
        } else {
            leaks.extend(found);
        }
    }

    if leaks.is_empty() {
        println!("✅ No untranslated content found!");
        return Ok(());
    }

    println!("\n⚠️  Found {} untranslated cells:", leaks.len());

    for (i, leak) in leaks.iter().enumerate() {
        println!("\n{}. {}", i + 1, leak.location);
        println!("   Original: {}", leak.original);
    }

    if let Some(report) = report {
        processor.save_leak_report(&leaks, &report).await?;
        println!("\n📝 Report saved to: {}", report.display());
    }

    Ok(())
}

/// Handle server command
pub async fn handle_server(
    host: String,
    port: u16,
    translator_config: TranslatorConfig,
    processor_config: ProcessorConfig,
) -> anyhow::Result<()> {
    use crate::server::api::run_server;
    use tracing::info;

    info!("Starting HTTP server on {}:{}", host, port);
    println!("🚀 Server starting on http://{}:{}", host, port);
    println!("📄 Upload: POST http://{}:{}/documents/<file name>", host, port);

    let translator = AsyncTranslator::new(translator_config)?;
    run_server(host, port, translator, processor_config).await?;

    Ok(())
}

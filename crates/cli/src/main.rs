//! CLI tool for shrinking PowerPoint .pptx files.

use anyhow::{Context, Result};
use clap::Parser;
use slimdeck_core::{
    BatchConfig, CompressionOptions, NullSink, ProgressEvent, ProgressSink, RunSummary,
    TranscodePolicy,
};
use slimdeck_pptx::Compressor;
use std::fs;
use std::path::{Path, PathBuf};

/// Shrink PowerPoint files by removing unused media and re-encoding images.
#[derive(Parser, Debug)]
#[command(name = "slimdeck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input presentation file(s) (.pptx)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Output directory (default: same as input file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Re-encode quality for opaque images, 0.1-1.0
    #[arg(short, long, default_value = "0.7")]
    quality: f32,

    /// Maximum output image width in pixels
    #[arg(long, default_value = "1366")]
    max_width: u32,

    /// Maximum output image height in pixels
    #[arg(long, default_value = "768")]
    max_height: u32,

    /// Maximum concurrently running image transcodes
    #[arg(short = 'j', long, default_value = "2")]
    concurrency: usize,

    /// Print a JSON summary per file to stdout
    #[arg(long)]
    json: bool,

    /// Verbose output with progress updates
    #[arg(short, long)]
    verbose: bool,
}

/// Progress sink that mirrors updates onto stderr.
struct StderrSink;

impl ProgressSink for StderrSink {
    fn emit(&self, event: ProgressEvent) {
        eprintln!("  [{:>3}%] {}", event.percent, event.status);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let options = CompressionOptions::new()
        .with_transcode(
            TranscodePolicy::default()
                .with_opaque_quality(args.quality)
                .with_max_dimensions(args.max_width, args.max_height),
        )
        .with_batch(BatchConfig::default().with_max_concurrent(args.concurrency));

    let mut failures = 0usize;
    for input_path in &args.input {
        if args.verbose {
            eprintln!("Processing: {}", input_path.display());
        }

        match process_file(input_path, &args, &options).await {
            Ok(summary) => {
                if args.json {
                    println!("{}", serde_json::to_string(&summary)?);
                } else {
                    eprintln!(
                        "{}: {} -> {} bytes ({:.1}% saved)",
                        input_path.display(),
                        summary.original_size,
                        summary.compressed_size,
                        summary.savings_ratio() * 100.0
                    );
                }
            }
            Err(e) => {
                eprintln!("Error processing {}: {:#}", input_path.display(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} file(s) failed");
    }
    Ok(())
}

/// Compress a single presentation and write the result.
async fn process_file(
    input_path: &Path,
    args: &Args,
    options: &CompressionOptions,
) -> Result<RunSummary> {
    let bytes = fs::read(input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?;

    let file_name = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    log::debug!("compressing {file_name} ({} bytes)", bytes.len());

    let compressor = Compressor::new(options.clone());
    let (output, summary) = if args.verbose {
        compressor
            .compress_with_summary(&bytes, file_name, &StderrSink)
            .await?
    } else {
        compressor
            .compress_with_summary(&bytes, file_name, &NullSink)
            .await?
    };

    let output_path = get_output_path(input_path, args.output.as_ref())?;
    fs::write(&output_path, output)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    if args.verbose {
        eprintln!("Written to: {}", output_path.display());
    }

    Ok(summary)
}

/// Determine the output path for a compressed file.
fn get_output_path(input_path: &Path, output_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let output_filename = format!("{stem}-min.pptx");

    let output_path = match output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
            dir.join(output_filename)
        }
        None => match input_path.parent() {
            Some(parent) => parent.join(output_filename),
            None => PathBuf::from(output_filename),
        },
    };

    Ok(output_path)
}

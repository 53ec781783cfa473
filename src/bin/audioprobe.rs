//! audioprobe - command-line audio metadata probe
//!
//! # Usage
//!
//! ```bash
//! # Human-readable summary
//! audioprobe song.flac
//!
//! # JSON output, one document per file
//! audioprobe --format json song.flac other.mp3
//!
//! # Embed binary payloads (cover art bytes) in the JSON
//! audioprobe --format json --include-binary song.m4a
//! ```

use clap::{Parser, ValueEnum};
use std::process;

use audioprobe::{Engine, ParseOptions};

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output (default)
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "audioprobe")]
#[command(about = "Probe audio files and extract metadata", long_about = None)]
struct Args {
    /// Audio files to probe
    #[arg(value_name = "FILE", required = true)]
    files: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Compact JSON output (only with --format json)
    #[arg(short, long)]
    compact: bool,

    /// Embed binary tag payloads alongside their digests
    #[arg(long)]
    include_binary: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env(),
        )
        .init();

    let args = Args::parse();

    let engine = Engine::with_options(ParseOptions {
        include_binary_data: args.include_binary,
        ..ParseOptions::default()
    });

    for file in &args.files {
        let metadata = match engine.parse_path(file) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Error: failed to parse '{}': {}", file, e);
                process::exit(1);
            }
        };

        match args.format {
            OutputFormat::Text => {
                println!("{}:", file);
                println!("{}", metadata);
            }
            OutputFormat::Json => {
                let json = if args.compact {
                    metadata.to_json_compact()
                } else {
                    metadata.to_json()
                };
                match json {
                    Ok(j) => println!("{}", j),
                    Err(e) => {
                        eprintln!("Error: failed to serialize '{}': {}", file, e);
                        process::exit(1);
                    }
                }
            }
        }
    }
}

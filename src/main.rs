//! Preview Lane CLI
//!
//! Entry point for the `preview` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::{Parser, Subcommand};

use preview_lane::api::HttpBuildService;
use preview_lane::cancel::CancelToken;
use preview_lane::config::Config;
use preview_lane::pipeline::Pipeline;
use preview_lane::progress::ProgressSink;
use preview_lane::store::HttpObjectStore;

#[derive(Parser)]
#[command(name = "preview")]
#[command(about = "Package and deliver content for remote preview builds", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file or directory and wait for its preview URL
    Preview {
        /// File or directory to deliver
        path: PathBuf,

        /// Path to config file (default: ~/.config/preview-lane/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Override the upload part size, in MiB
        #[arg(long)]
        part_size: Option<usize>,

        /// Suppress the progress meter
        #[arg(long, short = 'q')]
        quiet: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Preview {
            path,
            config,
            part_size,
            quiet,
        } => {
            run_preview(path, config, part_size, quiet);
        }
    }
}

fn run_preview(path: PathBuf, config: Option<PathBuf>, part_size: Option<usize>, quiet: bool) {
    let (config, config_path) = match Config::load(config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    if let Err(e) = config.ensure_token(&config_path) {
        eprintln!("error: {e}");
        process::exit(2);
    }

    let service = match HttpBuildService::new(&config.api_base_url, &config.api_token) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    let store = match HttpObjectStore::new(&config.store_endpoint) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    let mut pipeline_config = config.pipeline_config(&config_path);
    if let Some(mib) = part_size {
        pipeline_config.part_size = mib * 1024 * 1024;
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\ninterrupted, cleaning up...");
        handler_token.cancel();
    }) {
        eprintln!("warning: could not install signal handler: {e}");
    }

    let meter = TermMeter::new(quiet);
    let pipeline = Pipeline::new(pipeline_config, &service, &store);
    match pipeline.run(&path, &meter, &cancel) {
        Ok(report) => {
            meter.finish();
            if !quiet {
                eprintln!(
                    "delivered {} entries ({} bytes compressed)",
                    report.archive.entries, report.archive.bytes
                );
            }
            println!("Preview ready: {}", report.preview_url);
        }
        Err(e) => {
            meter.finish();
            eprintln!("error: {e}");
            process::exit(e.exit_code());
        }
    }
}

/// Progress meter that redraws one stderr line as bytes go out.
struct TermMeter {
    quiet: bool,
    bytes: AtomicU64,
}

impl TermMeter {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            bytes: AtomicU64::new(0),
        }
    }

    fn finish(&self) {
        if !self.quiet && self.bytes.load(Ordering::Relaxed) > 0 {
            eprintln!();
        }
    }
}

impl ProgressSink for TermMeter {
    fn record(&self, delta: u64) {
        let total = self.bytes.fetch_add(delta, Ordering::Relaxed) + delta;
        if !self.quiet {
            eprint!("\r  uploaded {:.1} MiB", total as f64 / (1024.0 * 1024.0));
        }
    }
}

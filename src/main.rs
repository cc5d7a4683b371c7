use clap::Parser;
use imageopt::config::{self, Config, ConfigError};
use imageopt::rewriter::TagRewriter;
use imageopt::store::{DirFileStore, StoreError};
use rayon::prelude::*;
use std::borrow::Cow;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "imageopt",
    version,
    about = "Route pluginfile images in HTML through the image optimiser"
)]
struct Cli {
    /// HTML files to rewrite.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Config file (defaults to imageopt.toml next to the first input).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory of the file store.
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Maximum image width in pixels; enables redirection.
    #[arg(long)]
    maxwidth: Option<u32>,

    /// Delay loading of images until visible.
    #[arg(long)]
    loadonvisible: bool,

    /// Number of leading images that load immediately.
    #[arg(long)]
    eager: Option<usize>,

    /// Output file, or `-` for stdout. Only valid with a single input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Error)]
enum RunError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: io::Error },
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    init_logging(&config, cli.verbose);
    apply_overrides(&mut config, &cli);

    if cli.output.is_some() && cli.inputs.len() > 1 {
        error!("--output can only be used with a single input");
        process::exit(1);
    }

    let store_root = cli
        .store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.root));
    let store = DirFileStore::new(store_root);
    info!(
        store = %store.root().display(),
        maxwidth = ?config.filter.maxwidth,
        loadonvisible = config.filter.loadonvisible,
        "starting"
    );
    let rewriter = TagRewriter::new(&config.filter, &store);

    let failures = cli
        .inputs
        .par_iter()
        .map(|input| {
            let output = cli
                .output
                .clone()
                .unwrap_or_else(|| default_output_path(input));
            let t0 = Instant::now();
            let result = process_file(&rewriter, input, &output);
            match &result {
                Ok(changed) => {
                    info!(input = %input.display(), output = %output.display(), changed, "processed");
                    if config.timings {
                        info!(input = %input.display(), elapsed = ?t0.elapsed(), "timing");
                    }
                }
                Err(e) => error!(input = %input.display(), "{}", e),
            }
            result
        })
        .filter(|result| result.is_err())
        .count();

    if failures > 0 {
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    if let Some(path) = &cli.config {
        return Config::load(path);
    }
    let default_path = cli
        .inputs
        .first()
        .map(|input| config::default_config_path(input))
        .unwrap_or_else(|| PathBuf::from("imageopt.toml"));
    if default_path.is_file() {
        Config::load(&default_path)
    } else {
        Ok(Config::default())
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(maxwidth) = cli.maxwidth {
        config.filter.maxwidth = Some(maxwidth).filter(|w| *w > 0);
    }
    if cli.loadonvisible {
        config.filter.loadonvisible = true;
    }
    if let Some(eager) = cli.eager {
        config.filter.eager_load_count = eager;
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Returns whether the file's content changed.
fn process_file(rewriter: &TagRewriter<'_>, input: &Path, output: &Path) -> Result<bool, RunError> {
    let html = fs::read_to_string(input).map_err(|source| RunError::Read {
        path: input.display().to_string(),
        source,
    })?;
    let rewritten = rewriter.transform(&html)?;
    let changed = matches!(rewritten, Cow::Owned(_));

    let write_result = if output == Path::new("-") {
        io::stdout().lock().write_all(rewritten.as_bytes())
    } else {
        fs::write(output, rewritten.as_bytes())
    };
    write_result.map_err(|source| RunError::Write {
        path: output.display().to_string(),
        source,
    })?;
    Ok(changed)
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("opt.html")
}

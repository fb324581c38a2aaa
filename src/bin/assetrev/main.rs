//! assetrev CLI tool
//!
//! Command-line interface for revisioning a site's assets.
//!
//! ## Commands
//!
//! - `build [path]`: revision every asset under `src`, rewrite `asset://` references, write the
//!   results and the manifest under `dest`
//! - `watch [path]`: build once, then rebuild changed files until interrupted (feature `service`)
//!
//! Configuration is read from `assetrev.toml` in the project root (or `--config`), with command
//! line flags layered on top. The build exits with status 1 if any reference stayed unresolved.

use assetrev::{
    config::{AssetConfig, ConfigOverrides, ConfigProvider, PrefixPool, TomlConfigProvider},
    pipeline::{read_tree, run_build, write_outputs, StageOutput},
    stage::AssetPipeline,
    AssetError,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
#[cfg(feature = "service")]
use std::{sync::Arc, time::Duration};

const CONFIG_FILE: &str = "assetrev.toml";

#[derive(Parser)]
#[command(name = "assetrev")]
#[command(author, version, about = "Fingerprint assets and rewrite asset:// references", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BuildArgs {
    /// Project root containing `src` (default: current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Configuration file path (default: <path>/assetrev.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// URL prefix for revisioned paths; repeat to rotate across several
    #[arg(long)]
    prefix: Vec<String>,

    /// Keep original filenames
    #[arg(long)]
    no_hash: bool,

    /// Do not delete superseded outputs
    #[arg(long)]
    no_cleanup: bool,

    /// Milliseconds between resolution retries
    #[arg(long)]
    interval: Option<u64>,

    /// Resolution retries before a reference is reported unresolved
    #[arg(long)]
    repeat: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl BuildArgs {
    fn load_config(&self) -> Result<AssetConfig, AssetError> {
        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| self.path.join(CONFIG_FILE));
        let config = TomlConfigProvider::new(config_path).load()?.merge(ConfigOverrides {
            prefix: (!self.prefix.is_empty()).then(|| PrefixPool::from(self.prefix.clone())),
            interval: self.interval,
            repeat: self.repeat,
            cleanup: self.no_cleanup.then_some(false),
            hash: self.no_hash.then_some(false),
            ..Default::default()
        });
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Revision a project once
    Build(BuildArgs),

    /// Build, then rebuild on change until interrupted
    #[cfg(feature = "service")]
    Watch(BuildArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            let config = args.load_config()?;
            if args.verbose {
                println!("Building: {:?}", args.path);
                println!("Source: {:?} -> destination: {:?}", config.src, config.dest);
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let output = runtime.block_on(async {
                let pipeline = AssetPipeline::new(config.clone(), &args.path);
                build(&pipeline, &args.path).await
            })?;

            report(&output, args.verbose);
            if output.has_unresolved() {
                std::process::exit(1);
            }
            Ok(())
        }

        #[cfg(feature = "service")]
        Commands::Watch(args) => {
            use assetrev::watch::AssetWatcher;

            let config = args.load_config()?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let pipeline = Arc::new(AssetPipeline::new(config, &args.path));
            let output = runtime.block_on(build(&pipeline, &args.path))?;
            report(&output, args.verbose);

            let watcher = AssetWatcher::new(pipeline.clone(), runtime.handle().clone())?;
            println!("Watching {:?} (Ctrl-C to stop)", watcher.src_root());

            let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, std::sync::atomic::Ordering::SeqCst);
            })?;

            while running.load(std::sync::atomic::Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }

            watcher.stop()?;
            runtime.block_on(pipeline.manifest().flush())?;
            Ok(())
        }
    }
}

async fn build(pipeline: &AssetPipeline, root: &Path) -> Result<StageOutput, AssetError> {
    let files = read_tree(root, pipeline.config()).await?;
    let output = run_build(pipeline, files).await?;
    write_outputs(&output.files, pipeline.config()).await?;
    Ok(output)
}

fn report(output: &StageOutput, verbose: bool) {
    for error in &output.errors {
        eprintln!("{error}");
    }
    if verbose {
        println!("\n=== Build Results ===");
        println!("Files written: {}", output.files.len());
        println!("Errors: {}", output.errors.len());
    }
}

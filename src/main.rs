use bakery::hooks::HookRegistry;
use bakery::publish::{PublishModes, PublishReport, Publisher};
use bakery::store::S3Store;
use bakery::{config, output, scan};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Bucket selection shared by commands that talk to the store.
#[derive(clap::Args, Clone, Default)]
struct BucketArgs {
    /// Bucket to publish to (overrides bucket.name)
    #[arg(long)]
    aws_bucket_name: Option<String>,

    /// Key prefix inside the bucket (overrides bucket.prefix)
    #[arg(long)]
    aws_bucket_prefix: Option<String>,
}

#[derive(clap::Args, Clone)]
struct PublishArgs {
    /// Built site to publish (overrides build_dir)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    #[command(flatten)]
    bucket: BucketArgs,

    /// Upload every file, even when the bucket already has it
    #[arg(long)]
    force: bool,

    /// Show what would change without touching the bucket
    #[arg(long)]
    dry_run: bool,

    /// Never delete objects missing from the build
    #[arg(long)]
    no_delete: bool,

    /// Run transfers one at a time on the main thread
    #[arg(long)]
    no_pooling: bool,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args, Clone)]
struct UnpublishArgs {
    #[command(flatten)]
    bucket: BucketArgs,

    /// Show what would be deleted without touching the bucket
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser)]
#[command(name = "bakery")]
#[command(about = "Publish a built static site to an S3 bucket")]
#[command(long_about = "\
Publish a built static site to an S3 bucket

Only files whose content changed are uploaded, and objects no longer in the
build are deleted, so the bucket mirrors the build directory after each run.
Content is compared by MD5 digest against the object's ETag, including
multipart ETags, never by modification time.

Configuration is read from bakery.toml; command-line flags win over it.
Credentials come from the standard AWS environment and profile settings.

Run 'bakery gen-config' to generate a documented bakery.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// More output: -v lists affected keys and logs phases, -vv logs every file
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the build directory to the bucket
    Publish(PublishArgs),
    /// Delete everything under the prefix from the bucket
    Unpublish(UnpublishArgs),
    /// Validate config and build directory without touching the network
    Check {
        /// Built site to check (overrides build_dir)
        #[arg(long)]
        build_dir: Option<PathBuf>,
    },
    /// Print a stock bakery.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let verbose = cli.verbose > 0;

    match cli.command {
        Command::Publish(args) => {
            let overrides = cli_overrides(args.build_dir.as_deref(), &args.bucket);
            let config = config::load_config(&cli.config, overrides)?;
            let hooks = HookRegistry::from_redirects(&config.redirects)?;
            let store = S3Store::connect(&config.bucket)?;
            let modes = PublishModes {
                force: args.force,
                dry_run: args.dry_run,
                no_delete: args.no_delete,
                no_pooling: args.no_pooling,
            };

            let report = Publisher::new(&config, modes, &store, &hooks).publish()?;
            output::print_report(&report, verbose);
            if let Some(path) = &args.report {
                write_report(path, &report)?;
            }
            exit_on_failures(&report);
        }
        Command::Unpublish(args) => {
            let overrides = cli_overrides(None, &args.bucket);
            let config = config::load_config(&cli.config, overrides)?;
            let store = S3Store::connect(&config.bucket)?;
            let modes = PublishModes {
                dry_run: args.dry_run,
                ..PublishModes::default()
            };

            let report = Publisher::new(&config, modes, &store, &HookRegistry::new()).unpublish()?;
            output::print_report(&report, verbose);
            exit_on_failures(&report);
        }
        Command::Check { build_dir } => {
            let overrides = cli_overrides(build_dir.as_deref(), &BucketArgs::default());
            let config = config::load_config(&cli.config, overrides)?;
            HookRegistry::from_redirects(&config.redirects)?;
            let build_dir = PathBuf::from(&config.build_dir);
            println!("==> Checking {}", build_dir.display());
            let files = scan::scan(&build_dir)?;
            output::print_check(&build_dir, &files, verbose);
            println!("==> Build directory is ready to publish");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `-v` raises this crate's level from
/// warn to info to debug while dependencies stay at warn.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,bakery={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Command-line flags as a config layer.
fn cli_overrides(build_dir: Option<&Path>, bucket: &BucketArgs) -> Option<toml::Value> {
    let mut root = toml::Table::new();
    if let Some(dir) = build_dir {
        root.insert(
            "build_dir".into(),
            toml::Value::String(dir.to_string_lossy().into_owned()),
        );
    }

    let mut bucket_table = toml::Table::new();
    if let Some(name) = &bucket.aws_bucket_name {
        bucket_table.insert("name".into(), toml::Value::String(name.clone()));
    }
    if let Some(prefix) = &bucket.aws_bucket_prefix {
        bucket_table.insert("prefix".into(), toml::Value::String(prefix.clone()));
    }
    if !bucket_table.is_empty() {
        root.insert("bucket".into(), toml::Value::Table(bucket_table));
    }

    (!root.is_empty()).then_some(toml::Value::Table(root))
}

fn write_report(path: &Path, report: &PublishReport) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Per-item failures leave the run complete but unsuccessful.
fn exit_on_failures(report: &PublishReport) {
    if report.has_failures() {
        std::process::exit(2);
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rv_contract::{ArtifactKind, EXIT_FAIL};
use rv_guard::GuardMode;

mod commands;

use commands::health::EnvelopeOpts;

#[derive(Parser)]
#[command(name = "rv")]
#[command(about = "Artifact publication and integrity pipeline", long_about = None)]
struct Cli {
    /// Artifact root (published tree). Falls back to artifact_root in config.
    #[arg(long, global = true, env = "RV_ARTIFACT_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured module over the dependency graph and publish.
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Produce and publish one module from a raw JSON payload.
    Produce {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        module: String,

        /// Record array or provider response body
        #[arg(long)]
        input: PathBuf,
    },

    /// Contract validation
    Validate {
        #[command(subcommand)]
        cmd: ValidateCmd,
    },

    /// Write system/manifest.json, system/health.json and the health history.
    Aggregate {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Semantic envelope check over mirror files.
    EnvelopeCheck {
        /// Optional config, for per-module primary record paths and the mirrors dir
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Mirrors dir relative to the root
        #[arg(long)]
        mirrors: Option<String>,

        #[arg(long, default_value_t = false)]
        strict: bool,

        /// Critical failures tolerated in strict mode
        #[arg(long, default_value_t = 0)]
        max_critical: usize,
    },

    /// Report (scan) or quarantine (guard) leftovers of failed runs.
    Orphan {
        #[arg(value_enum)]
        mode: OrphanMode,
    },

    /// Severity gate over system/health.json.
    Gate {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Exit non-zero when not green (default: warn and exit 0)
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Delete expired mirrors and drift reports.
    Retention {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ValidateCmd {
    /// Validate one document against a built-in schema.
    Doc {
        #[arg(long, value_parser = commands::validate::parse_kind)]
        kind: ArtifactKind,

        #[arg(long)]
        file: PathBuf,
    },

    /// Re-verify every published snapshot / module-state pair.
    Pairs {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OrphanMode {
    Scan,
    Guard,
}

impl From<OrphanMode> for GuardMode {
    fn from(m: OrphanMode) -> Self {
        match m {
            OrphanMode::Scan => GuardMode::Scan,
            OrphanMode::Guard => GuardMode::Guard,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env.local if present (dev convenience); production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("FAIL: {e:#}");
            EXIT_FAIL
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let root = cli.root.as_deref();
    match cli.cmd {
        Commands::Run { config_paths } => commands::run::run(root, &config_paths).await,

        Commands::Produce {
            config_paths,
            module,
            input,
        } => commands::run::produce(root, &config_paths, &module, &input),

        Commands::Validate { cmd } => match cmd {
            ValidateCmd::Doc { kind, file } => commands::validate::doc(kind, &file),
            ValidateCmd::Pairs { config_paths } => commands::validate::pairs(root, &config_paths),
        },

        Commands::Aggregate { config_paths } => commands::health::aggregate(root, &config_paths),

        Commands::EnvelopeCheck {
            config_paths,
            mirrors,
            strict,
            max_critical,
        } => commands::health::envelope_check(EnvelopeOpts {
            root,
            config_paths: &config_paths,
            mirrors: mirrors.as_deref(),
            strict,
            max_critical,
        }),

        Commands::Orphan { mode } => commands::housekeeping::orphan(root, mode.into()),

        Commands::Gate {
            config_paths,
            strict,
        } => commands::health::gate(root, &config_paths, strict),

        Commands::Retention { config_paths } => commands::housekeeping::retention(root, &config_paths),

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = rv_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(0)
        }
    }
}

/// Logs go to stderr; stdout carries only command results.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

//! upload-validator CLI
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP service
//! upload-validator serve --bind 0.0.0.0:8080
//!
//! # Validate a file on disk; prints the verdict as JSON
//! upload-validator check ./scan.pdf --mime application/pdf
//!
//! # Print the effective configuration
//! upload-validator config
//! ```
//!
//! `check` exits with 0 when the file is accepted, 1 when it is rejected and
//! 2 when no verdict could be reached.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use upload_validator::{
    audit,
    config::ValidatorConfig,
    observability,
    server,
    state::AppState,
    validation::{UploadMeta, UploadValidator, ValidationContext},
};

#[derive(Parser)]
#[command(name = "upload-validator")]
#[command(version)]
#[command(about = "Validate untrusted file uploads by content", long_about = None)]
struct Cli {
    /// Configuration file, merged over ./config.toml and the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP validation service
    Serve {
        /// Override the listen address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Validate a single file and print the verdict as JSON
    Check {
        /// File to validate
        path: PathBuf,

        /// Declared MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Declared filename (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Write it to the user config directory instead of stdout
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = observability::init() {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = ValidatorConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            server::serve(AppState::with_config(config)?).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { path, mime, name } => check(config, &path, mime, name).await,
        Commands::Config { write } => {
            let rendered = config.to_toml()?;
            if write {
                let target = ValidatorConfig::create_config_dir()?;
                if target.exists() {
                    anyhow::bail!("{} already exists", target.display());
                }
                tokio::fs::write(&target, rendered)
                    .await
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                eprintln!("Wrote {}", target.display());
            } else {
                print!("{rendered}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn check(
    config: ValidatorConfig,
    path: &Path,
    mime: Option<String>,
    name: Option<String>,
) -> Result<ExitCode> {
    let timeout = config.server.request_timeout();
    let validator = UploadValidator::new(config)?;

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let size = file.metadata().await?.len();

    let filename = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let content_type = mime.unwrap_or_else(|| {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let meta = UploadMeta::new(filename, content_type).with_declared_size(size);

    let ctx = ValidationContext::default().with_timeout(timeout);
    let verdict = validator.validate_reader(&meta, file, &ctx).await?;
    audit::report("cli", &meta, &verdict);

    println!("{}", serde_json::to_string_pretty(&verdict)?);

    Ok(if verdict.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

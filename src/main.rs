use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use citrus::tools;
use citrus::{load_tests, CitrusConfig, TestRunner};

#[derive(Debug, Parser)]
#[command(name = "citrus", version, about = "Integration test framework")]
struct Cli {
    /// Configuration file, defaults to citrus.yaml next to the tests
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a YAML or XML test, or all tests of a directory
    Run {
        path: PathBuf,
        /// Override the report directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
        /// Override the suite name used in reports
        #[arg(long)]
        suite: Option<String>,
    },
    /// Parse tests and configuration without running them
    Validate { path: PathBuf },
    /// Print the JSON schema of tests (`test`) or configuration (`config`)
    Schema {
        #[arg(default_value = "test")]
        kind: String,
    },
    /// Print the Markdown reference of actions, functions and endpoints
    Docs,
    /// Write a YAML test skeleton
    Create {
        name: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Target directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

/// Explicit config file, or citrus.yaml discovered next to the tests
fn load_config(explicit: Option<&PathBuf>, tests: Option<&PathBuf>) -> Result<CitrusConfig> {
    if let Some(path) = explicit {
        return Ok(CitrusConfig::load(path)?);
    }
    let dir = match tests {
        Some(path) if path.is_dir() => path.clone(),
        Some(path) => path.parent().map(PathBuf::from).unwrap_or_default(),
        None => PathBuf::from("."),
    };
    match CitrusConfig::discover(&dir) {
        Some(path) => Ok(CitrusConfig::load(path)?),
        None => Ok(CitrusConfig::default()),
    }
}

async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Run { path, report_dir, suite } => {
            let mut config = load_config(cli.config.as_ref(), Some(&path))?;
            if let Some(dir) = report_dir {
                config.settings.report_directory = dir;
            }
            if let Some(suite) = suite {
                config.settings.suite_name = suite;
            }

            let tests = load_tests(&path)?;
            if tests.is_empty() {
                return Err(anyhow!("No tests found in {}", path.display()));
            }
            let runner = TestRunner::from_config(&config)?.with_default_reporters();
            let suite = runner.run_suite(&tests).await?;
            Ok(suite.is_success())
        }
        Command::Validate { path } => {
            load_config(cli.config.as_ref(), Some(&path))?;
            let tests = load_tests(&path)?;
            let actions: usize = tests.iter().map(|test| test.actions.len() + test.finally.len()).sum();
            info!(tests = tests.len(), actions, "All tests are valid");
            Ok(true)
        }
        Command::Schema { kind } => {
            let schema = tools::schema(kind.parse()?)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(true)
        }
        Command::Docs => {
            print!("{}", tools::docs());
            Ok(true)
        }
        Command::Create {
            name,
            author,
            description,
            dir,
        } => {
            let content = tools::create_test(&name, author.as_deref(), description.as_deref())?;
            let path = dir.join(format!("{}.yaml", name));
            if path.exists() {
                return Err(anyhow!("Test file {} already exists", path.display()));
            }
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&path, content)?;
            info!(path = %path.display(), "Test skeleton created");
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    let env_file_path = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "citrus=debug,warn".into()
            } else {
                "citrus=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    if let Some(path) = env_file_path {
        info!(path = %path.display(), "Loaded environment from file");
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "Citrus failed");
            std::process::exit(2);
        }
    }
}

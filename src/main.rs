//! polar-host CLI: inspect wire terms the way a host session sees them.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use polar_host::config::HostConfig;
use polar_host::host::Host;
use polar_host::terms::Term;

#[derive(Parser)]
#[command(name = "polar-host", version, about = "Polar host term inspector")]
struct Cli {
    /// Host config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a wire term and print the host value it becomes.
    Decode {
        /// Read the term from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Allow Expression terms (data filtering results).
        #[arg(long)]
        accept_expression: bool,
    },

    /// Validate a wire term and print its canonical JSON.
    Check {
        /// Read the term from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path).into_diagnostic(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .into_diagnostic()?;
            Ok(buf)
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };

    match cli.command {
        Commands::Decode {
            file,
            accept_expression,
        } => {
            let text = read_input(file.as_deref())?;
            let term = Term::parse(&text)?;
            let mut host = Host::new(config);
            if accept_expression {
                host.set_accept_expression(true);
            }
            let value = host.to_host(&term)?;
            println!("{} ({})", value, value.kind());
        }

        Commands::Check { file } => {
            let text = read_input(file.as_deref())?;
            let term = Term::parse(&text)?;
            tracing::info!(tag = term.tag(), "term is well-formed");
            println!("{term}");
        }
    }

    Ok(())
}

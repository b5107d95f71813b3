//! Namespice CLI - declarative namespace classes for Kubernetes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;

use error::Result;

#[derive(Parser)]
#[command(name = "namespice")]
#[command(author = "Namespice Contributors")]
#[command(version)]
#[command(about = "Stamp namespace class templates into every namespace that asks for them", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch namespaces and classes and reconcile until interrupted
    Run {
        /// Controller configuration file
        #[arg(short, long, env = "NAMESPICE_CONFIG")]
        config: Option<PathBuf>,

        /// Period of the full drift-correcting sweep (e.g. 10m)
        #[arg(long, value_parser = commands::parse_duration)]
        sweep_interval: Option<Duration>,

        /// Period after which watches relist (e.g. 1m)
        #[arg(long, value_parser = commands::parse_duration)]
        relist_interval: Option<Duration>,
    },

    /// Run one full sweep and exit
    Sweep {
        /// Controller configuration file
        #[arg(short, long, env = "NAMESPICE_CONFIG")]
        config: Option<PathBuf>,

        /// Show what would change without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Render the objects a namespace would receive, without a cluster
    Render {
        /// Namespace to render for
        #[arg(short, long)]
        namespace: String,

        /// Comma-separated class list, as in the namespace annotation (default: all classes)
        #[arg(long)]
        classes: Option<String>,

        /// NamespaceClass manifest file(s)
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Controller configuration file
        #[arg(short, long, env = "NAMESPICE_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = if debug {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            sweep_interval,
            relist_interval,
        } => {
            let config = commands::load_config(config.as_deref(), sweep_interval, relist_interval)?;
            commands::run::run(config).await
        }

        Commands::Sweep { config, dry_run } => {
            let config = commands::load_config(config.as_deref(), None, None)?;
            commands::sweep::run(config, dry_run).await
        }

        Commands::Render {
            namespace,
            classes,
            files,
            config,
        } => {
            let config = commands::load_config(config.as_deref(), None, None)?;
            commands::render::run(&config, &namespace, classes.as_deref(), &files)
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = dispatch(cli.command).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }

    Ok(())
}

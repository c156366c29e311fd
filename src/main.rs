use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use container_test_manager::config::{AppConfig, LogFormat, LoggingConfig};
use container_test_manager::execution::{ExecutionStatus, ExecutionView};

#[derive(Parser)]
#[command(
    name = "container-test-manager",
    about = "Run test commands inside docker/podman containers and track the results",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Container backend: docker or podman
        #[arg(long, env = "CTM_BACKEND")]
        backend: Option<String>,
    },

    /// Launch one container, run a test command in it, and print the outcome
    Run {
        /// Launch command, e.g. "docker run -d alpine sleep 100"
        #[arg(long)]
        launch: String,

        /// Command to execute inside the container
        #[arg(long)]
        test: String,

        /// Container backend: docker or podman
        #[arg(long, env = "CTM_BACKEND")]
        backend: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind, backend } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(backend) = backend {
                config.backend.kind = backend;
            }
            tracing::info!(bind = %config.server.bind, backend = %config.backend.kind, "Starting container-test-manager");
            container_test_manager::serve(&config).await?;
        }
        Commands::Run {
            launch,
            test,
            backend,
            json,
        } => {
            if let Some(backend) = backend {
                config.backend.kind = backend;
            }
            let driver = container_test_manager::build_driver(&config);
            let id = driver.submit(&launch, &test, None).await?;
            tracing::info!(execution_id = %id, "Waiting for execution to finish");

            let record = driver
                .wait_for_terminal(&id, Duration::from_millis(250))
                .await
                .context("execution record disappeared")?;
            let view = ExecutionView::from(&record);

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_summary(&view);
            }

            if record.status != ExecutionStatus::Completed {
                anyhow::bail!("execution {} finished with status {}", id, record.status);
            }
        }
    }

    Ok(())
}

fn print_summary(view: &ExecutionView) {
    let dash = "-";
    println!("\nContainer Test Execution {}", view.id);
    println!("{:<15} | Value", "Field");
    println!("{:-<15}-|-{:-<40}", "", "");
    println!("{:<15} | {}", "Status", view.status.to_uppercase());
    println!("{:<15} | {}", "Container", view.container_id.as_deref().unwrap_or(dash));
    println!("{:<15} | {}", "Name", view.container_name.as_deref().unwrap_or(dash));
    println!(
        "{:<15} | {}",
        "Exit code",
        view.exit_code.map(|c| c.to_string()).as_deref().unwrap_or(dash)
    );
    println!("{:<15} | {}", "Started", view.start_time);
    println!("{:<15} | {}", "Finished", view.end_time.as_deref().unwrap_or(dash));

    if let Some(output) = view.test_output.as_deref().filter(|o| !o.is_empty()) {
        println!("\n=== Test Output ===");
        println!("{}", output.trim_end());
    }
    if let Some(error) = view.error_message.as_deref() {
        println!("\n=== Error ===");
        println!("{}", error.trim_end());
    }
    println!();
}

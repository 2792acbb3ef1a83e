use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use telemetry_retention::{
    AppState, build_app,
    config::ServiceConfig,
    db::StorePool,
    ingest::TelemetryGenerator,
    models::epoch_seconds,
    observability,
    retention::{SweepOptions, start_retention_worker},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Config file looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "telemetry-retention.toml";

/// CLI arguments for the telemetry retention service
#[derive(Parser, Debug)]
#[command(version, about = "IoT telemetry ingestion and retention", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./telemetry-retention.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server and scheduled retention worker (default)
    Serve,
    /// Run one retention sweep and exit
    Sweep {
        /// Count what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Delete events at or before this epoch-seconds value. Values later
        /// than now minus the retention period are clamped to it
        #[arg(long)]
        cutoff: Option<f64>,
    },
    /// Write generated test telemetry to the store and exit
    Generate {
        /// Write a single reading from the reference device
        #[arg(long)]
        sample: bool,
        /// Number of devices (overrides the config)
        #[arg(long)]
        devices: Option<u32>,
        /// Days of history (overrides the config)
        #[arg(long)]
        days: Option<u32>,
        /// Readings per device per day (overrides the config)
        #[arg(long)]
        readings_per_day: Option<u32>,
    },
    /// Run store migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    Migrate,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./telemetry-retention.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Configuration written by `init`.
fn default_config_toml() -> &'static str {
    r#"# Telemetry retention service configuration

[server]
host = "127.0.0.1"
port = 8080

# SQLite document store
[store]
type = "sqlite"
path = "telemetry.db"

[ingestion]
topic = "iot-events"
region = "australia-southeast1"

# Delete telemetry older than 7 days, once a day
[retention]
enabled = true
interval_hours = 24
retention_period_secs = 604800
page_size = 500
max_duration_secs = 300

[observability.logging]
level = "info"
format = "compact"
"#
}

/// Resolve the config path. `None` means run with built-in defaults.
fn resolve_config_path(explicit_path: Option<&str>) -> Result<Option<PathBuf>, String> {
    // If explicit path is provided, use it
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    // Check for the config file in current directory
    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    Ok(None)
}

/// Load configuration, exiting on failure.
fn load_config(explicit_path: Option<&str>) -> (ServiceConfig, Option<PathBuf>) {
    let config_path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let Some(path) = config_path else {
        return (ServiceConfig::default(), None);
    };

    match ServiceConfig::from_file(&path) {
        Ok(c) => (c, Some(path)),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Open the store and build shared state, exiting on failure.
async fn open_state(config: ServiceConfig, cancel: CancellationToken) -> AppState {
    match AppState::new(config, cancel).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open document store");
            eprintln!("Error: Failed to open document store: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Schema { output }) => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Some(Command::Init { output, force }) => {
            run_init(output, force);
        }
        Some(Command::Migrate) => {
            run_migrate(args.config.as_deref()).await;
        }
        Some(Command::Sweep { dry_run, cutoff }) => {
            run_sweep(args.config.as_deref(), dry_run, cutoff).await;
        }
        Some(Command::Generate {
            sample,
            devices,
            days,
            readings_per_day,
        }) => {
            run_generate(
                args.config.as_deref(),
                sample,
                devices,
                days,
                readings_per_day,
            )
            .await;
        }
        Some(Command::Serve) | None => {
            run_server(args.config.as_deref()).await;
        }
    }
}

/// Initialize a new configuration file
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To start the service, run:");
    println!("  telemetry-retention --config {} serve", output_path.display());
}

/// Export JSON schema for the configuration file to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match ServiceConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize config schema: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &content)
                .unwrap_or_else(|e| panic!("Failed to write to {}: {}", path, e));
            eprintln!("Config JSON schema written to {}", path);
        }
        None => {
            println!("{}", content);
        }
    }
}

async fn run_server(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);

    // Initialize observability (tracing, metrics)
    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    match &config_path {
        Some(path) => tracing::info!(
            config_file = %path.display(),
            "Starting telemetry retention service"
        ),
        None => tracing::info!("Starting telemetry retention service with default configuration"),
    }

    if config.store.is_memory() {
        tracing::warn!(
            "Using the in-memory store; telemetry is lost on restart. \
             Configure [store] for persistent storage."
        );
    }

    let cancel = CancellationToken::new();
    let task_tracker = TaskTracker::new();
    let state = open_state(config.clone(), cancel.clone()).await;

    tracing::info!(
        store = state.store.backend_name(),
        topic = %config.ingestion.topic,
        region = %config.ingestion.region,
        "Document store ready"
    );

    task_tracker.spawn(start_retention_worker(
        state.sweeper.clone(),
        cancel.clone(),
    ));

    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on http://{}", bind_addr);

    // Graceful shutdown: wait for SIGINT/SIGTERM, then wait for background tasks
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            cancel,
            task_tracker,
            config.server.shutdown_timeout(),
        ))
        .await
        .unwrap();
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn shutdown_signal(
    cancel: CancellationToken,
    task_tracker: TaskTracker,
    timeout: std::time::Duration,
) {
    wait_for_signal().await;

    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");

    // Stops the retention worker and any in-flight sweep at its next page boundary
    cancel.cancel();
    task_tracker.close();

    match tokio::time::timeout(timeout, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }

    tracing::info!("Shutdown complete");
}

/// Run one sweep from the command line and print the report as JSON.
async fn run_sweep(explicit_config_path: Option<&str>, dry_run: bool, cutoff: Option<f64>) {
    if let Some(cutoff) = cutoff
        && !cutoff.is_finite()
    {
        eprintln!("Error: --cutoff must be a finite number");
        std::process::exit(1);
    }
    let (config, _) = load_config(explicit_config_path);
    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    let cancel = CancellationToken::new();
    let state = open_state(config, cancel.clone()).await;

    // Ctrl+C stops the sweep at its next page boundary
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel.cancel();
    });

    let options = SweepOptions {
        cutoff,
        dry_run: dry_run.then_some(true),
    };
    match state.sweeper.run_with(options).await {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize sweep report"),
            }
            if !report.is_complete() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("Error: Retention sweep failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Write generated test telemetry from the command line.
async fn run_generate(
    explicit_config_path: Option<&str>,
    sample: bool,
    devices: Option<u32>,
    days: Option<u32>,
    readings_per_day: Option<u32>,
) {
    let (mut config, _) = load_config(explicit_config_path);
    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    let generator_config = &mut config.ingestion.generator;
    if let Some(devices) = devices {
        generator_config.devices = devices;
    }
    if let Some(days) = days {
        generator_config.days = days;
    }
    if let Some(readings) = readings_per_day {
        generator_config.readings_per_day = readings;
    }
    let generator = match TelemetryGenerator::new(generator_config.clone()) {
        Ok(generator) => generator,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if config.store.is_memory() {
        tracing::warn!("Generating into the in-memory store; nothing will persist after exit");
    }

    let state = open_state(config, CancellationToken::new()).await;
    let now = Utc::now();

    let result = if sample {
        state
            .ingestion
            .handle(generator.sample(epoch_seconds(now)))
            .await
            .map(|outcome| serde_json::to_value(outcome).unwrap_or_default())
    } else {
        generator
            .run(
                &state.ingestion,
                epoch_seconds(now),
                state.sweeper.cutoff_at(now),
            )
            .await
            .map(|summary| serde_json::to_value(summary).unwrap_or_default())
    };

    match result {
        Ok(value) => println!("{}", value),
        Err(e) => {
            eprintln!("Error: Failed to generate telemetry: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config, _) = load_config(explicit_config_path);

    // Initialize minimal observability for migration logging
    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    tracing::info!("Running store migrations");

    if config.store.is_memory() {
        eprintln!("Error: The in-memory store has no schema. Nothing to migrate.");
        std::process::exit(1);
    }

    // Connect to the store and run migrations
    match StorePool::from_config(&config.store).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Store migrations completed successfully");
                std::process::exit(0);
            }
            Err(e) => {
                tracing::error!(error = %e, "Store migrations failed");
                eprintln!("Error: Store migrations failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to store");
            eprintln!("Error: Failed to connect to store: {}", e);
            std::process::exit(1);
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use orderflow_engine::config::EngineConfig;
use orderflow_engine::orderflow::{
    CycleOutcome, Pattern, PriceLevelSnapshot, TickerProcessor, WindowMetrics,
};
use orderflow_engine::service::{spawn_maintenance, ProcessorService, MAINTENANCE_INTERVAL};
use orderflow_engine::storage::{MemoryStore, OrderFlowStore};

/// Parsed command-line options
#[derive(Debug, Default)]
struct CliArgs {
    mode: String,
    port: Option<u16>,
    data_path: Option<PathBuf>,
    memory: bool,
    tickers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments first to determine mode
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args);

    // Initialize tracing/logging (stdout is reserved for `once`/`schema` output)
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match cli.mode.as_str() {
        "serve" => run_serve(cli).await?,
        "once" => run_once(cli).await?,
        "schema" => print_schemas()?,
        _ => {
            eprintln!("Invalid mode: {}", cli.mode);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Parse command-line arguments
fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs {
        mode: "serve".to_string(),
        ..Default::default()
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" => {
                if i + 1 < args.len() {
                    cli.mode = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    cli.port = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--data-path" => {
                if i + 1 < args.len() {
                    cli.data_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--ticker" => {
                if i + 1 < args.len() {
                    cli.tickers.extend(
                        orderflow_engine::config::engine::parse_tickers(&args[i + 1]),
                    );
                    i += 1;
                }
            }
            "--memory" => cli.memory = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

/// Print usage information
fn print_usage() {
    println!("orderflow-engine - rolling order flow analytics over bid/ask quotes");
    println!();
    println!("USAGE:");
    println!("    orderflow-engine [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --mode <MODE>         serve, once, or schema (default: serve)");
    println!("    --port <PORT>         HTTP port (default: HTTP_PORT or 8080)");
    println!("    --data-path <PATH>    RocksDB directory (default: ORDERFLOW_DATA_PATH)");
    println!("    --memory              Use the in-memory store instead of RocksDB");
    println!("    --ticker <TICKER>     Register a ticker at startup (repeatable, comma lists allowed)");
    println!("    --help, -h            Print this help message");
    println!();
    println!("MODES:");
    println!("    serve     Run per-ticker workers, quote pruning, and the HTTP API until Ctrl+C");
    println!("    once      Run a single cycle for each ticker and print the reports as JSON");
    println!("    schema    Print JSON schemas for WindowMetrics, Pattern, PriceLevelSnapshot");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    PROCESSOR_INTERVAL              Cycle cadence in seconds (default: 1)");
    println!("    ORDERFLOW_DATA_PATH             RocksDB directory (default: ./data/orderflow)");
    println!("    ORDERFLOW_LATENCY_BUDGET_MS     Soft cycle budget (default: 100)");
    println!("    ORDERFLOW_MIN_5MIN_SAMPLES      5min window sample floor (default: 100)");
    println!("    ORDERFLOW_SIGNIFICANCE_FLOOR    Price level size floor (default: 5000)");
    println!("    ORDERFLOW_LARGE_ORDER_SIZE      Large-order floor (default: 10000)");
    println!("    ORDERFLOW_SWEEP_THRESHOLD       Sweep size-delta threshold (default: 15000)");
    println!("    ORDERFLOW_PATTERN_TTL_SECS      Pattern retention (default: 3600)");
    println!("    ORDERFLOW_QUOTE_RETENTION_SECS  Quote retention (default: 600)");
    println!("    ORDERFLOW_TICKERS               Comma-separated startup tickers");
    println!("    HTTP_HOST / HTTP_PORT           HTTP bind address (default: 127.0.0.1:8080)");
    println!("    RUST_LOG                        Logging level (default: info)");
    println!();
    println!("EXAMPLES:");
    println!("    # Serve with RocksDB and two pre-registered tickers");
    println!("    orderflow-engine --ticker SPY --ticker QQQ");
    println!();
    println!("    # Serve from memory on a custom port");
    println!("    orderflow-engine --memory --port 9000");
}

fn load_config(cli: &CliArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    if let Some(path) = &cli.data_path {
        config.data_path = path.clone();
    }
    for ticker in &cli.tickers {
        if !config.tickers.contains(ticker) {
            config.tickers.push(ticker.clone());
        }
    }
    Ok(config)
}

fn open_store(cli: &CliArgs, config: &EngineConfig) -> Result<Arc<dyn OrderFlowStore>> {
    #[cfg(feature = "rocksdb_store")]
    {
        if !cli.memory {
            std::fs::create_dir_all(&config.data_path).with_context(|| {
                format!("Failed to create data directory {}", config.data_path.display())
            })?;
            let store = orderflow_engine::storage::RocksStore::open_with_pattern_ttl(
                &config.data_path,
                config.pattern_ttl_secs,
            )
            .context("Failed to open RocksDB store")?;
            tracing::info!("Using RocksDB store at {}", config.data_path.display());
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "rocksdb_store"))]
    {
        if !cli.memory {
            tracing::warn!("Built without rocksdb_store, falling back to in-memory store");
        }
    }

    tracing::info!("Using in-memory store");
    Ok(Arc::new(MemoryStore::with_pattern_ttl(config.pattern_ttl_secs)))
}

/// Run workers, maintenance, and the HTTP API until Ctrl+C
async fn run_serve(cli: CliArgs) -> Result<()> {
    let config = load_config(&cli)?;
    let store = open_store(&cli, &config)?;

    tracing::info!(
        interval_secs = config.process_interval.as_secs(),
        tickers = ?config.tickers,
        "Starting order flow engine"
    );

    let service = Arc::new(ProcessorService::new(Arc::clone(&store), config.clone()));
    let token = service.shutdown_token();

    let maintenance = spawn_maintenance(
        Arc::clone(&store),
        Duration::from_secs(config.quote_retention_secs),
        MAINTENANCE_INTERVAL,
        token.clone(),
    );

    let supervisor = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run().await })
    };

    #[cfg(feature = "http_status")]
    let http = {
        use orderflow_engine::config::HttpConfig;
        use orderflow_engine::transport::http::{serve, AppState};

        let mut http_config = HttpConfig::from_env()?;
        if let Some(port) = cli.port {
            http_config = http_config.with_port(port);
        }
        let state = AppState {
            store: Arc::clone(&store),
            service: Some(Arc::clone(&service)),
        };
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(http_config, state, token).await {
                tracing::error!("HTTP server error: {}", e);
            }
        })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal (Ctrl+C)"),
        Err(err) => tracing::error!("Failed to listen for shutdown signal: {}", err),
    }

    service.shutdown().await;
    supervisor.await.context("Supervisor task failed")?;
    maintenance.await.context("Maintenance task failed")?;

    #[cfg(feature = "http_status")]
    http.await.context("HTTP task failed")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Run a single cycle per ticker and print the reports
async fn run_once(cli: CliArgs) -> Result<()> {
    let config = load_config(&cli)?;
    let store = open_store(&cli, &config)?;

    let mut tickers = config.tickers.clone();
    if tickers.is_empty() {
        tickers = store
            .active_tickers()
            .await
            .context("Failed to list active tickers")?;
    }

    let mut reports = Vec::new();
    for ticker in tickers {
        let mut processor = TickerProcessor::new(&ticker, Arc::clone(&store), config.cycle.clone());
        match processor.process().await {
            Ok(CycleOutcome::Processed(report)) => reports.push(serde_json::to_value(report)?),
            Ok(CycleOutcome::NoData) => {
                reports.push(serde_json::json!({ "ticker": ticker, "no_data": true }))
            }
            Err(e) => {
                tracing::warn!(ticker = %ticker, error = %e, "Cycle failed");
                reports.push(serde_json::json!({ "ticker": ticker, "error": e.to_string() }))
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

/// Print JSON schemas of the persisted analytics records
fn print_schemas() -> Result<()> {
    let schemas = serde_json::json!({
        "WindowMetrics": schemars::schema_for!(WindowMetrics),
        "Pattern": schemars::schema_for!(Pattern),
        "PriceLevelSnapshot": schemars::schema_for!(PriceLevelSnapshot),
    });
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}

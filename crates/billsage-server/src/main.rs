//! BillSage: medical bill analysis server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use billsage_server::{analysis, build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("BILLSAGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

/// Open the store under `data_dir` and print its counts.
fn check(data_dir: &std::path::Path) -> anyhow::Result<()> {
    let config = billsage_core::BillSageConfig::from_env(data_dir)?;
    let store = billsage_store::SqliteStore::open(&config.data_paths.db)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    let stats = store
        .get_stats()
        .map_err(|e| anyhow::anyhow!("Failed to read stats: {}", e))?;

    println!("Database:   {}", stats.db_path);
    println!("Bills:      {}", stats.total_bills);
    println!("  pending:    {}", stats.pending);
    println!("  processing: {}", stats.processing);
    println!("  analyzed:   {}", stats.analyzed);
    println!("  failed:     {}", stats.failed);
    println!("Progress:   {}", stats.progress_records);
    println!("Extraction: {}", config.endpoints.extraction_url);
    println!("OCR:        {}", config.endpoints.ocr_url);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--check" | "check" => {
                let data_dir = if args.len() > 2 {
                    PathBuf::from(&args[2])
                } else {
                    resolve_data_dir()
                };
                return check(&data_dir);
            }
            "--help" | "-h" | "help" => {
                println!("BillSage: medical bill analysis server");
                println!();
                println!("Usage: billsage [command]");
                println!();
                println!("Commands:");
                println!("  (none)              Start the server");
                println!("  check [data-dir]    Open the database and print bill counts");
                println!("  help                Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'billsage help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = billsage_core::BillSageConfig::from_env(&data_dir)?;
    let port = config.port;

    let store = billsage_store::SqliteStore::open(&config.data_paths.db)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let state = Arc::new(AppState::new(config, store));

    analysis::start_analysis_worker(state.clone());

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("BillSage server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

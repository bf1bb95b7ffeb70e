//! REST API server for the Citi Bike insights dashboard
//!
//! Usage:
//!   ./target/release/api_server [options]
//!
//! REST endpoints:
//!   GET  /api/v1/health     - Health check
//!   GET  /api/v1/filters    - Rider and bike type options
//!   POST /api/v1/dashboard  - Render the dashboard for a filter

use anyhow::Result;
use citibike_insights::{api::create_rest_router, config::EngineArgs};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "api_server", about = "Citi Bike insights REST API")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[command(flatten)]
    engine: EngineArgs,
}

fn print_banner(port: u16, table: &str) {
    println!("============================================================");
    println!("           CITI BIKE INSIGHTS API SERVER");
    println!("============================================================");
    println!();
    println!("  Port:     {}", port);
    println!("  REST:     http://localhost:{}/api/v1/", port);
    println!("  Table:    {}", table);
    println!();
    println!("REST Endpoints:");
    println!("  GET  /api/v1/health      Health check");
    println!("  GET  /api/v1/filters     Filter options");
    println!("  POST /api/v1/dashboard   Render dashboard");
    println!();
    println!("============================================================");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let cli = Cli::parse();
    print_banner(cli.port, &cli.engine.table);

    let dashboard = Arc::new(cli.engine.build_dashboard()?);
    let app = create_rest_router(dashboard);

    let addr: SocketAddr = format!("0.0.0.0:{}", cli.port).parse()?;
    tracing::info!("Starting REST server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

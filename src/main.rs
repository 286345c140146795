//! `ssetrace` binary: serve the tracked app or probe a server with
//! disconnect scenarios.

mod cli;

use std::{error::Error, time::Duration};

use clap::Parser;
use ssetrace::{
    app::{AppConfig, McpApp},
    lifecycle::TrackingLayer,
    scenario::{ScenarioRunner, ScenarioSuite},
    server::SseServer,
};
use tracing::info;

use crate::cli::{Cli, Command, ProbeArgs, ServeArgs, SuiteChoice};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Probe(args) => probe(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(addr) = args.metrics_bind {
        install_metrics(addr)?;
    }

    let app = McpApp::new(AppConfig {
        endpoint: args.endpoint,
        slow_delay: Duration::from_millis(args.slow_ms),
        close_on_disconnect: args.close_on_disconnect,
        ..AppConfig::default()
    });
    let mut server = SseServer::new(TrackingLayer::new().wrap(app));
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }
    let server = server.bind(args.bind)?;
    info!(addr = %server.try_local_addr()?, "listening");
    server.run().await?;
    info!("server stopped");
    Ok(())
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error + Send + Sync>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "metrics exporter listening");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing::warn!(%addr, "built without the `metrics` feature; exporter disabled");
    Ok(())
}

async fn probe(args: ProbeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let endpoint = reqwest::Url::parse(&args.url)?;
    let mut suite = match args.scenarios {
        Some(path) => ScenarioSuite::from_path(path)?,
        None => match args.suite {
            SuiteChoice::Reproduce => ScenarioSuite::reproduction(),
            SuiteChoice::Fast => ScenarioSuite::fast_disconnect(),
            SuiteChoice::All => ScenarioSuite::all(),
        },
    };
    if let Some(ms) = args.settle_ms {
        suite = suite.with_settle_delay(Duration::from_millis(ms));
    }

    let runner = ScenarioRunner::new(endpoint)?;
    let report = suite.run(&runner).await;
    for (key, outcome) in report.outcomes() {
        println!(
            "{key:<32} {:<24} status={:<5} {:<20} {:?}",
            outcome.strategy.to_string(),
            outcome
                .status
                .map_or_else(|| "-".to_owned(), |s| s.to_string()),
            outcome.termination.label(),
            outcome.elapsed,
        );
    }
    println!(
        "{} runs, {} expected disconnects, {} anomalies; check the server log for lifecycle \
         violations",
        report.len(),
        report.expected_count(),
        report.anomalies().len(),
    );
    Ok(())
}

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use tether_api::HttpBackend;
use tether_core::ids::AgentId;
use tether_engine::{ChatEngine, WsConnector};
use tether_telemetry::TelemetryConfig;

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Line-oriented demo client for the chat engine")]
struct Args {
    /// Base URL of the chat backend's REST surface.
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    base_url: String,

    /// Realtime channel URL.
    #[arg(long, default_value = "ws://127.0.0.1:8787/ws")]
    realtime_url: String,

    /// Agent to address messages to. Without one, sends use the fallback path.
    #[arg(long)]
    agent_id: Option<String>,

    /// Emit one JSON object per log line.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tether_telemetry::init_telemetry(&TelemetryConfig {
        json_output: args.json_logs,
        ..Default::default()
    });

    let backend = Arc::new(HttpBackend::new(&args.base_url));
    let connector = Arc::new(WsConnector::new());
    let engine = ChatEngine::new(backend, connector, args.realtime_url.clone());

    engine.bootstrap().await?;
    {
        let store = engine.store();
        let store = store.lock();
        tracing::info!(sessions = store.sessions().len(), "chat state ready");
    }
    if let Some(agent) = args.agent_id {
        engine.select_agent(Some(AgentId::from_raw(agent)));
    }
    engine.connect().await;

    tracing::info!("ready; type a message and press enter, ctrl-c to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    if let Err(e) = engine.send_message(line.trim()).await {
                        tracing::error!("send failed: {e}");
                    }
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.shutdown();
    tracing::info!("shutting down");
    Ok(())
}

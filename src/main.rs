use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::bot::client::BotErr;
use crate::chat::ChatOrchestrator;
use crate::chat::provider::ProviderErr;
use crate::util::telemetry;

mod api;
mod bot;
mod chat;
mod classifier;
mod constants;
mod db;
mod levels;
mod progression;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Provider(#[from] ProviderErr),

    #[error(transparent)]
    Bot(#[from] BotErr),

    #[error(transparent)]
    Route(#[from] api::server::RouteError),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_registry = telemetry::Telemetry::new().await?.register();

    tracing::info!("starting main application");

    let pool = db::init().await;
    let orchestrator = Arc::new(ChatOrchestrator::from_env().await?);

    let (tx_server_ready, rx_server_ready) = tokio::sync::mpsc::unbounded_channel::<SocketAddr>();

    let mut handles = Vec::new();

    let server_handles =
        api::server::start_server(tx_server_ready, rx_server_ready, pool, orchestrator.clone())
            .await?;

    let bot_handles = bot::client::bot_runner(orchestrator).await?;

    handles.extend(server_handles);
    handles.extend(bot_handles);

    _ = join_all(handles).await;

    telemetry_registry.shutdown();
    Ok(())
}

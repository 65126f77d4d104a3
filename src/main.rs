//! Nexus - voice assistant core
//!
//! Routes each utterance to weather, music, image or free chat, keeps
//! conversational memory between turns and guards the monthly token budget.
//! Served over HTTP, or interactively with `nexus-assistant console`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod capabilities;
mod config;
mod conversation;
mod core;
mod providers;
mod reminders;
mod routes;
mod speech;
mod storage;

use capabilities::{HttpWeatherSource, StoredCatalog};
use config::{AssistantConfig, Config};
use crate::core::{AssistantEngine, AssistantRequest};
use providers::Provider;
use reminders::ReminderSchedule;
use speech::{ConsoleVoice, ListenLoop, Speaker, StdinInput};
use storage::{MemoryStore, SqliteStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AssistantEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_assistant=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let assistant_config = config.load_assistant_config()?;

    let db_path = config.data_dir.join("nexus.db");
    let store = match SqliteStore::new(&db_path).await {
        Ok(backend) => MemoryStore::new(Arc::new(backend)),
        Err(e) => {
            tracing::warn!(path = %db_path.display(), error = %e, "SQLite unavailable, memory will not survive a restart");
            MemoryStore::in_memory()
        }
    };

    let provider = Provider::from_config(&assistant_config.llm, &config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Chat provider unavailable; free chat will apologise");
        Provider::Unavailable(e.to_string())
    });

    let engine = Arc::new(AssistantEngine::new(
        &assistant_config,
        store.clone(),
        Arc::new(provider),
        Arc::new(HttpWeatherSource::new(assistant_config.weather.base_url.clone())),
        Arc::new(StoredCatalog::new(store)),
    ));

    tracing::info!(
        name = %assistant_config.assistant.name,
        provider = %assistant_config.llm.provider,
        routing = ?assistant_config.modes.routing,
        "🤖 Assistant ready"
    );

    if std::env::args().nth(1).as_deref() == Some("console") {
        return run_console(engine, &assistant_config).await;
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState { engine };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🔥 Nexus API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Interactive loop: stdin lines in, spoken replies out, reminders alongside
async fn run_console(engine: Arc<AssistantEngine>, assistant_config: &AssistantConfig) -> anyhow::Result<()> {
    let voice = Arc::new(ConsoleVoice::new(assistant_config.assistant.name.clone()));
    let speaker = Arc::new(Speaker::new(voice, &assistant_config.speech));
    let cancel = CancellationToken::new();

    let schedule = ReminderSchedule::from_config(&assistant_config.reminders)?;
    let reminder_task = tokio::spawn(reminders::run(schedule, speaker.clone(), cancel.clone()));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let utterances = ListenLoop::new(Box::new(StdinInput::new()), cancel.clone()).into_stream();
    futures::pin_mut!(utterances);

    tracing::info!("🎙️ Listening on stdin (/mute, /unmute, Ctrl+C to quit)");
    let mut conversation_id: Option<String> = None;

    while let Some(utterance) = utterances.next().await {
        match utterance.as_str() {
            "/mute" => {
                speaker.set_muted(true);
                continue;
            }
            "/unmute" => {
                speaker.set_muted(false);
                continue;
            }
            _ => {}
        }

        let request = AssistantRequest {
            conversation_id: conversation_id.clone(),
            ..AssistantRequest::new(utterance)
        };

        match engine.handle(request).await {
            Ok(response) => {
                if response.conversation_id.is_some() {
                    conversation_id = response.conversation_id.clone();
                }
                if let Some(alert) = &response.budget_alert {
                    tracing::warn!(level = ?alert.level, "{}", alert.message);
                }
                speaker.speak(&response.response).await?;
            }
            Err(e) => tracing::warn!(error = %e, "Utterance rejected"),
        }
    }

    cancel.cancel();
    reminder_task.await?;
    Ok(())
}

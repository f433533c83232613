use std::sync::Arc;

use anyhow::{bail, Context};
use telegram_gateway::api::{self, AppState};
use telegram_gateway::config::SandboxConfig;
use telegram_gateway::platform::sandbox::{SandboxAccount, SandboxPlatform};
use telegram_gateway::platform::Platform;
use telegram_gateway::GatewayConfig;

/// Sandbox backend seeded with one account and a few chats
async fn sandbox_platform(config: &SandboxConfig) -> SandboxPlatform {
    let mut account = SandboxAccount::new(config.phone.clone(), config.code.clone());
    if let Some(password) = &config.password {
        account = account.with_password(password.clone());
    }

    let platform = SandboxPlatform::new();
    platform.add_account(account).await;

    let friend = platform.add_contact(1001, "Olena", "Koval", Some("olena")).await;
    platform.add_message(friend, "Привіт!", false).await;
    platform.add_message(friend, "Hi, how are you?", true).await;
    let group = platform.add_group(2001, "Family").await;
    platform.add_message(group, "Dinner at 7", false).await;
    let channel = platform.add_channel(3001, "News").await;
    platform.add_message(channel, "Morning digest", false).await;

    log::info!("Sandbox backend ready, log in with {}", config.phone);
    platform
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    log::info!("Starting Telegram gateway...");

    let config = GatewayConfig::from_env().context("Failed to load configuration")?;
    log::info!("API ID: {}", config.credentials.api_id);

    let platform: Arc<dyn Platform> = match config.backend.as_str() {
        "sandbox" => Arc::new(sandbox_platform(&config.sandbox).await),
        other => bail!("Unsupported GATEWAY_BACKEND: {}", other),
    };

    tokio::fs::create_dir_all(&config.session_dir)
        .await
        .with_context(|| format!("Failed to create session dir {}", config.session_dir.display()))?;

    let state = AppState::new(platform, &config);
    let _sweeper = state.coordinator.spawn_sweeper();
    let app = api::router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    log::info!("Server listening on {}", address);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use smb_core::{
    config::Config,
    dispatcher::{Dispatcher, DispatcherDeps},
    locks::UserLocks,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    store::UserStore,
    users::UserService,
};
use smb_genius::{GeniusClient, GeniusConfig};
use smb_spotify::{SpotifyClient, SpotifyConfig};
use smb_sqlite::SqliteUserStore;
use smb_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    smb_core::logging::init("smb")?;

    let cfg = Config::load()?;
    info!(
        bot = cfg.telegram_bot_username.as_deref().unwrap_or("(unnamed)"),
        database = %cfg.database_path.display(),
        "smb starting"
    );

    let store: Arc<dyn UserStore> = Arc::new(
        SqliteUserStore::open(&cfg.database_path).context("failed to open user store")?,
    );

    let telegram = Arc::new(TelegramMessenger::from_token(
        &cfg.telegram_bot_token,
        cfg.telegram_message_limit,
    ));
    if cfg.register_webhook {
        telegram
            .register_webhook(
                &cfg.telegram_webhook_url(),
                &cfg.telegram_webhook_secret_token,
            )
            .await
            .context("failed to register telegram webhook")?;
    }

    // Keep a 429 RetryAfter retry in the adapter, but space calls out up front.
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        telegram,
        ThrottleConfig {
            global_min_interval: cfg.throttle_global,
            per_chat_min_interval: cfg.throttle_per_chat,
        },
    ));

    let mut spotify_cfg = SpotifyConfig::new(
        cfg.spotify_client_id.clone(),
        cfg.spotify_client_secret.clone(),
        cfg.spotify_redirect_uri(),
    );
    spotify_cfg.http_timeout = cfg.http_timeout;
    let spotify = Arc::new(SpotifyClient::new(
        spotify_cfg,
        Arc::new(UserService::new(store.clone())),
    )?);

    let mut genius_cfg = GeniusConfig::new(cfg.genius_access_token.clone());
    genius_cfg.http_timeout = cfg.http_timeout;
    let genius = Arc::new(GeniusClient::new(genius_cfg)?);

    // Chat handling and the OAuth callback both rewrite user records.
    let locks = Arc::new(UserLocks::default());

    let dispatcher = Arc::new(Dispatcher::new(DispatcherDeps {
        store,
        messenger,
        music: spotify.clone(),
        lyrics: genius,
        locks: locks.clone(),
        safe_limit: cfg.telegram_safe_limit,
    }));

    let app = smb_telegram::webhook::router(dispatcher, &cfg.telegram_webhook_secret_token)
        .merge(smb_spotify::callback::router(spotify, locks));

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("smb stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

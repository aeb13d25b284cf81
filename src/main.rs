use huddle::{config::Config, meetings::Metered, rooms::RoomRegistry, AppResult, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    if config.metered_domain.is_none() {
        info!("METERED_DOMAIN not set, room provisioning endpoints will fail");
    }

    let app_state = AppState {
        registry: RoomRegistry::new(),
        metered: Metered::from_config(&config),
    };

    let app = huddle::router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

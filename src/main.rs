pub mod commands;
pub mod config;
pub mod connection;
pub mod runtime;
pub mod session;
pub mod wire;

use config::Config;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so a terminal front end can own stdout
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env();

    log::info!("Starting weighlink kiosk session");
    log::info!("Configuration:");
    log::info!("   station channel: {}", config.ws_url);
    log::info!("   fallback HTTP:   {}", config.http_url);
    log::info!(
        "   series capacity: {}, stale timeout: {}s",
        config.series_capacity,
        config.stale_timeout_ms / 1000
    );
    log::info!(
        "   window: {}s, redraw every {}ms",
        config.window_ms / 1000,
        config.redraw_interval_ms
    );

    let session = runtime::start(&config)?;
    runtime::log_presentation_loop(session).await;

    Ok(())
}

use session_fleet::{Config, Controller, RecordDeriver, ToExitCode, wait_for_signal};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";
const CONFIG_ENV: &str = "SESSION_FLEET_CONFIG";

#[tokio::main]
async fn main() {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let config = match Config::load(&config_path).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = %e, "invalid configuration");
            std::process::exit(e.exit_code());
        }
    };

    let controller = match Controller::bootstrap(config, &RecordDeriver).await {
        Ok(controller) => controller,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            std::process::exit(e.exit_code());
        }
    };

    tokio::select! {
        _ = controller.run() => {}
        _ = wait_for_signal() => {}
    }
    controller.shutdown().await;
}

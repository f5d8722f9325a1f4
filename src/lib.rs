pub mod assessment;
pub mod bkt;
pub mod cache;
pub mod cat;
pub mod config;
pub mod content;
pub mod db;
pub mod irt;
pub mod logging;
pub mod path;
pub mod state;
pub mod tutor;
pub mod types;

use crate::config::Config;
use crate::db::StoreError;
use crate::logging::LogGuard;
use crate::state::AppState;

/// Loads configuration, installs logging and builds the shared state. Keep
/// the returned guard alive for as long as file logging should run.
pub async fn bootstrap() -> Result<(AppState, LogGuard), StoreError> {
    let config = Config::from_env();
    let guard = logging::init(&config.logging);
    let state = AppState::from_config(config).await?;
    Ok((state, guard))
}

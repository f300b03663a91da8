//! Stagehand - scripted workspace transitions
//!
//! Runs transition scripts against the in-memory host from `stagehand-core`,
//! printing load progress and transition phases as they happen.

pub mod error;
pub mod script;
pub mod session;

pub use error::DriverError;
pub use script::Step;
pub use session::{Session, Summary};

use stagehand_core::config::{load_config, load_from_file, load_sample_config, ConfigError};
use stagehand_core::StagehandConfig;
use std::path::Path;
use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing subscriber (only once)
///
/// Logs go to stderr so progress output on stdout stays readable.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "stagehand=info,stagehand_core=info".into()),
            ))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}

/// Load the configuration the CLI runs with
///
/// An explicit file wins over the project/user lookup. A config without a
/// catalog borrows the sample catalog so there is something to load.
pub fn resolve_config(explicit: Option<&Path>, project_dir: &Path) -> Result<StagehandConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => load_from_file(path)?,
        None => load_config(project_dir)?,
    };

    if config.catalog.is_empty() {
        tracing::debug!("no catalog configured, using the sample catalog");
        config.catalog = load_sample_config()?.catalog;
    }
    Ok(config)
}

pub mod config;
pub mod pipeline;

pub use config::{AnalysisConfig, ConfigError, EngineConfig};
pub use pipeline::analysis::{
    AnalysisEngine, AnalysisError, AnalysisService, AttributedReport, HttpAnalysisEngine,
    NotificationDispatcher, Notifier, ReportMode,
};
pub use pipeline::attribution::AttributionInstruction;
pub use pipeline::extraction::{normalize, NormalizedText};
pub use pipeline::import::UploadedDocument;

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set, otherwise `config.log_filter`. Calling this
/// again (or after another subscriber was installed) is a no-op.
pub fn init_tracing(config: &AnalysisConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
    }
}

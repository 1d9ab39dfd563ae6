pub mod config;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::EngineConfig;
pub use models::{Environment, RenderState, SessionState, TerminationReason, UserIntent};
pub use services::session_service::{SessionService, StartError};
pub use services::{AssessmentSource, MediaAccess, PermissionProvider, SubmissionSink};

/// Initialize tracing for a host binary or test run. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talentgate_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

mod error;
pub mod services;
mod state;

pub use error::{OutboxError, Result};
pub use state::AppState;

/// Initialize logging for binaries and tests. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();
}

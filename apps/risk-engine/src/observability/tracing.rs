//! Tracing subscriber setup.
//!
//! # Configuration
//!
//! - `RUST_LOG`: standard `EnvFilter` directives (default: `info`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use risk_engine::observability::init_tracing;
//!
//! fn main() {
//!     init_tracing();
//!     // ... application code
//! }
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize the console tracing subscriber.
///
/// Safe to call once per process; a second call is a no-op because a global
/// subscriber is already installed.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    let _ = Registry::default().with(env_filter).with(fmt_layer).try_init();
}

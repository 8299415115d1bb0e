//! Subscriber installation

use crate::logging_facility::test_capture::init_test_capture;
use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Which subscriber `init` installs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable lines, `shardsaga=debug`
    Development,
    /// One JSON object per event, `shardsaga=info`
    Production,
    /// Every event kept in memory, see [`init_test_capture`]
    Test,
}

impl Profile {
    fn default_filter(self) -> &'static str {
        match self {
            Profile::Development | Profile::Test => "shardsaga=debug",
            Profile::Production => "shardsaga=info",
        }
    }
}

static INIT_ONCE: Once = Once::new();

fn env_filter(profile: Profile) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(profile.default_filter()))
}

/// Install the global subscriber for `profile`
///
/// Only the first call in a process has an effect. `RUST_LOG` overrides the
/// profile's default filter. If the host application already installed a
/// subscriber, that one is kept.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(env_filter(profile))
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_current_span(false)
                .with_env_filter(env_filter(profile))
                .finish()
                .try_init(),
            Profile::Test => {
                init_test_capture();
                Ok(())
            }
        };
        if installed.is_err() {
            tracing::debug!(?profile, "subscriber already installed, keeping it");
        }
    });
}

//! Tracing subscriber setup for the command-line tool
//!
//! Output format is selected by `TYPEVM_LOG_FORMAT`:
//!
//! - `text` (default): plain `tracing-subscriber` lines
//! - `json`: one JSON object per event
//!
//! ```bash
//! TYPEVM_LOG=debug typevm check app.ts
//! TYPEVM_LOG="typevm::vm::machine=trace" TYPEVM_LOG_FORMAT=json typevm check app.ts
//! ```
//!
//! Nothing is installed unless `TYPEVM_LOG` or `RUST_LOG` is set.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    fn from_env() -> Self {
        Self::parse(&std::env::var("TYPEVM_LOG_FORMAT").unwrap_or_default())
    }
}

/// `TYPEVM_LOG` wins over `RUST_LOG` when both are set
fn build_filter() -> EnvFilter {
    match std::env::var("TYPEVM_LOG") {
        Ok(val) => EnvFilter::builder().parse_lossy(val),
        Err(_) => EnvFilter::from_default_env(),
    }
}

/// Install the global subscriber. Writes to stderr so stdout only carries
/// command output.
pub fn init_tracing() {
    let requested = std::env::var("TYPEVM_LOG").is_ok() || std::env::var("RUST_LOG").is_ok();
    if !requested {
        return;
    }

    let filter = build_filter();
    match LogFormat::from_env() {
        LogFormat::Json => {
            let json_layer = fmt::layer().json().with_writer(std::io::stderr);
            // A subscriber installed by an embedding program stays in place
            let _ = Registry::default().with(filter).with(json_layer).try_init();
        }
        LogFormat::Text => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

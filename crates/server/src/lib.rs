//! # Lister server
//!
//! HTTP front end for the `listing` engine: a full-page directory listing,
//! an expansion API for nested directories, direct file serving and a
//! request admission gate with persisted rate-limit and block state.
//!
//! ## Request flow
//!
//! ```text
//!  request ──► TraceLayer ──► admission gate ──┬──► /_lister/api?path=  (JSON)
//!                               │              └──► /<path>             (HTML or file)
//!                               ▼
//!                        AdmissionFilter
//!                   (FileStore under data_dir)
//! ```

pub mod admission;
pub mod config;
pub mod web;

use std::sync::Arc;

use anyhow::{Context, Result};
use listing::{BaseDirectory, DirectoryLister};

use crate::admission::{AdmissionFilter, AdmissionStore, FileStore, RateLimit, SystemClock};
use crate::config::Config;
use crate::web::AppState;

pub use config::ConfigError;

/// Build the shared handler state from a validated configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let base = BaseDirectory::new(&config.server.base_dir).with_context(|| {
        format!(
            "Failed to open base directory: {}",
            config.server.base_dir.display()
        )
    })?;
    let lister = DirectoryLister::new(base, config.scan_config()?);

    let admission = if config.security.enabled {
        let store: Arc<dyn AdmissionStore> = Arc::new(FileStore::new(&config.server.data_dir)?);
        Some(Arc::new(AdmissionFilter::new(
            RateLimit::from(&config.security),
            store,
            Arc::new(SystemClock),
        )))
    } else {
        tracing::warn!("Admission filter disabled");
        None
    };

    tracing::info!("Listing {:?}", lister.base().path());
    Ok(AppState {
        lister,
        title: config.server.title.clone(),
        admission,
    })
}

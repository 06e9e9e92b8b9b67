pub mod api;
pub mod config;
pub mod error;
pub mod slack;
pub mod state_machine;
pub mod status;

use std::sync::Arc;

pub use state_machine::{ProspectStore, StoreError, StoreSettings};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn short_hash(hash: &str) -> String {
    if hash.len() >= 8 {
        hash[..8].to_string()
    } else {
        hash.to_string()
    }
}

pub fn get_version() -> String {
    // Prefer the hash exported by the release pipeline
    if let Some(git_hash) = option_env!("SELLSCALE_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        short_hash(git_hash)
    } else {
        format!("v{}", built_info::PKG_VERSION)
    }
}

pub struct AppState {
    pub store: Arc<ProspectStore>,
}

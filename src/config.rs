//! Process configuration, loaded once at startup.
//!
//! Follows the teacher's `env::var(..).ok().and_then(...).unwrap_or(default)`
//! chains rather than a derive-based config crate.

use base64::Engine;
use rand::RngCore;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const MAX_RENDEZVOUS_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct Config {
    pub policy_version: String,
    pub policy_stamp_key: [u8; 32],
    pub reputation_decay_rate: f64,
    pub max_rendezvous_ttl: Duration,
    pub rate_limit_caps: (u32, u32, u32),
    pub sybil_threshold: usize,
    pub data_db_path: String,
    pub bind_addr: String,
}

impl Config {
    pub fn load() -> Self {
        load_env();

        let policy_version = env::var("POLICY_VERSION").unwrap_or_else(|_| "v1".to_string());

        let policy_stamp_key = env::var("POLICY_STAMP_KEY")
            .ok()
            .and_then(|raw| base64::engine::general_purpose::STANDARD.decode(raw).ok())
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .unwrap_or_else(|| {
                warn!("POLICY_STAMP_KEY not set; generating an ephemeral key for this process");
                let mut key = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            });

        let reputation_decay_rate = env::var("REPUTATION_DECAY_RATE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| *v >= 0.0)
            .unwrap_or(0.01);

        let max_rendezvous_ttl = env::var("MAX_RENDEZVOUS_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(MAX_RENDEZVOUS_TTL)
            .min(MAX_RENDEZVOUS_TTL);

        let rate_limit_caps = (
            env::var("RATE_LIMIT_CAP_15M")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            env::var("RATE_LIMIT_CAP_1H")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            env::var("RATE_LIMIT_CAP_24H")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        );

        let sybil_threshold = env::var("SYBIL_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let data_db_path = resolve_data_path(env::var("DATA_DB_PATH").ok(), "yachaq_coordinator.db");
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        Self {
            policy_version,
            policy_stamp_key,
            reputation_decay_rate,
            max_rendezvous_ttl,
            rate_limit_caps,
            sybil_threshold,
            data_db_path,
            bind_addr,
        }
    }
}

fn load_env() {
    let _ = dotenv::dotenv();
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for candidate in [manifest_dir.join(".env"), manifest_dir.join("../.env")] {
        if candidate.exists() {
            let _ = dotenv::from_path(&candidate);
        }
    }
}

fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return base.join("data").join(default_filename).to_string_lossy().to_string();
    };
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        p.to_string_lossy().to_string()
    } else {
        base.join(p).to_string_lossy().to_string()
    }
}

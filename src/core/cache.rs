use crate::config::{LogLevel, PlannerConfig};
use crate::core::codec::{self, CodecError};
use crate::game::events::EventStream;
use bincode::{Decode, Encode};
use log::{info, warn};
use std::fs;
use std::hash::Hasher;
use std::path::PathBuf;
use thiserror::Error;
use twox_hash::XxHash64;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode cache entry: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("could not decode cache entry: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// On-disk envelope around an encoded plan.
#[derive(Encode, Decode)]
struct CachedPlan {
    engine_version: String,
    source_hash: u64,
    config_fingerprint: u64,
    /// The plan in its persisted byte format.
    payload: Vec<u8>,
}

/// XxHash64 (seed 0) of arbitrary content, used to name cache entries.
pub fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Identifies the configurations a plan was computed with. A cached plan
/// from a different chain is stale. The log level does not affect planning
/// and is left out.
pub fn config_fingerprint(configs: &[PlannerConfig]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for config in configs {
        let keyed = PlannerConfig {
            log_level: LogLevel::Off,
            ..*config
        };
        // Plain struct of numbers and unit enums; serialization cannot fail.
        hasher.write(&serde_json::to_vec(&keyed).unwrap_or_default());
    }
    hasher.finish()
}

/// Content-addressed store of computed plans, one file per chart.
#[derive(Clone, Debug)]
pub struct PlanCache {
    dir: PathBuf,
}

impl PlanCache {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Opens the cache, creating its directory if needed.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, CacheError> {
        let cache = Self::new(dir);
        fs::create_dir_all(&cache.dir)?;
        Ok(cache)
    }

    pub fn path_for(&self, source_hash: u64) -> PathBuf {
        self.dir.join(format!("{source_hash:016x}.psap"))
    }

    pub fn contains(&self, source_hash: u64) -> bool {
        self.path_for(source_hash).exists()
    }

    /// Returns the cached plan when it exists and was produced by this engine
    /// version from the same source and configuration.
    pub fn load(&self, source_hash: u64, fingerprint: u64) -> Option<EventStream> {
        let path = self.path_for(source_hash);
        if !path.exists() {
            return None;
        }
        let buffer = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Could not read plan cache {path:?}: {e}");
                return None;
            }
        };
        let Ok((cached, _)) =
            bincode::decode_from_slice::<CachedPlan, _>(&buffer, bincode::config::standard())
        else {
            warn!("Plan cache {path:?} is corrupt; ignoring it.");
            return None;
        };

        if cached.source_hash != source_hash {
            info!("Plan cache stale (content hash mismatch) for {source_hash:016x}.");
            return None;
        }
        if cached.engine_version != ENGINE_VERSION {
            info!(
                "Plan cache stale (engine {} != {ENGINE_VERSION}) for {source_hash:016x}.",
                cached.engine_version
            );
            return None;
        }
        if cached.config_fingerprint != fingerprint {
            info!("Plan cache stale (planner settings changed) for {source_hash:016x}.");
            return None;
        }
        match codec::decode(&cached.payload) {
            Ok(stream) => {
                info!("Plan cache hit for {source_hash:016x}.");
                Some(stream)
            }
            Err(e) => {
                warn!("Plan cache {path:?} holds an unreadable plan: {e}");
                None
            }
        }
    }

    pub fn store(
        &self,
        source_hash: u64,
        fingerprint: u64,
        stream: &EventStream,
    ) -> Result<PathBuf, CacheError> {
        let cached = CachedPlan {
            engine_version: ENGINE_VERSION.to_string(),
            source_hash,
            config_fingerprint: fingerprint,
            payload: codec::encode(stream)?,
        };
        let encoded = bincode::encode_to_vec(&cached, bincode::config::standard())?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(source_hash);
        fs::write(&path, encoded)?;
        info!("Wrote plan cache {path:?}.");
        Ok(path)
    }
}

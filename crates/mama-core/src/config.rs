//! Environment and path configuration.
//!
//! The core reads `MAMA_DB_PATH` for the storage location. `MAMA_AUTH_TOKEN`
//! (bearer token for non-loopback HTTP callers) and `MAMA_ENABLE_V1_1`
//! (rollout gate) belong to external adapters; helpers are exposed so
//! adapters resolve them consistently.

use std::path::PathBuf;

use crate::error::{MamaError, Result};

/// Storage path override
pub const ENV_DB_PATH: &str = "MAMA_DB_PATH";

/// Bearer token adapters must require from non-loopback callers
pub const ENV_AUTH_TOKEN: &str = "MAMA_AUTH_TOKEN";

/// Rollout feature gate consulted by adapters
pub const ENV_ENABLE_V1_1: &str = "MAMA_ENABLE_V1_1";

/// Default database file name under `~/.claude/`
const DB_FILE_NAME: &str = "mama-memory.db";

/// Default backup directory name under `~/.claude/`
const BACKUP_DIR_NAME: &str = "mama-backups";

/// Storage path: `MAMA_DB_PATH` if set, else `~/.claude/mama-memory.db`.
pub fn resolve_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_DB_PATH) {
        if path.trim().is_empty() {
            return Err(MamaError::MissingEnv(format!("{ENV_DB_PATH} is set but empty")));
        }
        return Ok(PathBuf::from(path));
    }
    Ok(claude_dir()?.join(DB_FILE_NAME))
}

/// Default backup directory: `~/.claude/mama-backups/`.
pub fn default_backup_dir() -> Result<PathBuf> {
    Ok(claude_dir()?.join(BACKUP_DIR_NAME))
}

/// Whether the v1.1 rollout gate is on ("1", "true", "yes", case-insensitive).
pub fn v1_1_enabled() -> bool {
    std::env::var(ENV_ENABLE_V1_1)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Auth token for adapters serving non-loopback callers, if configured.
pub fn auth_token() -> Option<String> {
    std::env::var(ENV_AUTH_TOKEN).ok().filter(|t| !t.is_empty())
}

fn claude_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new()
        .ok_or_else(|| MamaError::Storage("could not determine home directory".to_string()))?;
    Ok(base.home_dir().join(".claude"))
}

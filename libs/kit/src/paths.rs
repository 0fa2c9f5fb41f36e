//! Per-user path resolution.
//!
//! Config, data and cache files live under the platform's standard user
//! directories, namespaced by program name. The kit stays app-agnostic:
//! the binary decides the name.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("no {kind} directory available for this user")]
pub struct PathsError {
    kind: &'static str,
}

#[derive(Debug, Clone)]
pub struct UserPaths {
    program: String,
}

impl UserPaths {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn config_dir(&self) -> Result<PathBuf, PathsError> {
        dirs::config_dir()
            .map(|dir| dir.join(&self.program))
            .ok_or(PathsError { kind: "config" })
    }

    pub fn data_dir(&self) -> Result<PathBuf, PathsError> {
        dirs::data_dir()
            .map(|dir| dir.join(&self.program))
            .ok_or(PathsError { kind: "data" })
    }

    pub fn cache_dir(&self) -> Result<PathBuf, PathsError> {
        dirs::cache_dir()
            .map(|dir| dir.join(&self.program))
            .ok_or(PathsError { kind: "cache" })
    }

    /// The default config file, `<config dir>/<program>.yml`.
    pub fn default_config_file(&self) -> Result<PathBuf, PathsError> {
        Ok(self.config_dir()?.join(format!("{}.yml", self.program)))
    }

    /// The shared state file, `<data dir>/state.yml`.
    pub fn state_file(&self) -> Result<PathBuf, PathsError> {
        Ok(self.data_dir()?.join("state.yml"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced_by_program() {
        let paths = UserPaths::new("steward");
        if let Ok(config) = paths.default_config_file() {
            assert!(config.ends_with("steward/steward.yml"));
        }
        if let Ok(state) = paths.state_file() {
            assert!(state.ends_with("steward/state.yml"));
        }
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PolicyError, PolicyResult};

/// Compiler settings.
///
/// Every optimization is observationally neutral: toggling any of them changes
/// storage size, never an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Omit dimension values whose subtree equals the "other values" subtree.
    #[serde(default = "default_true")]
    pub prune_values: bool,

    /// Promote single-occupant spaces into an existing superset space.
    #[serde(default = "default_true")]
    pub share_spaces: bool,

    /// Omit permissions that are false for every scope.
    #[serde(default = "default_true")]
    pub drop_dead_permissions: bool,

    /// Cell count above which compilation logs a warning. The number of cells
    /// grows with the number of compatible value combinations across
    /// dimensions.
    #[serde(default = "default_warn_cells")]
    pub warn_cells: usize,
}

fn default_true() -> bool {
    true
}

fn default_warn_cells() -> usize {
    100_000
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            prune_values: true,
            share_spaces: true,
            drop_dead_permissions: true,
            warn_cells: default_warn_cells(),
        }
    }
}

impl CompilerConfig {
    /// Every optimization off. Useful as a reference when checking that the
    /// optimized form answers identically.
    pub fn unoptimized() -> Self {
        Self {
            prune_values: false,
            share_spaces: false,
            drop_dead_permissions: false,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file. If the file does not exist,
    /// returns the default configuration.
    pub fn load(path: &Path) -> PolicyResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> PolicyResult<Self> {
        let config: CompilerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a TOML file.
    pub fn save(&self, path: &Path) -> PolicyResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PolicyError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if self.warn_cells == 0 {
            return Err(PolicyError::Config("warn_cells must be > 0".into()));
        }
        Ok(())
    }
}

//! Configuration system for the CryoSamba wizard.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/cryosamba/config.toml` and/or
//! `.cryosamba/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level settings for the wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Root directory holding one subdirectory per experiment.
    /// Relative paths are resolved against the workspace.
    pub runs_dir: PathBuf,
    pub devices: DevicesConfig,
    pub launcher: LauncherConfig,
    pub ui: UiConfig,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            devices: DevicesConfig::default(),
            launcher: LauncherConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

/// The device-reporting tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub program: String,
    /// Arguments producing the machine-parsable CSV report.
    pub query_args: Vec<String>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            program: "nvidia-smi".to_string(),
            query_args: vec![
                "--query-gpu=index,utilization.gpu,memory.free,memory.total,memory.used"
                    .to_string(),
                "--format=csv".to_string(),
            ],
        }
    }
}

/// The distributed launcher used for training and inference runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub program: String,
    /// Directory holding the training and inference entry points.
    pub scripts_dir: PathBuf,
    pub train_script: String,
    pub inference_script: String,
    pub omp_num_threads: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: "torchrun".to_string(),
            scripts_dir: PathBuf::from("."),
            train_script: "train.py".to_string(),
            inference_script: "inference.py".to_string(),
            omp_num_threads: 1,
        }
    }
}

/// Terminal presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Clear the screen on every screen change.
    pub clear_screen: bool,
    /// Show the welcome banner above the main menu.
    pub show_banner: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            clear_screen: true,
            show_banner: true,
        }
    }
}

/// Values given on the command line. Only set fields override lower layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runs_dir: Option<PathBuf>,
}

impl WizardConfig {
    /// Resolve `runs_dir` against the workspace when it is relative.
    pub fn resolve_runs_dir(&self, workspace: &Path) -> PathBuf {
        if self.runs_dir.is_absolute() {
            self.runs_dir.clone()
        } else {
            workspace.join(&self.runs_dir)
        }
    }

    /// Resolve the launcher scripts directory against the workspace when it is relative.
    pub fn resolve_scripts_dir(&self, workspace: &Path) -> PathBuf {
        if self.launcher.scripts_dir.is_absolute() {
            self.launcher.scripts_dir.clone()
        } else {
            workspace.join(&self.launcher.scripts_dir)
        }
    }

    /// Check settings that the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "devices.program must not be empty".to_string(),
            });
        }
        if self.launcher.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "launcher.program must not be empty".to_string(),
            });
        }
        if self.launcher.omp_num_threads == 0 {
            return Err(ConfigError::Invalid {
                message: "launcher.omp_num_threads must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "cryosamba", "cryosamba")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".cryosamba").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `CRYOSAMBA_`)
/// 3. Workspace-local config (`.cryosamba/config.toml`)
/// 4. User config (`~/.config/cryosamba/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<WizardConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(WizardConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // CRYOSAMBA_RUNS_DIR, CRYOSAMBA_LAUNCHER__PROGRAM, etc.
    figment = figment.merge(Env::prefixed("CRYOSAMBA_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: WizardConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Check whether any configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

/// Write the built-in defaults to the workspace config file.
///
/// Refuses to overwrite an existing file. Returns the path written.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        });
    }
    let content =
        toml::to_string_pretty(&WizardConfig::default()).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    std::fs::write(&path, content).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {e}", path.display()),
    })?;
    Ok(path)
}

//! Pilot configuration stored under `.pilot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::DEFAULT_MAX_CORRECTIONS;
use crate::core::step_check::MalformedStepPolicy;

/// Directory (under the project root) owned by pilot.
pub const STATE_DIR: &str = ".pilot";

/// Canonical paths within `.pilot/` for a project root.
#[derive(Debug, Clone)]
pub struct PilotPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub planner_dir: PathBuf,
}

impl PilotPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR);
        Self {
            root: root.clone(),
            config_path: state_dir.join("config.toml"),
            planner_dir: state_dir.join("planner"),
            state_dir,
        }
    }
}

/// Pilot configuration (TOML).
///
/// Missing fields default to the values below; command-line flags override
/// individual fields at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PilotConfig {
    /// Re-plan and retry automatically after a failed step.
    pub autonomous: bool,

    /// Correction cycles allowed per manual execution.
    pub max_corrections: u32,

    /// How to treat plan steps that are missing required fields.
    pub malformed_steps: MalformedStepPolicy,

    /// Extra names hidden from the project snapshot (`*.ext` and `prefix*`
    /// patterns allowed).
    pub ignore: Vec<String>,

    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Agent CLI invocation; output-schema and output-file flags are appended.
    pub command: Vec<String>,

    /// Wall-clock limit for one planner call, in seconds.
    pub timeout_secs: u64,

    /// Truncate planner stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Maximum bytes for the rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "--sandbox".to_string(),
                "read-only".to_string(),
            ],
            timeout_secs: 10 * 60,
            output_limit_bytes: 200_000,
            prompt_budget_bytes: 60_000,
        }
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            autonomous: false,
            max_corrections: DEFAULT_MAX_CORRECTIONS,
            malformed_steps: MalformedStepPolicy::Skip,
            ignore: Vec::new(),
            planner: PlannerConfig::default(),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.planner.timeout_secs == 0 {
            return Err(anyhow!("planner.timeout_secs must be > 0"));
        }
        if self.planner.output_limit_bytes == 0 {
            return Err(anyhow!("planner.output_limit_bytes must be > 0"));
        }
        if self.planner.prompt_budget_bytes == 0 {
            return Err(anyhow!("planner.prompt_budget_bytes must be > 0"));
        }
        if self.planner.command.is_empty() || self.planner.command[0].trim().is_empty() {
            return Err(anyhow!("planner.command must be a non-empty array"));
        }
        if self.ignore.iter().any(|p| p.trim().is_empty()) {
            return Err(anyhow!("ignore patterns must not be blank"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Create `.pilot/` with a default config. Existing config is kept unless
/// `force` is set. Returns whether the config file was written.
pub fn init_state_dir(root: &Path, force: bool) -> Result<bool> {
    let paths = PilotPaths::new(root);
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("create {}", paths.state_dir.display()))?;
    if !force && paths.config_path.exists() {
        return Ok(false);
    }
    write_config(&paths.config_path, &PilotConfig::default())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PilotConfig::default());
        assert_eq!(cfg.max_corrections, 5);
        assert!(!cfg.autonomous);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = PilotConfig {
            autonomous: true,
            malformed_steps: MalformedStepPolicy::Fail,
            ignore: vec!["*.tmp".to_string()],
            ..PilotConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_corrections = 2\nmalformed_steps = \"fail\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_corrections, 2);
        assert_eq!(cfg.malformed_steps, MalformedStepPolicy::Fail);
        assert_eq!(cfg.planner, PlannerConfig::default());
    }

    #[test]
    fn empty_planner_command_is_invalid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[planner]\ncommand = []\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("planner.command"));
    }

    #[test]
    fn init_keeps_existing_config_unless_forced() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(init_state_dir(temp.path(), false).expect("init"));
        let paths = PilotPaths::new(temp.path());
        fs::write(&paths.config_path, "autonomous = true\n").expect("edit");

        assert!(!init_state_dir(temp.path(), false).expect("init again"));
        assert!(load_config(&paths.config_path).expect("load").autonomous);

        assert!(init_state_dir(temp.path(), true).expect("force"));
        assert!(!load_config(&paths.config_path).expect("load").autonomous);
    }
}

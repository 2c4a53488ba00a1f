//! Engine configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::responses::GradingSettings;
use crate::tolerance::{Tolerance, DEFAULT_TOLERANCE};

/// Limits for the check-script sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock budget per script run.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Operation budget per script run.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    /// Lift the sandbox's safety restrictions.
    #[serde(default)]
    pub allow_unsafe: bool,
}

fn default_timeout_ms() -> u64 {
    2000
}
fn default_max_operations() -> u64 {
    1_000_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_operations: default_max_operations(),
            allow_unsafe: false,
        }
    }
}

/// Top-level answerkey configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerkeyConfig {
    /// Tolerance for numerical questions that don't declare one.
    #[serde(default = "default_tolerance")]
    pub default_tolerance: String,
    /// Fraction of max points for partial credit without explicit values.
    #[serde(default = "default_partial_credit_fraction")]
    pub partial_credit_fraction: f64,
    /// Default expansion multiple for `close` partial credit.
    #[serde(default = "default_partial_range")]
    pub partial_range: f64,
    /// Max problems graded concurrently in batch mode.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

fn default_tolerance() -> String {
    DEFAULT_TOLERANCE.to_string()
}
fn default_partial_credit_fraction() -> f64 {
    0.5
}
fn default_partial_range() -> f64 {
    2.0
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./answerkey-results")
}

impl Default for AnswerkeyConfig {
    fn default() -> Self {
        Self {
            default_tolerance: default_tolerance(),
            partial_credit_fraction: default_partial_credit_fraction(),
            partial_range: default_partial_range(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl AnswerkeyConfig {
    /// Grading defaults derived from this configuration.
    pub fn settings(&self) -> Result<GradingSettings> {
        let default_tolerance = self
            .default_tolerance
            .parse::<Tolerance>()
            .with_context(|| format!("bad default_tolerance '{}'", self.default_tolerance))?;
        if !(0.0..=1.0).contains(&self.partial_credit_fraction) {
            anyhow::bail!(
                "partial_credit_fraction must be between 0 and 1, got {}",
                self.partial_credit_fraction
            );
        }
        if !(self.partial_range.is_finite() && self.partial_range > 0.0) {
            anyhow::bail!("partial_range must be positive, got {}", self.partial_range);
        }
        Ok(GradingSettings {
            default_tolerance,
            partial_credit_fraction: self.partial_credit_fraction,
            partial_range: self.partial_range,
            allow_unsafe: self.sandbox.allow_unsafe,
        })
    }

    /// Apply `ANSWERKEY_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(ms) = lookup("ANSWERKEY_SANDBOX_TIMEOUT_MS") {
            self.sandbox.timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("ANSWERKEY_SANDBOX_TIMEOUT_MS is not a number: '{ms}'"))?;
        }
        if let Some(flag) = lookup("ANSWERKEY_ALLOW_UNSAFE") {
            self.sandbox.allow_unsafe = matches!(flag.trim().to_lowercase().as_str(), "1" | "true");
        }
        self.default_tolerance = resolve_env_vars(&self.default_tolerance, &lookup);
        let output_dir = resolve_env_vars(&self.output_dir.to_string_lossy(), &lookup);
        self.output_dir = PathBuf::from(output_dir);
        Ok(())
    }
}

/// Expand `${VAR}` references. Unset variables expand to nothing.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&lookup(&rest[start + 2..start + len]).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from the default locations.
///
/// Search order:
/// 1. `answerkey.toml` in the current directory
/// 2. `~/.config/answerkey/config.toml`
///
/// Environment overrides: `ANSWERKEY_SANDBOX_TIMEOUT_MS`, `ANSWERKEY_ALLOW_UNSAFE`.
pub fn load_config() -> Result<AnswerkeyConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AnswerkeyConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("answerkey.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<AnswerkeyConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AnswerkeyConfig::default(),
    };

    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("answerkey"))
}

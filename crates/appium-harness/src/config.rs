//! Harness configuration
//!
//! Loaded from YAML, then overridden by `--capability key value` pairs and the
//! `APPIUM_CAPTURE_DEBUG` / `APPIUM_EXCLUDE_DEBUG` environment variables.
//!
//! ```yaml
//! server:
//!   host: 127.0.0.1
//!   port: 4723
//! capabilities:
//!   platformName: Android
//!   appPackage: com.example
//! capture_debug: always
//! scroll:
//!   max_swipes: 6
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::locator::{
    ScrollOptions, DEFAULT_MAX_SWIPES, DEFAULT_SCROLL_DISTANCE, DEFAULT_SWIPE_DISTANCE,
    DEFAULT_SWIPE_DURATION_MS,
};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::DeadlineOptions;

/// Environment variable selecting when debug artefacts are captured
pub const CAPTURE_DEBUG_ENV: &str = "APPIUM_CAPTURE_DEBUG";

/// Environment variable listing debug artefacts to skip (comma separated)
pub const EXCLUDE_DEBUG_ENV: &str = "APPIUM_EXCLUDE_DEBUG";

/// When to capture debug artefacts after a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureDebug {
    /// Never capture
    Never,
    /// Capture only for failed tests
    #[default]
    Failure,
    /// Capture for every test
    Always,
}

impl CaptureDebug {
    /// Whether a test with this outcome should be captured
    #[must_use]
    pub const fn should_capture(self, failed: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Failure => failed,
            Self::Always => true,
        }
    }
}

impl FromStr for CaptureDebug {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "failure" => Ok(Self::Failure),
            "always" => Ok(Self::Always),
            other => Err(HarnessError::Config {
                message: format!("capture_debug must be never, failure or always, got '{other}'"),
            }),
        }
    }
}

/// Remote automation server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4723,
        }
    }
}

/// Swipe defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Swipe duration in milliseconds
    pub swipe_duration_ms: u64,
    /// Fraction of the swipe area covered
    pub swipe_distance: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_duration_ms: DEFAULT_SWIPE_DURATION_MS,
            swipe_distance: DEFAULT_SWIPE_DISTANCE,
        }
    }
}

/// Scroll-retry defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Swipes per direction
    pub max_swipes: u32,
    /// Fraction of the viewport covered per swipe
    pub swipe_distance: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_swipes: DEFAULT_MAX_SWIPES,
            swipe_distance: DEFAULT_SCROLL_DISTANCE,
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Remote server
    pub server: ServerConfig,
    /// Desired session capabilities
    pub capabilities: Map<String, Value>,
    /// When to capture debug artefacts
    pub capture_debug: CaptureDebug,
    /// Debug artefacts to skip
    pub exclude_debug: Vec<String>,
    /// Swipe defaults
    pub gestures: GestureConfig,
    /// Scroll-retry defaults
    pub scroll: ScrollConfig,
    /// Service readiness gate
    pub readiness: DeadlineOptions,
}

impl HarnessConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a YAML file
    ///
    /// # Errors
    ///
    /// I/O, YAML and validation errors.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text
    pub fn from_yaml_str(yaml: &str) -> HarnessResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> HarnessResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    fn validate(&self) -> HarnessResult<()> {
        let invalid = |message: String| Err(HarnessError::Config { message });

        if self.server.host.trim().is_empty() {
            return invalid("server.host must not be empty".to_string());
        }
        if self.server.port == 0 {
            return invalid("server.port must not be 0".to_string());
        }
        for (name, distance) in [
            ("gestures.swipe_distance", self.gestures.swipe_distance),
            ("scroll.swipe_distance", self.scroll.swipe_distance),
        ] {
            if !distance.is_finite() || distance <= 0.0 {
                return invalid(format!("{name} must be a positive fraction, got {distance}"));
            }
        }
        Ok(())
    }

    /// Merge `key value` pairs over the file's capabilities.
    ///
    /// Values that parse as JSON (`true`, `4723`, `["a"]`) keep their type;
    /// anything else is a string.
    #[must_use]
    pub fn apply_capability_overrides<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        for (key, raw) in pairs {
            let raw = raw.as_ref();
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            self.capabilities.insert(key.into(), value);
        }
        self
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> HarnessResult<Self> {
        self.env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn env_overrides_from<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(CAPTURE_DEBUG_ENV) {
            self.capture_debug = mode.parse()?;
        }
        if let Some(excluded) = lookup(EXCLUDE_DEBUG_ENV) {
            self.exclude_debug = excluded
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(self)
    }

    /// WebDriver endpoint URL
    #[must_use]
    pub fn command_executor(&self) -> String {
        format!("http://{}:{}/wd/hub", self.server.host, self.server.port)
    }

    /// Whether debug artefacts should be captured for a test outcome
    #[must_use]
    pub const fn should_capture(&self, failed: bool) -> bool {
        self.capture_debug.should_capture(failed)
    }

    /// Whether a named debug artefact is excluded
    #[must_use]
    pub fn is_excluded(&self, artefact: &str) -> bool {
        self.exclude_debug.iter().any(|name| name == artefact)
    }

    /// Lower-cased `platformName`, if set
    #[must_use]
    pub fn platform(&self) -> Option<String> {
        self.capabilities
            .get("platformName")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
    }

    /// Default swipe duration
    #[must_use]
    pub const fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.gestures.swipe_duration_ms)
    }

    /// Scroll-retry options built from the defaults
    #[must_use]
    pub fn scroll_options(&self) -> ScrollOptions {
        ScrollOptions::default()
            .with_max_swipes(self.scroll.max_swipes)
            .with_distance(self.scroll.swipe_distance)
    }
}

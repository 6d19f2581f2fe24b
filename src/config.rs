//! Application configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--log-file`, `--no-watch`)
//! 2. `$TREE_INSPECT_CONFIG` environment variable (path to config file)
//! 3. Project-local `.tree-inspect.toml` in the current working directory
//! 4. Global `~/.config/tree-inspect/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::executor::{
    ExecutorConfig, DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_THREAD_NAME,
};
use crate::provider::fs::{WatchSettings, DEFAULT_DEBOUNCE_MS, DEFAULT_FLOOD_THRESHOLD};

// ── Section configs ──────────────────────────────────────────────────────────

/// Worker thread and queue settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ExecutorSection {
    /// Name given to the worker thread.
    pub thread_name: Option<String>,
    /// Upper bound on one idle wait of the worker loop.
    pub poll_interval_ms: Option<u64>,
    /// How long shutdown waits for the worker before detaching it.
    pub join_timeout_ms: Option<u64>,
    /// Minimum spacing of wake signals; 0 disables debouncing.
    pub wake_debounce_ms: Option<u64>,
    /// Run queued work before the worker exits.
    pub drain_on_shutdown: Option<bool>,
    /// Let worker loop faults crash the worker instead of being logged.
    pub diagnostics: Option<bool>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Enable change subscriptions for the filesystem provider.
    pub enabled: Option<bool>,
    /// Debounce interval in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Events per debounce window above which a directory is just invalidated.
    pub flood_threshold: Option<usize>,
    /// Path components to ignore.
    pub ignore: Option<Vec<String>>,
}

/// Terminal UI settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UiConfig {
    /// Color scheme: "dark" or "light".
    pub theme: Option<String>,
    /// Render tick in milliseconds.
    pub tick_ms: Option<u64>,
    /// Enable mouse support.
    pub mouse: Option<bool>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<PathBuf>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub executor: ExecutorSection,
    pub watcher: WatcherConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

/// Default render tick in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 16;
/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Directory name used under the platform config and cache dirs.
pub const APP_DIR: &str = "tree-inspect";

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("TREE_INSPECT_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".tree-inspect.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(APP_DIR).join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning printed to stderr).
///
/// Logging is not up yet when configuration loads, hence stderr.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return None,
    };
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            executor: ExecutorSection {
                thread_name: other
                    .executor
                    .thread_name
                    .clone()
                    .or(self.executor.thread_name),
                poll_interval_ms: other
                    .executor
                    .poll_interval_ms
                    .or(self.executor.poll_interval_ms),
                join_timeout_ms: other
                    .executor
                    .join_timeout_ms
                    .or(self.executor.join_timeout_ms),
                wake_debounce_ms: other
                    .executor
                    .wake_debounce_ms
                    .or(self.executor.wake_debounce_ms),
                drain_on_shutdown: other
                    .executor
                    .drain_on_shutdown
                    .or(self.executor.drain_on_shutdown),
                diagnostics: other.executor.diagnostics.or(self.executor.diagnostics),
            },
            watcher: WatcherConfig {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
                debounce_ms: other.watcher.debounce_ms.or(self.watcher.debounce_ms),
                flood_threshold: other
                    .watcher
                    .flood_threshold
                    .or(self.watcher.flood_threshold),
                ignore: other.watcher.ignore.clone().or(self.watcher.ignore),
            },
            ui: UiConfig {
                theme: other.ui.theme.clone().or(self.ui.theme),
                tick_ms: other.ui.tick_ms.or(self.ui.tick_ms),
                mouse: other.ui.mouse.or(self.ui.mouse),
            },
            logging: LoggingConfig {
                level: other.logging.level.clone().or(self.logging.level),
                file: other.logging.file.clone().or(self.logging.file),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Walk in reverse so that highest-priority (env var) overwrites lower.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn thread_name(&self) -> &str {
        self.executor
            .thread_name
            .as_deref()
            .unwrap_or(DEFAULT_THREAD_NAME)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.executor
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(
            self.executor
                .join_timeout_ms
                .unwrap_or(DEFAULT_JOIN_TIMEOUT_MS),
        )
    }

    pub fn wake_debounce(&self) -> Duration {
        Duration::from_millis(self.executor.wake_debounce_ms.unwrap_or(0))
    }

    pub fn drain_on_shutdown(&self) -> bool {
        self.executor.drain_on_shutdown.unwrap_or(false)
    }

    pub fn diagnostics(&self) -> bool {
        self.executor.diagnostics.unwrap_or(false)
    }

    /// Executor tuning assembled from the `[executor]` section.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            thread_name: self.thread_name().to_string(),
            poll_interval: self.poll_interval(),
            join_timeout: self.join_timeout(),
            wake_debounce: self.wake_debounce(),
            drain_on_shutdown: self.drain_on_shutdown(),
            diagnostics: self.diagnostics(),
        }
    }

    /// Whether filesystem watches are installed.
    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(true)
    }

    /// Watcher debounce interval in milliseconds.
    pub fn debounce_ms(&self) -> u64 {
        self.watcher.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    pub fn flood_threshold(&self) -> usize {
        self.watcher
            .flood_threshold
            .unwrap_or(DEFAULT_FLOOD_THRESHOLD)
    }

    /// Watch settings for the filesystem provider.
    pub fn watch_settings(&self) -> WatchSettings {
        let defaults = WatchSettings::default();
        WatchSettings {
            enabled: self.watcher_enabled(),
            debounce: Duration::from_millis(self.debounce_ms()),
            ignore_patterns: self
                .watcher
                .ignore
                .clone()
                .unwrap_or(defaults.ignore_patterns),
            flood_threshold: self.flood_threshold(),
        }
    }

    /// Theme scheme: "dark" or "light".
    pub fn theme_scheme(&self) -> &str {
        self.ui.theme.as_deref().unwrap_or("dark")
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.ui.tick_ms.unwrap_or(DEFAULT_TICK_MS))
    }

    /// Whether mouse support is enabled.
    pub fn mouse_enabled(&self) -> bool {
        self.ui.mouse.unwrap_or(true)
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Log file path; falls back to the platform cache directory.
    pub fn log_file(&self) -> PathBuf {
        self.logging.file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("tree-inspect.log")
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.thread_name(), "affinity-worker");
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1000));
        assert_eq!(cfg.join_timeout(), Duration::from_millis(1000));
        assert_eq!(cfg.wake_debounce(), Duration::ZERO);
        assert!(!cfg.drain_on_shutdown());
        assert!(!cfg.diagnostics());
        assert!(cfg.watcher_enabled());
        assert_eq!(cfg.debounce_ms(), 300);
        assert_eq!(cfg.flood_threshold(), 100);
        assert_eq!(cfg.theme_scheme(), "dark");
        assert_eq!(cfg.tick_rate(), Duration::from_millis(16));
        assert!(cfg.mouse_enabled());
        assert_eq!(cfg.log_level(), "info");
        assert!(cfg.log_file().ends_with("tree-inspect/tree-inspect.log"));
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[executor]
thread_name = "ui-automation"
poll_interval_ms = 250
join_timeout_ms = 5000
wake_debounce_ms = 20
drain_on_shutdown = true
diagnostics = true

[watcher]
enabled = false
debounce_ms = 500
flood_threshold = 10
ignore = ["build"]

[ui]
theme = "light"
tick_ms = 50
mouse = false

[logging]
level = "debug"
file = "/tmp/inspect.log"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        let executor = cfg.executor_config();
        assert_eq!(executor.thread_name, "ui-automation");
        assert_eq!(executor.poll_interval, Duration::from_millis(250));
        assert_eq!(executor.join_timeout, Duration::from_millis(5000));
        assert_eq!(executor.wake_debounce, Duration::from_millis(20));
        assert!(executor.drain_on_shutdown);
        assert!(executor.diagnostics);

        let watch = cfg.watch_settings();
        assert!(!watch.enabled);
        assert_eq!(watch.debounce, Duration::from_millis(500));
        assert_eq!(watch.flood_threshold, 10);
        assert_eq!(watch.ignore_patterns, vec!["build".to_string()]);

        assert_eq!(cfg.theme_scheme(), "light");
        assert_eq!(cfg.tick_rate(), Duration::from_millis(50));
        assert!(!cfg.mouse_enabled());
        assert_eq!(cfg.log_level(), "debug");
        assert_eq!(cfg.log_file(), PathBuf::from("/tmp/inspect.log"));
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[executor]
drain_on_shutdown = true
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(cfg.drain_on_shutdown());
        // Everything else should be defaults
        assert_eq!(cfg.thread_name(), "affinity-worker");
        assert_eq!(cfg.debounce_ms(), 300);
        assert_eq!(
            cfg.watch_settings().ignore_patterns,
            WatchSettings::default().ignore_patterns
        );
    }

    #[test]
    fn test_toml_parsing_empty() {
        let cfg: AppConfig = toml::from_str("").expect("parse failed");
        assert!(cfg.watcher_enabled());
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            executor: ExecutorSection {
                poll_interval_ms: Some(100),
                join_timeout_ms: Some(200),
                ..Default::default()
            },
            ..Default::default()
        };

        let over = AppConfig {
            executor: ExecutorSection {
                poll_interval_ms: Some(300),
                // join_timeout_ms not set, should keep base
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.poll_interval(), Duration::from_millis(300));
        assert_eq!(merged.join_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(false),
                debounce_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };
        let over = AppConfig::default();

        let merged = base.merge(&over);
        assert!(!merged.watcher_enabled());
        assert_eq!(merged.debounce_ms(), 500);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[ui]
theme = "light"

[logging]
level = "trace"
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.theme_scheme(), "light");
        assert_eq!(cfg.log_level(), "trace");
        // Unset fields fall through to defaults
        assert_eq!(cfg.tick_rate(), Duration::from_millis(16));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[watcher]
enabled = true
debounce_ms = 120
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            watcher: WatcherConfig {
                enabled: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        // CLI override wins
        assert!(!cfg.watcher_enabled());
        // File value preserved (not overridden by CLI)
        assert_eq!(cfg.debounce_ms(), 120);
    }
}

//! Runtime configuration.
//!
//! Settings come from `TCLTK_*` environment variables, or from the same
//! `KEY=VALUE` pairs written one per line (as in an env file):
//!
//! | Key                       | Meaning                                  | Default |
//! |---------------------------|------------------------------------------|---------|
//! | `TCLTK_EVENT_DELAY_MS`    | delay before the first scheduled drain   | 100     |
//! | `TCLTK_EVENT_INTERVAL_MS` | period between scheduled drains          | 50      |
//! | `TCLTK_NO_TK`             | skip toolkit initialization when truthy  | unset   |
//! | `TCLTK_RC`                | startup script sourced by the runner     | search  |
//!
//! Malformed values are reported and otherwise ignored; the default stays.
//! Lines starting with `#` are comments.

use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading configuration.
#[derive(Debug)]
pub struct ConfigError {
    /// 1-based line, or 0 when the value came from the environment.
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            f.write_str(&self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

pub const DEFAULT_EVENT_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_EVENT_INTERVAL: Duration = Duration::from_millis(50);

/// Scheduler timing, toolkit and startup-script settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub event_delay: Duration,
    pub event_interval: Duration,
    /// Initialize the toolkit (photo images) in new runner interpreters.
    pub init_tk: bool,
    /// Explicit startup script; `None` means search the usual places.
    pub rc_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_delay: DEFAULT_EVENT_DELAY,
            event_interval: DEFAULT_EVENT_INTERVAL,
            init_tk: true,
            rc_file: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from the process environment.
    pub fn from_env() -> (Self, Vec<ConfigError>) {
        Self::load_pairs(std::env::vars().filter(|(k, _)| k.starts_with("TCLTK_")))
    }

    /// Apply `(key, value)` pairs in order.  Unknown keys are ignored.
    pub fn load_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> (Self, Vec<ConfigError>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Config::new();
        let mut errors = Vec::new();
        for (key, value) in pairs {
            if let Err(message) = config.apply(key.as_ref(), value.as_ref()) {
                errors.push(ConfigError { line: 0, message });
            }
        }
        (config, errors)
    }

    /// Parse `KEY=VALUE` lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let result = match line.split_once('=') {
                Some((key, value)) => config.apply(key.trim(), unquote(value.trim())),
                None => Err(format!("expected KEY=VALUE, got `{line}`")),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: i + 1, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a settings file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "TCLTK_EVENT_DELAY_MS" => self.event_delay = parse_millis(key, value)?,
            "TCLTK_EVENT_INTERVAL_MS" => {
                let interval = parse_millis(key, value)?;
                if interval.is_zero() {
                    return Err(format!("{key}: interval must be positive"));
                }
                self.event_interval = interval;
            }
            "TCLTK_NO_TK" => self.init_tk = !parse_flag(key, value)?,
            "TCLTK_RC" => {
                self.rc_file = if value.is_empty() { None } else { Some(PathBuf::from(value)) }
            }
            _ => {}
        }
        Ok(())
    }

    /// The startup script to source: the explicit `rc_file`, else the first
    /// existing of `~/.tcltkrc` and `<config dir>/tcltkrc`.
    pub fn rc_path(&self) -> Option<PathBuf> {
        if let Some(p) = &self.rc_file {
            return Some(p.clone());
        }
        rc_candidates().into_iter().find(|p| p.exists())
    }
}

// ── Value parsing ─────────────────────────────────────────────────────────────

fn parse_millis(key: &str, value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| format!("{key}: invalid milliseconds `{value}`"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "no" | "false" | "off" => Ok(false),
        "1" | "yes" | "true" | "on" => Ok(true),
        _ => Err(format!("{key}: expected a boolean, got `{value}`")),
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|t| t.strip_suffix('"')).unwrap_or(s)
}

fn rc_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = directories::BaseDirs::new() {
        paths.push(base.home_dir().join(".tcltkrc"));
    }
    if let Some(proj) = directories::ProjectDirs::from("", "", "tcltk") {
        paths.push(proj.config_dir().join("tcltkrc"));
    }
    paths
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.event_delay, Duration::from_millis(100));
        assert_eq!(c.event_interval, Duration::from_millis(50));
        assert!(c.init_tk);
        assert!(c.rc_file.is_none());
    }

    #[test]
    fn pairs_override_defaults() {
        let (c, errs) = Config::load_pairs([
            ("TCLTK_EVENT_DELAY_MS", "5"),
            ("TCLTK_EVENT_INTERVAL_MS", "7"),
            ("TCLTK_NO_TK", "yes"),
            ("TCLTK_RC", "/tmp/rc.tcl"),
            ("UNRELATED", "x"),
        ]);
        assert!(errs.is_empty());
        assert_eq!(c.event_delay, Duration::from_millis(5));
        assert_eq!(c.event_interval, Duration::from_millis(7));
        assert!(!c.init_tk);
        assert_eq!(c.rc_path(), Some(PathBuf::from("/tmp/rc.tcl")));
    }

    #[test]
    fn bad_values_are_collected() {
        let (c, errs) = Config::load_pairs([
            ("TCLTK_EVENT_DELAY_MS", "soon"),
            ("TCLTK_EVENT_INTERVAL_MS", "0"),
            ("TCLTK_NO_TK", "maybe"),
        ]);
        assert_eq!(errs.len(), 3);
        assert_eq!(c, Config::default());
        assert_eq!(errs[0].to_string(), "TCLTK_EVENT_DELAY_MS: invalid milliseconds `soon`");
    }

    #[test]
    fn lines_with_comments() {
        let src = "# timing\nTCLTK_EVENT_DELAY_MS=250\n\nTCLTK_RC=\"/etc/x.tcl\"\nnonsense\n";
        let (c, errs) = Config::load_str(src);
        assert_eq!(c.event_delay, Duration::from_millis(250));
        assert_eq!(c.rc_file, Some(PathBuf::from("/etc/x.tcl")));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 5);
        assert!(errs[0].to_string().starts_with("line 5: expected KEY=VALUE"));
    }

    #[test]
    fn load_file_reads_disk() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "TCLTK_NO_TK=1").unwrap();
        let (c, errs) = Config::load_file(f.path()).unwrap();
        assert!(errs.is_empty());
        assert!(!c.init_tk);
    }
}

//! sf-config: text configuration reader
//!
//! Parses the key-value configuration format: `[section]` markers group
//! `key = value` lines; values may be bare, single- or double-quoted; `#`
//! starts a comment. Section and key lookup is case-insensitive. A config
//! set layers files (system, user, then the file named by the
//! `SOUNDFIELD_CONF` environment variable), later files overriding earlier
//! ones.
//!
//! Environment variables consulted elsewhere in the stack:
//! `SOUNDFIELD_DRIVERS` overrides `[general] drivers`;
//! `SOUNDFIELD_LOGLEVEL` and `SOUNDFIELD_LOGFILE` steer diagnostics.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Environment variable naming an extra config file.
pub const ENV_CONF: &str = "SOUNDFIELD_CONF";
/// Environment variable overriding the driver preference list.
pub const ENV_DRIVERS: &str = "SOUNDFIELD_DRIVERS";
/// Environment variable selecting the diagnostic level (0-4).
pub const ENV_LOGLEVEL: &str = "SOUNDFIELD_LOGLEVEL";
/// Environment variable redirecting diagnostics to a file.
pub const ENV_LOGFILE: &str = "SOUNDFIELD_LOGFILE";

/// The diagnostic level requested through `SOUNDFIELD_LOGLEVEL`, as a
/// `log` level filter. Hosts hand this to whatever logger they install.
pub fn log_level_from_env() -> Option<log::LevelFilter> {
    let value = std::env::var(ENV_LOGLEVEL).ok()?;
    Some(match value.trim() {
        "0" => log::LevelFilter::Off,
        "1" => log::LevelFilter::Error,
        "2" => log::LevelFilter::Warn,
        "3" => log::LevelFilter::Info,
        _ => log::LevelFilter::Trace,
    })
}

/// The diagnostic file path requested through `SOUNDFIELD_LOGFILE`.
pub fn log_file_from_env() -> Option<std::path::PathBuf> {
    std::env::var(ENV_LOGFILE)
        .ok()
        .filter(|v| !v.is_empty())
        .map(std::path::PathBuf::from)
}

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Parsed configuration: sections of key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// section (lowercase) -> key (lowercase) -> value.
    blocks: HashMap<String, HashMap<String, String>>,
}

impl Config {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the layered configuration: an optional base file plus the file
    /// named by `SOUNDFIELD_CONF`, later entries overriding earlier ones.
    pub fn load(base: Option<&Path>) -> Self {
        let mut config = Self::new();
        if let Some(path) = base {
            if let Err(err) = config.merge_file(path) {
                log::warn!("failed to read config {}: {err}", path.display());
            }
        }
        if let Ok(extra) = std::env::var(ENV_CONF) {
            if !extra.is_empty() {
                if let Err(err) = config.merge_file(Path::new(&extra)) {
                    log::warn!("failed to read {ENV_CONF} config {extra}: {err}");
                }
            }
        }
        config
    }

    /// Parse a file into this configuration, overriding duplicate keys.
    pub fn merge_file(&mut self, path: &Path) -> ConfigResult<()> {
        let text = fs::read_to_string(path)?;
        self.merge_str(&text);
        Ok(())
    }

    /// Parse configuration text into this configuration.
    pub fn merge_str(&mut self, text: &str) {
        let mut section = String::new();
        for raw_line in text.lines() {
            // Strip comments, then whitespace.
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                match rest.strip_suffix(']') {
                    Some(name) if !name.is_empty() => {
                        section = name.to_ascii_lowercase();
                    }
                    _ => {
                        log::warn!("config parse error: bad line \"{line}\"");
                    }
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                log::warn!("config parse error: bad line \"{line}\"");
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                log::warn!("config parse error: bad line \"{line}\"");
                continue;
            }
            let value = unquote(value.trim()).to_string();
            self.blocks
                .entry(section.clone())
                .or_default()
                .insert(key, value);
        }
    }

    /// Raw string lookup. Section `""` is the unnamed leading section;
    /// `general` keys live in the `[general]` section.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.blocks
            .get(&section.to_ascii_lowercase())
            .and_then(|block| block.get(&key.to_ascii_lowercase()))
            .map(|s| s.as_str())
    }

    /// String lookup with a default.
    pub fn get_or<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key).unwrap_or(default)
    }

    /// Integer lookup; unparsable values fall back to the default with a
    /// warning.
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.get(section, key) {
            None => default,
            Some(v) => v.parse().unwrap_or_else(|_| {
                log::warn!("config: non-integer value for {section}/{key}: \"{v}\"");
                default
            }),
        }
    }

    /// Float lookup with a default.
    pub fn get_float(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.get(section, key) {
            None => default,
            Some(v) => v.parse().unwrap_or_else(|_| {
                log::warn!("config: non-numeric value for {section}/{key}: \"{v}\"");
                default
            }),
        }
    }

    /// Boolean lookup: `true`/`yes`/`on`/`1` and their negations.
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get(section, key) {
            None => default,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                other => {
                    log::warn!("config: non-boolean value for {section}/{key}: \"{other}\"");
                    default
                }
            },
        }
    }

    /// The ordered driver preference: `SOUNDFIELD_DRIVERS` overrides
    /// `[general] drivers`. Comma-separated, empty entries dropped.
    pub fn drivers(&self) -> Vec<String> {
        let list = std::env::var(ENV_DRIVERS)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.get_or("general", "drivers", "").to_string());
        list.split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Strip one level of single or double quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
# leading comment
drivers = wave,null

[general]
channels = surround51
frequency = 48000
hrtf = auto
period_size = 1024   # trailing comment

[wave]
file = "out file.wav"

[NULL]
quoted = 'single'
"#;

    #[test]
    fn test_basic_lookup() {
        let mut c = Config::new();
        c.merge_str(SAMPLE);
        assert_eq!(c.get("", "drivers"), Some("wave,null"));
        assert_eq!(c.get("general", "channels"), Some("surround51"));
        assert_eq!(c.get_int("general", "frequency", 44100), 48000);
        assert_eq!(c.get_int("general", "period_size", 0), 1024);
    }

    #[test]
    fn test_case_insensitive() {
        let mut c = Config::new();
        c.merge_str(SAMPLE);
        assert_eq!(c.get("General", "CHANNELS"), Some("surround51"));
        assert_eq!(c.get("null", "quoted"), Some("single"));
    }

    #[test]
    fn test_quoting() {
        let mut c = Config::new();
        c.merge_str(SAMPLE);
        assert_eq!(c.get("wave", "file"), Some("out file.wav"));
    }

    #[test]
    fn test_missing_returns_default() {
        let c = Config::new();
        assert_eq!(c.get_or("general", "resampler", "linear"), "linear");
        assert_eq!(c.get_int("general", "periods", 3), 3);
        assert!(c.get_bool("general", "hrtf", true));
    }

    #[test]
    fn test_bad_lines_skipped() {
        let mut c = Config::new();
        c.merge_str("[unterminated\nnot_an_assignment\nkey = ok\n");
        assert_eq!(c.get("", "key"), Some("ok"));
        assert_eq!(c.get("", "not_an_assignment"), None);
    }

    #[test]
    fn test_override_layering() {
        let mut c = Config::new();
        c.merge_str("[general]\nfrequency = 44100\n");
        c.merge_str("[general]\nfrequency = 96000\n");
        assert_eq!(c.get_int("general", "frequency", 0), 96000);
    }

    #[test]
    fn test_merge_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[general]\nresampler = cubic").unwrap();
        let mut c = Config::new();
        c.merge_file(tmp.path()).unwrap();
        assert_eq!(c.get("general", "resampler"), Some("cubic"));
    }

    #[test]
    fn test_bool_values() {
        let mut c = Config::new();
        c.merge_str("[general]\nhrtf = on\nstereo = FALSE\n");
        assert!(c.get_bool("general", "hrtf", false));
        assert!(!c.get_bool("general", "stereo", true));
    }
}

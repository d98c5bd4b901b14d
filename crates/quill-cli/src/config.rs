//! `quill.toml` configuration file parsing.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Module resolution settings.
    #[serde(default)]
    pub modules: ModulesConfig,

    /// Garbage collector tuning.
    #[serde(default)]
    pub gc: GcConfigSection,
}

/// Module resolution configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ModulesConfig {
    /// Additional search directories, checked before `QUILLPATH`.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

/// Collector tuning knobs, overriding [`quill_gc::GcConfig`]'s defaults.
#[derive(Debug, Default, Deserialize)]
pub struct GcConfigSection {
    /// Per-generation net-allocation thresholds, youngest first.
    pub thresholds: Option<[usize; 3]>,
}

/// Load configuration from `path`, or search for a default config file if
/// `path` is `None`. Returns the default configuration if nothing is found.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config =
                toml::from_str(&content).map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?;
            Ok(config)
        }
        _ => Ok(Config::default()),
    }
}

/// Search for a configuration file in the current directory and its
/// ancestors, falling back to the user's config directory (`~/.config`
/// on Linux, etc.) if none of them has one.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    const CONFIG_NAMES: &[&str] = &["quill.toml", "quill.config.toml", ".quillrc.toml"];

    let mut dir = Some(cwd.as_path());
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }

    let user_config = dirs::config_dir()?.join("quill").join("config.toml");
    user_config.exists().then_some(user_config)
}

/// The `<LANG>STARTUP` script run before entering the REPL (spec §6.2),
/// falling back to `<user config dir>/quill/startup.ql` when
/// `QUILL_STARTUP` isn't set and the default file exists.
pub fn default_startup_script() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("quill").join("startup.ql");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_search_paths_or_overrides() {
        let config = Config::default();
        assert!(config.modules.search_paths.is_empty());
        assert!(config.gc.thresholds.is_none());
    }

    #[test]
    fn default_startup_script_is_none_when_absent() {
        // No `<config dir>/quill/startup.ql` exists on a clean test host.
        assert!(default_startup_script().is_none());
    }

    #[test]
    fn parses_module_and_gc_sections() {
        let toml = r#"
[modules]
search_paths = ["./lib", "./vendor"]

[gc]
thresholds = [500, 5000, 50000]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.modules.search_paths, vec![PathBuf::from("./lib"), PathBuf::from("./vendor")]);
        assert_eq!(config.gc.thresholds, Some([500, 5000, 50000]));
    }
}

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    Result,
    env_subst::substitute_env,
    error::{Context, Error},
    schema::BridgeConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "botbridge.toml",
    "botbridge.yaml",
    "botbridge.yml",
    "botbridge.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./botbridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/botbridge/botbridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BridgeConfig::default()` if no config file is found or the file
/// cannot be parsed.
pub fn discover_and_load() -> BridgeConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    BridgeConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/botbridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "botbridge").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    fn write_temp(name: &str, body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_toml_accounts() {
        let (_dir, path) = write_temp(
            "botbridge.toml",
            r#"
[channels.gem.main]
url = "https://gem.example/api/"
token = "abc"
endpoint = "https://bot.example/hook"

[channels.telegram.support]
token = "123:XYZ"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.channels.gem["main"]["token"], "abc");
        assert_eq!(cfg.channels.telegram["support"]["token"], "123:XYZ");
        let accounts = cfg.channels.accounts();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].0, "gem");
        assert_eq!(accounts[1].1, "support");
    }

    #[test]
    fn loads_yaml_and_json() {
        let (_d1, yaml) = write_temp(
            "botbridge.yaml",
            "channels:\n  gem:\n    main:\n      token: from-yaml\n",
        );
        assert_eq!(
            load_config(&yaml).unwrap().channels.gem["main"]["token"],
            "from-yaml"
        );

        let (_d2, json) = write_temp(
            "botbridge.json",
            r#"{"channels":{"telegram":{"t":{"token":"from-json"}}}}"#,
        );
        assert_eq!(
            load_config(&json).unwrap().channels.telegram["t"]["token"],
            "from-json"
        );
    }

    #[test]
    fn default_placeholder_is_applied() {
        let (_dir, path) = write_temp(
            "botbridge.toml",
            "[channels.gem.main]\nurl = \"${BOTBRIDGE_TEST_UNSET_URL:-http://fallback/}\"\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.channels.gem["main"]["url"], "http://fallback/");
    }

    #[test]
    fn unsupported_extension_errors() {
        let (_dir, path) = write_temp("botbridge.ini", "x=1");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/botbridge.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/botbridge.toml"));
    }

    #[test]
    fn empty_file_is_default() {
        let (_dir, path) = write_temp("botbridge.toml", "");
        assert!(load_config(&path).unwrap().channels.is_empty());
    }
}

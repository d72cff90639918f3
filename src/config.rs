#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
};

use crate::error::{BsmhError, Result};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_BASE_URL: &str = "https://beatsaver.com/api";
pub const DEFAULT_PLAYLIST_DIR: &str = ".";
/// The catalog denies requests that do not look like they come from a browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/39.0.2171.95 Safari/537.36";

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub base_url: String,
    pub user_agent: String,
    pub maps_root: Option<PathBuf>,
    pub playlist_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub base_url: Option<String>,
    pub maps_root: Option<PathBuf>,
    pub playlist_dir: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let base_url = overrides
        .base_url
        .and_then(non_blank)
        .or_else(|| lookup_value("BSMH_BASE_URL", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let user_agent = lookup_value("BSMH_USER_AGENT", file_vars, &env_lookup)
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    let maps_root = overrides
        .maps_root
        .or_else(|| lookup_value("BSMH_MAPS_ROOT", file_vars, &env_lookup).map(PathBuf::from));
    let playlist_dir = overrides
        .playlist_dir
        .or_else(|| lookup_value("BSMH_PLAYLIST_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAYLIST_DIR));
    RuntimeSettings {
        base_url: base_url.trim_end_matches('/').to_string(),
        user_agent,
        maps_root,
        playlist_dir,
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_blank)
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned().and_then(non_blank))
}

/// Parses a dotenv-style file. A missing file yields no variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => return Err(BsmhError::io(path, err)),
    };
    Ok(content.lines().filter_map(parse_env_line).collect())
}

/// `[export ]KEY=value`, with one pair of matching quotes around the value
/// removed. Blank lines, comments and lines without a key give `None`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.trim_start_matches("export ").split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let unquoted = ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote))
        .unwrap_or(value);
    Some((key.to_string(), unquoted.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> RuntimeSettings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None)
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let settings = settings_from("");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
        assert!(settings.maps_root.is_none());
        assert_eq!(settings.playlist_dir, PathBuf::from(DEFAULT_PLAYLIST_DIR));
    }

    #[test]
    fn file_values_are_read() {
        let settings = settings_from(
            "BSMH_BASE_URL=\"http://localhost:9000/api/\"\nBSMH_MAPS_ROOT=\"/games/CustomLevels\"\nBSMH_PLAYLIST_DIR='/games/Playlists'\n",
        );
        assert_eq!(settings.base_url, "http://localhost:9000/api");
        assert_eq!(
            settings.maps_root,
            Some(PathBuf::from("/games/CustomLevels"))
        );
        assert_eq!(settings.playlist_dir, PathBuf::from("/games/Playlists"));
    }

    #[test]
    fn env_wins_over_file() {
        let vars = read_env_file(make_config("BSMH_MAPS_ROOT=\"/file\"\n").path()).unwrap();
        let settings = build_settings(&vars, |key| {
            if key == "BSMH_MAPS_ROOT" {
                Some("/env".to_string())
            } else {
                None
            }
        });
        assert_eq!(settings.maps_root, Some(PathBuf::from("/env")));
    }

    #[test]
    fn overrides_win_over_env_and_file() {
        let mut vars = HashMap::new();
        vars.insert("BSMH_MAPS_ROOT".to_string(), "/file-maps".to_string());
        vars.insert("BSMH_BASE_URL".to_string(), "http://file".to_string());

        let settings = build_settings_with_overrides(
            &vars,
            |key| {
                if key == "BSMH_PLAYLIST_DIR" {
                    Some("/env-playlists".to_string())
                } else {
                    None
                }
            },
            RuntimeOverrides {
                base_url: Some("http://override".into()),
                maps_root: Some(PathBuf::from("/override-maps")),
                playlist_dir: None,
                env_path: None,
            },
        );

        assert_eq!(settings.base_url, "http://override");
        assert_eq!(settings.maps_root, Some(PathBuf::from("/override-maps")));
        assert_eq!(settings.playlist_dir, PathBuf::from("/env-playlists"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let vars = read_env_file(make_config("BSMH_BASE_URL=\"  \"\n").path()).unwrap();
        let settings = build_settings_with_overrides(
            &vars,
            |_| None,
            RuntimeOverrides {
                base_url: Some("   ".into()),
                ..RuntimeOverrides::default()
            },
        );
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export BSMH_MAPS_ROOT="/maps"
            BSMH_PLAYLIST_DIR='/playlists'
            BSMH_USER_AGENT =  "agent/1.0"
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("BSMH_MAPS_ROOT").unwrap(), "/maps");
        assert_eq!(vars.get("BSMH_PLAYLIST_DIR").unwrap(), "/playlists");
        assert_eq!(vars.get("BSMH_USER_AGENT").unwrap(), "agent/1.0");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn env_lines_without_a_pair_are_ignored() {
        assert_eq!(parse_env_line("   "), None);
        assert_eq!(parse_env_line("# BSMH_BASE_URL=x"), None);
        assert_eq!(parse_env_line("=value"), None);
        assert_eq!(parse_env_line("JUST_A_WORD"), None);
        assert_eq!(
            parse_env_line("  export KEY = 'a \"b\"' "),
            Some(("KEY".to_string(), "a \"b\"".to_string()))
        );
        assert_eq!(
            parse_env_line("KEY=\"unbalanced"),
            Some(("KEY".to_string(), "\"unbalanced".to_string()))
        );
    }

    #[test]
    fn read_env_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_env_file(dir.path()).unwrap_err();
        assert!(matches!(err, BsmhError::Io { .. }));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}

use crate::cli::ConnectionArgs;
use anyhow::{Context, Result, bail};
use cobblerkit::{ConnectOptions, RetryConfig};
use reconcile::{Behaviors, DiffPolicy};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the config directory path (~/.config/provisync)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("provisync"))
}

/// Get the default config file path
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the default state file path (~/.local/state/provisync/state.json)
pub fn default_state_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home
        .join(".local")
        .join("state")
        .join("provisync")
        .join("state.json"))
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

// ============================================================================
// Config File
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
}

/// Contents of config.toml. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<bool>,
    pub cacert_file: Option<String>,
    pub retry: RetrySection,
    pub interface_policy: Option<DiffPolicy>,
    pub template_files_read_back: Option<bool>,
    pub state_file: Option<String>,
}

impl FileConfig {
    /// Load the config file, or an empty config if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

// ============================================================================
// Resolved Settings
// ============================================================================

/// Settings after merging flags, environment and the config file
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
    pub cacert: Option<String>,
    pub max_attempts: u32,
    pub interface_policy: DiffPolicy,
    pub template_files_read_back: bool,
    pub state_file: PathBuf,
}

impl Settings {
    /// Load the config file and merge it under the command line.
    pub fn load(
        config_path: Option<&Path>,
        args: &ConnectionArgs,
        state_path: Option<&Path>,
    ) -> Result<Self> {
        let file = match config_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                FileConfig::load(path)?
            }
            None => FileConfig::load(&default_config_path()?)?,
        };
        Self::merge(file, args, state_path)
    }

    /// Flags (clap has already folded in the environment) win over the file.
    pub fn merge(file: FileConfig, args: &ConnectionArgs, state_path: Option<&Path>) -> Result<Self> {
        let state_file = match (state_path, &file.state_file) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => expand_path(path),
            (None, None) => default_state_path()?,
        };

        Ok(Self {
            url: args.url.clone().or(file.url),
            username: args.username.clone().or(file.username),
            password: args.password.clone().or(file.password),
            insecure: args.insecure || file.insecure.unwrap_or(false),
            cacert: args.cacert_file.clone().or(file.cacert_file),
            max_attempts: file.retry.max_attempts.unwrap_or(3).max(1),
            interface_policy: args
                .interface_policy
                .or(file.interface_policy)
                .unwrap_or_default(),
            template_files_read_back: file.template_files_read_back.unwrap_or(false),
            state_file,
        })
    }

    /// Connection options for cobblerkit. Fails if a required setting is missing.
    pub fn connect_options(&self) -> Result<ConnectOptions> {
        let url = required(self.url.as_deref(), "url", "--url", "COBBLER_URL")?;
        let username = required(
            self.username.as_deref(),
            "username",
            "--username",
            "COBBLER_USERNAME",
        )?;
        let password = required(
            self.password.as_deref(),
            "password",
            "--password",
            "COBBLER_PASSWORD",
        )?;

        let mut options = ConnectOptions::new(url, username, password);
        options.insecure = self.insecure;
        options.ca_cert_pem = self.cacert.as_deref().map(read_ca_cert).transpose()?;
        options.retry = RetryConfig {
            max_attempts: self.max_attempts,
            ..RetryConfig::default()
        };
        Ok(options)
    }

    /// Per-kind reconciliation behaviour
    pub fn behaviors(&self) -> Behaviors {
        Behaviors::default().with_template_read_back(self.template_files_read_back)
    }
}

fn required<'a>(value: Option<&'a str>, key: &str, flag: &str, env: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("Missing Cobbler {key}: pass {flag}, set {env}, or add '{key}' to config.toml"),
    }
}

/// Accept either PEM contents or a path to a PEM file.
fn read_ca_cert(value: &str) -> Result<String> {
    if value.contains("-----BEGIN") {
        return Ok(value.to_string());
    }
    let path = expand_path(value);
    fs::read_to_string(&path)
        .with_context(|| format!("Could not read CA certificate {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_config(content: &str) -> FileConfig {
        toml::from_str(content).unwrap()
    }

    fn state() -> Option<&'static Path> {
        Some(Path::new("/tmp/provisync-state.json"))
    }

    #[test]
    fn test_flags_win_over_file() {
        let file = file_config(
            r#"
            url = "https://file/cobbler_api"
            username = "file-user"
            interface_policy = "by_name"
            "#,
        );
        let args = ConnectionArgs {
            url: Some("https://flag/cobbler_api".into()),
            interface_policy: Some(DiffPolicy::Compatible),
            ..Default::default()
        };

        let settings = Settings::merge(file, &args, state()).unwrap();
        assert_eq!(settings.url.as_deref(), Some("https://flag/cobbler_api"));
        assert_eq!(settings.username.as_deref(), Some("file-user"));
        assert_eq!(settings.interface_policy, DiffPolicy::Compatible);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::merge(FileConfig::default(), &ConnectionArgs::default(), state())
            .unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.interface_policy, DiffPolicy::Compatible);
        assert!(!settings.insecure);
        assert!(!settings.template_files_read_back);
        assert_eq!(settings.state_file, PathBuf::from("/tmp/provisync-state.json"));
    }

    #[test]
    fn test_file_sections() {
        let file = file_config(
            r#"
            template_files_read_back = true
            state_file = "/var/lib/provisync/state.json"

            [retry]
            max_attempts = 5
            "#,
        );
        let settings = Settings::merge(file, &ConnectionArgs::default(), None).unwrap();
        assert_eq!(settings.max_attempts, 5);
        assert!(settings.template_files_read_back);
        assert_eq!(
            settings.state_file,
            PathBuf::from("/var/lib/provisync/state.json")
        );
        assert!(
            settings
                .behaviors()
                .get(reconcile::EntityKind::TemplateFile)
                .reads_back
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<FileConfig>("uri = \"http://x\"").is_err());
    }

    #[test]
    fn test_missing_setting_names_flag_and_env() {
        let args = ConnectionArgs {
            url: Some("https://cobbler/cobbler_api".into()),
            username: Some("cobbler".into()),
            ..Default::default()
        };
        let settings = Settings::merge(FileConfig::default(), &args, state()).unwrap();
        let err = settings.connect_options().unwrap_err().to_string();
        assert!(err.contains("--password"), "{err}");
        assert!(err.contains("COBBLER_PASSWORD"), "{err}");
    }

    #[test]
    fn test_connect_options_with_ca_file() {
        let dir = TempDir::new().unwrap();
        let ca = dir.path().join("ca.pem");
        fs::write(&ca, "-----BEGIN CERTIFICATE-----\nabc\n-----END CERTIFICATE-----\n").unwrap();

        let args = ConnectionArgs {
            url: Some("https://cobbler/cobbler_api".into()),
            username: Some("cobbler".into()),
            password: Some("secret".into()),
            cacert_file: Some(ca.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let settings = Settings::merge(FileConfig::default(), &args, state()).unwrap();
        let options = settings.connect_options().unwrap();
        assert!(options.ca_cert_pem.unwrap().starts_with("-----BEGIN"));
        assert_eq!(options.retry.max_attempts, 3);
    }

    #[test]
    fn test_inline_ca_contents() {
        let pem = "-----BEGIN CERTIFICATE-----\nxyz\n-----END CERTIFICATE-----";
        assert_eq!(read_ca_cert(pem).unwrap(), pem);
        assert!(read_ca_cert("/nonexistent/ca.pem").is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = FileConfig::load(&dir.path().join("config.toml")).unwrap();
        assert!(config.url.is_none());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&path), &ConnectionArgs::default(), state()).is_err());
    }
}

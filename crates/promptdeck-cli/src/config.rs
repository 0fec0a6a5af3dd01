//! Configuration file management for promptdeck.
//!
//! Provides a TOML-based config file at `~/.config/promptdeck/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use promptdeck_core::billing::WebhookConfig;
use promptdeck_core::checkout::CheckoutConfig;
use promptdeck_core::checkout::lemonsqueezy;
use promptdeck_core::completion::CompletionConfig;
use promptdeck_core::completion::groq;
use promptdeck_core::session::SessionConfig;
use promptdeck_db::config::DbConfig;

pub const SESSION_SECRET_ENV: &str = "PROMPTDECK_SESSION_SECRET";
pub const COMPLETION_KEY_ENV: &str = "GROQ_API_KEY";
pub const COMPLETION_MODEL_ENV: &str = "PROMPTDECK_COMPLETION_MODEL";
pub const BILLING_KEY_ENV: &str = "LEMONSQUEEZY_API_KEY";
pub const STORE_ID_ENV: &str = "LEMONSQUEEZY_STORE_ID";
pub const WEBHOOK_SECRET_ENV: &str = "LEMONSQUEEZY_WEBHOOK_SECRET";
pub const WEEKLY_VARIANT_ENV: &str = "LS_VARIANT_WEEKLY_ID";
pub const MONTHLY_VARIANT_ENV: &str = "LS_VARIANT_MONTHLY_ID";

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub billing: BillingSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded session secret (64 hex chars = 32 bytes).
    pub session_secret: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CompletionSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BillingSection {
    pub api_key: Option<String>,
    pub store_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub weekly_variant_id: Option<String>,
    pub monthly_variant_id: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the promptdeck config directory.
///
/// Always XDG layout: `$XDG_CONFIG_HOME/promptdeck` or
/// `~/.config/promptdeck`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("promptdeck");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("promptdeck")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file is created with mode 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Generate a random session secret: 32 random bytes, hex-encoded.
pub fn generate_session_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Env var if set and non-empty, else the file value.
fn env_or(env_var: &str, file_value: Option<&String>) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| file_value.cloned())
}

fn required(env_var: &str, file_value: Option<&String>, what: &str) -> Result<String> {
    match env_or(env_var, file_value) {
        Some(value) => Ok(value),
        None => bail!("{what} not found; set {env_var} or add it to {}", config_path().display()),
    }
}

/// Settings every command that touches the database needs.
#[derive(Debug)]
pub struct AppConfig {
    pub db_config: DbConfig,
    pub session_config: SessionConfig,
}

impl AppConfig {
    /// - DB URL: `cli_db_url` > `PROMPTDECK_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Session secret: `PROMPTDECK_SESSION_SECRET` > `auth.session_secret` (hex) > error
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();
        Self::resolve_with(cli_db_url, file_config.as_ref())
    }

    fn resolve_with(cli_db_url: Option<&str>, file_config: Option<&ConfigFile>) -> Result<Self> {
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::URL_ENV) {
            url
        } else if let Some(cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let secret_hex = match env_or(SESSION_SECRET_ENV, file_config.map(|c| &c.auth.session_secret)) {
            Some(hex) => hex,
            None => bail!(
                "session secret not found; set {SESSION_SECRET_ENV} or run `promptdeck init` to create a config file"
            ),
        };
        let session_config =
            SessionConfig::from_hex(&secret_hex).context("invalid session secret")?;

        Ok(Self {
            db_config: DbConfig::new(db_url),
            session_config,
        })
    }
}

/// Everything `promptdeck serve` needs beyond [`AppConfig`].
#[derive(Debug)]
pub struct ServeConfig {
    pub completion: CompletionConfig,
    pub checkout: CheckoutConfig,
    pub webhook: WebhookConfig,
}

impl ServeConfig {
    pub fn resolve() -> Result<Self> {
        let file_config = load_config().ok();
        Self::resolve_with(file_config.as_ref())
    }

    fn resolve_with(file_config: Option<&ConfigFile>) -> Result<Self> {
        let completion_file = file_config.map(|c| &c.completion);
        let billing_file = file_config.map(|c| &c.billing);

        let mut completion = CompletionConfig::new(required(
            COMPLETION_KEY_ENV,
            completion_file.and_then(|c| c.api_key.as_ref()),
            "completion API key",
        )?);
        completion.model = env_or(COMPLETION_MODEL_ENV, completion_file.and_then(|c| c.model.as_ref()))
            .unwrap_or_else(|| groq::DEFAULT_MODEL.to_owned());
        completion.base_url = completion_file
            .and_then(|c| c.base_url.clone())
            .unwrap_or_else(|| groq::DEFAULT_BASE_URL.to_owned());
        completion.timeout = Some(COMPLETION_TIMEOUT);

        let weekly_variant_id =
            env_or(WEEKLY_VARIANT_ENV, billing_file.and_then(|b| b.weekly_variant_id.as_ref()));
        let monthly_variant_id =
            env_or(MONTHLY_VARIANT_ENV, billing_file.and_then(|b| b.monthly_variant_id.as_ref()));

        let checkout = CheckoutConfig {
            api_key: required(
                BILLING_KEY_ENV,
                billing_file.and_then(|b| b.api_key.as_ref()),
                "billing API key",
            )?,
            store_id: required(
                STORE_ID_ENV,
                billing_file.and_then(|b| b.store_id.as_ref()),
                "billing store id",
            )?,
            weekly_variant_id: weekly_variant_id.clone(),
            monthly_variant_id,
            base_url: lemonsqueezy::DEFAULT_BASE_URL.to_owned(),
        };

        let webhook = WebhookConfig {
            secret: required(
                WEBHOOK_SECRET_ENV,
                billing_file.and_then(|b| b.webhook_secret.as_ref()),
                "webhook secret",
            )?
            .into_bytes(),
            weekly_variant_id,
        };

        Ok(Self {
            completion,
            checkout,
            webhook,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    const SECRET: &str = "aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55aa55";

    fn clear_env() {
        for var in [
            DbConfig::URL_ENV,
            SESSION_SECRET_ENV,
            COMPLETION_KEY_ENV,
            COMPLETION_MODEL_ENV,
            BILLING_KEY_ENV,
            STORE_ID_ENV,
            WEBHOOK_SECRET_ENV,
            WEEKLY_VARIANT_ENV,
            MONTHLY_VARIANT_ENV,
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    fn file_config() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://file:5432/filedb".to_string(),
            },
            auth: AuthSection {
                session_secret: "bb".repeat(32),
            },
            completion: CompletionSection {
                api_key: Some("gsk_file".into()),
                model: None,
                base_url: None,
            },
            billing: BillingSection {
                api_key: Some("ls_file".into()),
                store_id: Some("42".into()),
                webhook_secret: Some("whsec_file".into()),
                weekly_variant_id: Some("111".into()),
                monthly_variant_id: Some("222".into()),
            },
        }
    }

    #[test]
    fn generate_session_secret_is_64_hex_chars() {
        let secret = generate_session_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_session_secret());
    }

    #[test]
    fn config_file_roundtrip_and_optional_sections() {
        let original = file_config();
        let contents = toml::to_string_pretty(&original).unwrap();
        let loaded: ConfigFile = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.billing.store_id.as_deref(), Some("42"));

        let minimal: ConfigFile = toml::from_str(
            "[database]\nurl = \"postgresql://x/y\"\n\n[auth]\nsession_secret = \"aa\"\n",
        )
        .unwrap();
        assert!(minimal.completion.api_key.is_none());
        assert!(minimal.billing.webhook_secret.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = save_config(&file_config()).and_then(|_| load_config());
        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let loaded = result.unwrap();
        assert_eq!(loaded.database.url, "postgresql://file:5432/filedb");
        assert!(path.starts_with(tmp.path()));
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn cli_flag_overrides_env_and_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };

        let config =
            AppConfig::resolve_with(Some("postgresql://cli:5432/clidb"), Some(&file_config())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        clear_env();
    }

    #[test]
    fn env_overrides_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(DbConfig::URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(SESSION_SECRET_ENV, SECRET) };

        let config = AppConfig::resolve_with(None, Some(&file_config())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.session_config.secret, hex::decode(SECRET).unwrap());

        clear_env();
    }

    #[test]
    fn file_then_default() {
        let _lock = lock_env();
        clear_env();

        let config = AppConfig::resolve_with(None, Some(&file_config())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.session_config.secret, vec![0xbb; 32]);

        unsafe { std::env::set_var(SESSION_SECRET_ENV, SECRET) };
        let config = AppConfig::resolve_with(None, None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);

        clear_env();
    }

    #[test]
    fn missing_session_secret_is_an_error() {
        let _lock = lock_env();
        clear_env();

        let err = AppConfig::resolve_with(Some("postgresql://x/y"), None).unwrap_err();
        assert!(err.to_string().contains("session secret not found"), "{err}");
    }

    #[test]
    fn serve_config_reads_file_and_env() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(WEEKLY_VARIANT_ENV, "999") };
        unsafe { std::env::set_var(COMPLETION_MODEL_ENV, "llama-3.1-8b-instant") };

        let config = ServeConfig::resolve_with(Some(&file_config())).unwrap();
        assert_eq!(config.completion.api_key, "gsk_file");
        assert_eq!(config.completion.model, "llama-3.1-8b-instant");
        assert_eq!(config.completion.base_url, groq::DEFAULT_BASE_URL);
        assert_eq!(config.checkout.store_id, "42");
        assert_eq!(config.checkout.weekly_variant_id.as_deref(), Some("999"));
        assert_eq!(config.checkout.monthly_variant_id.as_deref(), Some("222"));
        assert_eq!(config.webhook.secret, b"whsec_file".to_vec());
        assert_eq!(config.webhook.weekly_variant_id.as_deref(), Some("999"));

        clear_env();
    }

    #[test]
    fn serve_config_names_missing_key() {
        let _lock = lock_env();
        clear_env();

        let err = ServeConfig::resolve_with(None).unwrap_err();
        assert!(err.to_string().contains(COMPLETION_KEY_ENV), "{err}");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        assert!(config_path().ends_with("promptdeck/config.toml"));
    }
}

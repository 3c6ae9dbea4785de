use crate::folder_name::NamingConvention;
use anyhow::Context as AnyhowContext;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_KEY_FILE: &str = "config/credentials/openai_key.txt";

#[derive(Debug, Clone)]
pub struct Config {
    pub inbox_folder_id: String,
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub state_file: PathBuf,
    pub naming_convention: NamingConvention,
    pub openai: OpenAiConfig,
    pub google_access_token: Option<String>,
    pub etsy: Option<EtsyConfig>,
    pub upload_to_etsy: bool,
    pub http_timeout: Duration,
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_deref().map(key_preview))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct EtsyConfig {
    pub client_id: String,
    pub refresh_token: String,
    pub shop_id: String,
    pub shipping_profile_id: Option<u64>,
    pub taxonomy_id: Option<u64>,
}

impl std::fmt::Debug for EtsyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtsyConfig")
            .field("client_id", &key_preview(&self.client_id))
            .field("shop_id", &self.shop_id)
            .field("shipping_profile_id", &self.shipping_profile_id)
            .field("taxonomy_id", &self.taxonomy_id)
            .finish()
    }
}

/// First characters of a secret, enough to tell keys apart in logs.
pub fn key_preview(key: &str) -> String {
    match key.char_indices().nth(8) {
        Some((i, _)) => format!("{}...", &key[..i]),
        None => "***".to_string(),
    }
}

/// Loads `.env`, creating an empty one when it doesn't exist yet.
pub fn load_env_file() -> Result<(), anyhow::Error> {
    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(".env")?;
            envmnt::load_file(".env")?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }
    Ok(())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_flag(key: &str, default_value: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default_value,
        },
        Err(_) => default_value,
    }
}

fn env_number(key: &str) -> Result<Option<u64>, anyhow::Error> {
    env_string(key)
        .map(|v| {
            v.parse::<u64>()
                .with_context(|| format!("{key} must be a positive integer, got {v:?}"))
        })
        .transpose()
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let data_dir = PathBuf::from(envmnt::get_or("DATA_DIR", "data"));
        let temp_dir = PathBuf::from(envmnt::get_or("TEMP_DIR", "tmp"));
        let state_file = env_string("STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("state.json"));
        let naming_convention = match env_string("FOLDER_NAME_CONVENTION") {
            Some(v) => NamingConvention::try_from(&v)
                .ok_or_else(|| anyhow::anyhow!("Unknown FOLDER_NAME_CONVENTION {v:?}, expected type-materials-series or sku-price-name"))?,
            None => NamingConvention::default(),
        };
        let openai = OpenAiConfig {
            api_key: openai_api_key(Path::new(OPENAI_KEY_FILE)),
            model: envmnt::get_or("OPENAI_MODEL", DEFAULT_MODEL),
            base_url: envmnt::get_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        };
        let etsy = match (
            env_string("ETSY_CLIENT_ID"),
            env_string("ETSY_REFRESH_TOKEN"),
            env_string("ETSY_SHOP_ID"),
        ) {
            (Some(client_id), Some(refresh_token), Some(shop_id)) => Some(EtsyConfig {
                client_id,
                refresh_token,
                shop_id,
                shipping_profile_id: env_number("SHIPPING_PROFILE_ID")?,
                taxonomy_id: env_number("TAXONOMY_ID")?,
            }),
            _ => None,
        };
        let http_timeout = Duration::from_secs(env_number("HTTP_TIMEOUT_SECS")?.unwrap_or(60));
        Ok(Self {
            inbox_folder_id: env_string("INBOX_FOLDER_ID").unwrap_or_default(),
            data_dir,
            temp_dir,
            state_file,
            naming_convention,
            openai,
            google_access_token: env_string("GOOGLE_ACCESS_TOKEN"),
            etsy,
            upload_to_etsy: env_flag("ETSY_UPLOAD", false),
            http_timeout,
        })
    }

    pub fn ai_results_dir(&self) -> PathBuf {
        self.data_dir.join("ai_results")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn default_taxonomy_id(&self) -> u64 {
        self.etsy.as_ref().and_then(|e| e.taxonomy_id).unwrap_or(0)
    }

    /// Creates every directory the pipeline writes into.
    pub fn ensure_dirs(&self) -> Result<(), anyhow::Error> {
        for dir in [
            self.data_dir.clone(),
            self.temp_dir.clone(),
            self.ai_results_dir(),
            self.export_dir(),
        ] {
            std::fs::create_dir_all(&dir).with_context(|| format!("Unable to create dir {dir:?}"))?;
        }
        if let Some(parent) = self.state_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create dir {parent:?}"))?;
        }
        Ok(())
    }
}

/// Environment first, then the credentials file.
fn openai_api_key(key_file: &Path) -> Option<String> {
    if let Some(key) = env_string("OPENAI_API_KEY") {
        log::debug!("OPENAI_API_KEY read from environment: {}", key_preview(&key));
        return Some(key);
    }
    match std::fs::read_to_string(key_file) {
        Ok(key) => {
            let key = key.trim().to_string();
            if key.is_empty() {
                None
            } else {
                log::debug!("OPENAI_API_KEY read from {key_file:?}: {}", key_preview(&key));
                Some(key)
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            log::warn!("Unable to read {key_file:?}: {err}");
            None
        }
    }
}

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const CONFIG_PATH: &str = "hypecast.toml";
pub const ENV_PREFIX: &str = "HYPECAST";

/// Reads one `[section]` of the TOML config, layered under `HYPECAST__*`
/// environment variables. A missing file or section yields `T::default()`.
pub fn load_section<T>(path: &str, section: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let cfg = Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub chart_url: String,
    pub summary_url: String,
    pub period: String,
    pub timeout_secs: u64,
    /// Uploaded history merged under the fetched series, if present.
    pub csv_path: Option<String>,
    /// Serve prices from `<csv_dir>/<TICKER>.csv` instead of the HTTP endpoint.
    pub csv_dir: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            chart_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            summary_url: "https://query2.finance.yahoo.com/v10/finance/quoteSummary".to_string(),
            period: "5y".to_string(),
            timeout_secs: 30,
            csv_path: None,
            csv_dir: None,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_section(CONFIG_PATH, "provider")
    }
}

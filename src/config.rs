use std::path::PathBuf;

use color_eyre::eyre::{bail, Context};
use color_eyre::Result;
use serde::Deserialize;
use strum_macros::{Display, EnumString};

/// What to do the first time a listing shows up with no recorded state:
/// alert right away, or record it silently and only alert on later changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FirstSeenPolicy {
    Learn,
    Notify,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discogs_token: String,
    pub discogs_username: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_first_seen_policy")]
    pub first_seen_policy: FirstSeenPolicy,
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_discogs_base_url")]
    pub discogs_base_url: String,
    #[serde(default = "default_telegram_base_url")]
    pub telegram_base_url: String,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_port() -> u16 {
    8080
}

fn default_check_interval() -> u64 {
    900
}

fn default_first_seen_policy() -> FirstSeenPolicy {
    FirstSeenPolicy::Learn
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_discogs_base_url() -> String {
    "https://api.discogs.com".into()
}

fn default_telegram_base_url() -> String {
    "https://api.telegram.org".into()
}

// kept a little under the documented ~60/min cap
fn default_requests_per_minute() -> u32 {
    55
}

fn default_user_agent() -> String {
    concat!("wantlist-tracker/", env!("CARGO_PKG_VERSION")).into()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config: Config =
            envy::from_env().wrap_err("failed to load config from environment")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            bail!("CHECK_INTERVAL_SECS must be at least 1");
        }
        if self.requests_per_minute == 0 {
            bail!("REQUESTS_PER_MINUTE must be at least 1");
        }
        Ok(())
    }
}

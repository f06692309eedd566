use std::time::Duration;

use anyhow::{anyhow, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub fanout_url: Option<String>,
    pub fanout_auth: Option<String>,
    pub bot_token: Option<String>,
    /// UTC hour of the scheduled cycle, `None` when scheduling is off.
    pub pairing_hour: Option<u8>,
    pub relay_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = optional("DATABASE_URL").context("DATABASE_URL must be set")?;

        let port = match optional("PORT") {
            Some(port) => port.parse().with_context(|| format!("invalid PORT {port}"))?,
            None => 8080,
        };

        let pairing_hour = match optional("PAIRING_HOUR").as_deref() {
            None => Some(6),
            Some("off") => None,
            Some(hour) => {
                let hour: u8 = hour.parse().with_context(|| format!("invalid PAIRING_HOUR {hour}"))?;
                if hour > 23 {
                    return Err(anyhow!("PAIRING_HOUR must be within 0..=23, got {hour}"));
                }
                Some(hour)
            }
        };

        let relay_interval = match optional("OUTBOX_RELAY_SECS") {
            Some(secs) => {
                let secs: u64 = secs.parse().with_context(|| format!("invalid OUTBOX_RELAY_SECS {secs}"))?;
                if secs == 0 {
                    return Err(anyhow!("OUTBOX_RELAY_SECS must be at least 1"));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(30),
        };

        Ok(Config {
            database_url,
            port,
            fanout_url: optional("FANOUT_DATABASE_URL"),
            fanout_auth: optional("FANOUT_AUTH_TOKEN"),
            bot_token: optional("BOT_TOKEN"),
            pairing_hour,
            relay_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[("DATABASE_URL", "sqlite://pairup.db")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.pairing_hour, Some(6));
        assert_eq!(config.relay_interval, Duration::from_secs(30));
        assert!(config.fanout_url.is_none());
        assert!(config.bot_token.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("DATABASE_URL", " ")]).is_err());
    }

    #[test]
    fn pairing_hour_can_be_disabled_or_set() {
        let off = config(&[("DATABASE_URL", "sqlite::memory:"), ("PAIRING_HOUR", "off")]).unwrap();
        assert_eq!(off.pairing_hour, None);

        let at = config(&[("DATABASE_URL", "sqlite::memory:"), ("PAIRING_HOUR", "23")]).unwrap();
        assert_eq!(at.pairing_hour, Some(23));

        assert!(config(&[("DATABASE_URL", "sqlite::memory:"), ("PAIRING_HOUR", "24")]).is_err());
    }

    #[test]
    fn zero_relay_interval_is_rejected() {
        assert!(config(&[("DATABASE_URL", "sqlite::memory:"), ("OUTBOX_RELAY_SECS", "0")]).is_err());

        let every = config(&[("DATABASE_URL", "sqlite::memory:"), ("OUTBOX_RELAY_SECS", "5")]).unwrap();
        assert_eq!(every.relay_interval, Duration::from_secs(5));
    }
}

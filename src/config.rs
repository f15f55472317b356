// src/config.rs
//! Environment-provided settings. Everything required is checked before the
//! job makes any external call.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_BLOB_CONNECTION: &str = "BLOB_CONNECTION_STRING";
pub const ENV_EMAIL_CONNECTION: &str = "ACS_CONNECTION_STRING";
pub const ENV_SENDER: &str = "ACS_SENDER_ADDRESS";
pub const ENV_RECIPIENT: &str = "NOTIFY_RECIPIENT";
pub const ENV_JITTER_MAX_SECS: &str = "JITTER_MAX_SECS";
pub const ENV_RETENTION_DAYS: &str = "SEEN_RETENTION_DAYS";
pub const ENV_METRICS_ADDR: &str = "METRICS_ADDR";

const DEFAULT_JITTER_MAX_SECS: u64 = 10;
/// A century; longer windows are indistinguishable from "keep forever".
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Clone)]
pub struct Settings {
    pub blob_connection: String,
    pub email_connection: String,
    pub sender_address: String,
    pub recipient: String,
    pub jitter_max: Duration,
    pub retention_days: Option<u32>,
    /// Where `loop` serves `/metrics`; unset means no listener.
    pub metrics_addr: Option<SocketAddr>,
}

// connection strings carry credentials; keep them out of Debug output
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("blob_connection", &"<redacted>")
            .field("email_connection", &"<redacted>")
            .field("sender_address", &self.sender_address)
            .field("recipient", &self.recipient)
            .field("jitter_max", &self.jitter_max)
            .field("retention_days", &self.retention_days)
            .field("metrics_addr", &self.metrics_addr)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let blob_connection = required(ENV_BLOB_CONNECTION)?;
        let email_connection = required(ENV_EMAIL_CONNECTION)?;
        let sender_address = required(ENV_SENDER)?;
        let recipient = required(ENV_RECIPIENT)?;

        for (name, addr) in [(ENV_SENDER, &sender_address), (ENV_RECIPIENT, &recipient)] {
            if addr.parse::<lettre::Address>().is_err() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: format!("{addr:?} is not an email address"),
                });
            }
        }

        let jitter_secs = match get(ENV_JITTER_MAX_SECS) {
            Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: ENV_JITTER_MAX_SECS,
                reason: e.to_string(),
            })?,
            None => DEFAULT_JITTER_MAX_SECS,
        };

        let retention_days = match get(ENV_RETENTION_DAYS) {
            Some(v) => match v.parse::<u32>() {
                Ok(0) => None,
                Ok(d) if d > MAX_RETENTION_DAYS => {
                    return Err(ConfigError::Invalid {
                        name: ENV_RETENTION_DAYS,
                        reason: format!("at most {MAX_RETENTION_DAYS} days"),
                    })
                }
                Ok(d) => Some(d),
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: ENV_RETENTION_DAYS,
                        reason: e.to_string(),
                    })
                }
            },
            None => None,
        };

        let metrics_addr = get(ENV_METRICS_ADDR)
            .map(|v| {
                v.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                    name: ENV_METRICS_ADDR,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            blob_connection,
            email_connection,
            sender_address,
            recipient,
            jitter_max: Duration::from_secs(jitter_secs),
            retention_days,
            metrics_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_BLOB_CONNECTION, "/var/lib/listing-watch"),
            (ENV_EMAIL_CONNECTION, "endpoint=https://acs.example.com;accesskey=k"),
            (ENV_SENDER, "DoNotReply@watch.example"),
            (ENV_RECIPIENT, "ops@example.com"),
        ]
    }

    #[test]
    fn defaults_apply_when_optional_unset() {
        let env = vars(&base());
        let s = Settings::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(s.jitter_max, Duration::from_secs(10));
        assert_eq!(s.retention_days, None);
        assert_eq!(s.metrics_addr, None);
        assert!(!format!("{s:?}").contains("accesskey"));
    }

    #[test]
    fn blank_required_value_is_missing() {
        let mut pairs = base();
        pairs[2] = (ENV_SENDER, "   ");
        let env = vars(&pairs);
        let err = Settings::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_SENDER)));
    }

    #[test]
    fn optional_values_are_parsed() {
        let mut pairs = base();
        pairs.push((ENV_JITTER_MAX_SECS, "0"));
        pairs.push((ENV_RETENTION_DAYS, "90"));
        pairs.push((ENV_METRICS_ADDR, "127.0.0.1:9464"));
        let env = vars(&pairs);
        let s = Settings::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(s.jitter_max, Duration::ZERO);
        assert_eq!(s.retention_days, Some(90));
        assert_eq!(s.metrics_addr, Some("127.0.0.1:9464".parse().unwrap()));

        let mut bad = base();
        bad.push((ENV_JITTER_MAX_SECS, "soon"));
        let env = vars(&bad);
        assert!(matches!(
            Settings::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Invalid { name: ENV_JITTER_MAX_SECS, .. })
        ));
    }

    #[test]
    fn retention_is_capped() {
        let mut pairs = base();
        pairs.push((ENV_RETENTION_DAYS, "100000000"));
        let env = vars(&pairs);
        assert!(matches!(
            Settings::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Invalid { name: ENV_RETENTION_DAYS, .. })
        ));

        let mut pairs = base();
        pairs.push((ENV_RETENTION_DAYS, "36500"));
        let env = vars(&pairs);
        let s = Settings::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(s.retention_days, Some(MAX_RETENTION_DAYS));
    }

    #[test]
    fn bad_recipient_is_rejected() {
        let mut pairs = base();
        pairs[3] = (ENV_RECIPIENT, "ops-at-example");
        let env = vars(&pairs);
        assert!(matches!(
            Settings::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Invalid { name: ENV_RECIPIENT, .. })
        ));
    }
}

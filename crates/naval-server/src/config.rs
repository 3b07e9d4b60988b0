use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6789;
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

const PORT_VAR: &str = "PORT";
const WAIT_TIMEOUT_VAR: &str = "NAVAL_WAIT_TIMEOUT_SECS";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// How long a seat may sit in a session that is still waiting for players.
    pub wait_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            port: parse_or(PORT_VAR, lookup(PORT_VAR), DEFAULT_PORT),
            wait_timeout: Duration::from_secs(parse_or(
                WAIT_TIMEOUT_VAR,
                lookup(WAIT_TIMEOUT_VAR),
                DEFAULT_WAIT_TIMEOUT_SECS,
            )),
        }
    }
}

fn parse_or<T: FromStr + Display>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("Ignoring invalid {key}={raw:?}, using {default}");
        default
    })
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::ServerConfig;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        ServerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), ServerConfig::default());
        assert_eq!(ServerConfig::default().port, 6789);
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[("PORT", "4000"), ("NAVAL_WAIT_TIMEOUT_SECS", " 15 ")]);
        assert_eq!(config.port, 4000);
        assert_eq!(config.wait_timeout, Duration::from_secs(15));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config(&[("PORT", "70000"), ("NAVAL_WAIT_TIMEOUT_SECS", "soon")]);
        assert_eq!(config, ServerConfig::default());
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::weather::WeatherConfig;

const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const DEFAULT_WEATHER_CITIES: &str = "Gaza,Ramallah,Hebron,Nablus,Jenin";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// `None` when no weather API key is configured
    pub weather: Option<WeatherConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let weather = match get("PAWLINK_WEATHER_API_KEY") {
            Some(api_key) => {
                let interval_secs: u64 = parse_or(&get, "PAWLINK_WEATHER_INTERVAL_SECS", 3600)?;
                if interval_secs == 0 {
                    bail!("PAWLINK_WEATHER_INTERVAL_SECS must be greater than zero");
                }
                Some(WeatherConfig {
                    api_key,
                    url: get("PAWLINK_WEATHER_URL").unwrap_or_else(|| DEFAULT_WEATHER_URL.into()),
                    cities: get("PAWLINK_WEATHER_CITIES")
                        .unwrap_or_else(|| DEFAULT_WEATHER_CITIES.into())
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect(),
                    interval: Duration::from_secs(interval_secs),
                    high_celsius: parse_or(&get, "PAWLINK_WEATHER_HIGH_C", 30.0)?,
                    low_celsius: parse_or(&get, "PAWLINK_WEATHER_LOW_C", 5.0)?,
                })
            }
            None => None,
        };

        Ok(Self {
            host: get("PAWLINK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "PAWLINK_PORT", 3000)?,
            db_path: PathBuf::from(get("PAWLINK_DB_PATH").unwrap_or_else(|| "pawlink.db".into())),
            jwt_secret: get("PAWLINK_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into()),
            weather,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("pawlink.db"));
        assert!(cfg.weather.is_none());
    }

    #[test]
    fn test_weather_enabled_by_api_key() {
        let cfg = config(&[
            ("PAWLINK_WEATHER_API_KEY", "abc"),
            ("PAWLINK_WEATHER_CITIES", " Gaza , ,Jenin"),
            ("PAWLINK_WEATHER_HIGH_C", "32.5"),
        ])
        .unwrap();
        let weather = cfg.weather.unwrap();
        assert_eq!(weather.cities, vec!["Gaza".to_string(), "Jenin".to_string()]);
        assert_eq!(weather.high_celsius, 32.5);
        assert_eq!(weather.low_celsius, 5.0);
        assert_eq!(weather.interval, Duration::from_secs(3600));
        assert_eq!(weather.url, DEFAULT_WEATHER_URL);
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config(&[("PAWLINK_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PAWLINK_PORT"));

        // Blank means unset
        assert_eq!(config(&[("PAWLINK_PORT", "  ")]).unwrap().port, 3000);

        let err = config(&[
            ("PAWLINK_WEATHER_API_KEY", "abc"),
            ("PAWLINK_WEATHER_INTERVAL_SECS", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("PAWLINK_WEATHER_INTERVAL_SECS"));
    }
}

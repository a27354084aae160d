use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info, warn};

use pawlink_gateway::alerts::AlertService;
use pawlink_types::api::AlertRequest;
use pawlink_types::models::{
    AlertCategory, AlertCriteria, Region, Severity, TemperatureThreshold, ThresholdDirection,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SPECIES: [&str; 2] = ["dog", "cat"];

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    /// OpenWeatherMap-compatible "current weather" endpoint
    pub url: String,
    pub cities: Vec<String>,
    pub interval: Duration,
    pub high_celsius: f64,
    pub low_celsius: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: Readings,
}

#[derive(Debug, Deserialize)]
struct Readings {
    temp: f64,
}

/// Periodically checks city temperatures and raises weather alerts.
pub struct WeatherMonitor {
    client: reqwest::Client,
    config: WeatherConfig,
    alerts: AlertService,
}

impl WeatherMonitor {
    pub fn new(config: WeatherConfig, alerts: AlertService) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build weather HTTP client")?;
        Ok(Self {
            client,
            config,
            alerts,
        })
    }

    pub async fn run(self) {
        info!(
            "Weather monitor watching {} cities every {}s",
            self.config.cities.len(),
            self.config.interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            interval.tick().await;
            self.check_all().await;
        }
    }

    async fn check_all(&self) {
        for city in &self.config.cities {
            let temp = match self.fetch_temperature(city).await {
                Ok(temp) => temp,
                Err(e) => {
                    warn!("Weather check for {} failed: {:#}", city, e);
                    continue;
                }
            };
            debug!("{}: {}°C", city, temp);

            let Some(request) = alert_for(city, temp, self.config.high_celsius, self.config.low_celsius) else {
                continue;
            };
            match self.alerts.create(request, None).await {
                Ok(created) => info!(
                    "Weather alert {} raised for {} at {}°C ({} owners notified)",
                    created.alert.id,
                    city,
                    temp,
                    created.fan_out.map_or(0, |r| r.notified.len())
                ),
                Err(e) => warn!("Could not raise weather alert for {}: {}", city, e),
            }
        }
    }

    async fn fetch_temperature(&self, city: &str) -> Result<f64> {
        let resp = self
            .client
            .get(&self.config.url)
            .query(&[("q", city), ("appid", self.config.api_key.as_str()), ("units", "metric")])
            .send()
            .await
            .context("request failed")?;

        if !resp.status().is_success() {
            bail!("HTTP {}", resp.status());
        }

        let weather: CurrentWeather = resp.json().await.context("unexpected response body")?;
        Ok(weather.main.temp)
    }
}

/// Which side of the thresholds `temp` falls on, and how bad it is.
pub fn classify(temp: f64, high: f64, low: f64) -> Option<(ThresholdDirection, Severity)> {
    if temp >= high {
        let severity = if temp > 35.0 {
            Severity::Extreme
        } else if temp > 30.0 {
            Severity::Danger
        } else {
            Severity::Warning
        };
        Some((ThresholdDirection::High, severity))
    } else if temp <= low {
        let severity = if temp < 0.0 {
            Severity::Extreme
        } else if temp < 5.0 {
            Severity::Danger
        } else {
            Severity::Warning
        };
        Some((ThresholdDirection::Low, severity))
    } else {
        None
    }
}

/// Alert to raise for `city` at `temp`, if any.
pub fn alert_for(city: &str, temp: f64, high: f64, low: f64) -> Option<AlertRequest> {
    let (direction, severity) = classify(temp, high, low)?;
    Some(AlertRequest {
        category: AlertCategory::Weather,
        hazard: None,
        criteria: AlertCriteria {
            regions: vec![Region::city(city)],
            species: DEFAULT_SPECIES.iter().map(|s| s.to_string()).collect(),
            temperature: Some(TemperatureThreshold {
                direction,
                celsius: (temp * 10.0).round() / 10.0,
            }),
        },
        message: String::new(),
        severity,
        active: true,
    })
}

//! Current conditions and multi-day forecast for one location.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DailyWeather, RawItem, WeatherSourceConfig};
use crate::sources::{FetchParams, SourceAdapter};
use crate::utils::http::send_json;

#[derive(Debug, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub weather: Vec<Description>,
    pub main: Readings,
}

#[derive(Debug, Deserialize)]
pub struct Description {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct Readings {
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
}

/// One three-hourly forecast sample.
#[derive(Debug, Deserialize)]
pub struct Sample {
    pub dt: i64,
    #[serde(flatten)]
    pub conditions: Conditions,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    #[serde(default)]
    list: Vec<Value>,
}

/// Decode forecast samples one at a time; a sample that does not decode is
/// returned as an error and the others are kept.
pub fn decode_samples(list: Vec<Value>) -> (Vec<Sample>, Vec<AppError>) {
    let mut samples = Vec::with_capacity(list.len());
    let mut errors = Vec::new();
    for value in list {
        match serde_json::from_value::<Sample>(value) {
            Ok(sample) => samples.push(sample),
            Err(e) => errors.push(AppError::malformed(format!("forecast sample: {e}"))),
        }
    }
    (samples, errors)
}

/// Collapse forecast samples into one record per UTC calendar date.
///
/// High is the max of `temp_max`, low the min of `temp_min`, status the
/// description of the first sample seen for the date. `current` is folded
/// into the record for `today`, when there is one.
pub fn collapse_forecast(
    samples: &[Sample],
    current: Option<f64>,
    today: NaiveDate,
    lat: f64,
    lon: f64,
) -> Vec<DailyWeather> {
    let mut days: BTreeMap<NaiveDate, DailyWeather> = BTreeMap::new();

    for sample in samples {
        let Some(date) = DateTime::<Utc>::from_timestamp(sample.dt, 0).map(|dt| dt.date_naive())
        else {
            log::warn!("Skipping forecast sample with bad timestamp {}", sample.dt);
            continue;
        };
        let main = &sample.conditions.main;

        days.entry(date)
            .and_modify(|day| {
                day.high_temp = day.high_temp.max(main.temp_max);
                day.low_temp = day.low_temp.min(main.temp_min);
            })
            .or_insert_with(|| DailyWeather {
                date,
                lat,
                lon,
                status: sample
                    .conditions
                    .weather
                    .first()
                    .map(|w| w.description.clone())
                    .unwrap_or_default(),
                high_temp: main.temp_max,
                low_temp: main.temp_min,
                current_temp: None,
            });
    }

    if let Some(day) = days.get_mut(&today) {
        day.current_temp = current;
    }
    days.into_values().collect()
}

pub struct WeatherSource {
    id: String,
    client: reqwest::Client,
    config: WeatherSourceConfig,
    api_key: String,
}

impl WeatherSource {
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        config: WeatherSourceConfig,
        api_key: String,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            config,
            api_key,
        }
    }

    fn request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/{}", self.config.api_base.trim_end_matches('/'), endpoint))
            .query(&[
                ("lat", self.config.lat.to_string()),
                ("lon", self.config.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", self.config.units.clone()),
            ])
    }

    /// Undecodable samples first, as item errors, then one record per day.
    async fn days(&self, params: &FetchParams) -> Result<Vec<Result<RawItem>>> {
        log::info!(
            "[{}] Forecast for ({}, {})",
            self.id,
            self.config.lat,
            self.config.lon
        );

        // Current conditions only enrich today's record
        let current = match send_json::<Conditions>(&self.id, self.request("weather")).await {
            Ok(c) => Some(c.main.temp),
            Err(e) => {
                log::warn!("[{}] Current conditions unavailable: {}", self.id, e);
                None
            }
        };

        let forecast: Forecast = send_json(&self.id, self.request("forecast")).await?;
        let (samples, errors) = decode_samples(forecast.list);
        let days = collapse_forecast(
            &samples,
            current,
            params.now.date_naive(),
            self.config.lat,
            self.config.lon,
        );
        log::debug!(
            "[{}] {} samples collapsed into {} days, {} unreadable",
            self.id,
            samples.len(),
            days.len(),
            errors.len()
        );
        Ok(errors
            .into_iter()
            .map(Err)
            .chain(days.into_iter().map(|d| Ok(RawItem::Weather(d))))
            .collect())
    }
}

impl SourceAdapter for WeatherSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "weather"
    }

    fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        stream::once(self.days(params))
            .map(|result| match result {
                Ok(items) => stream::iter(items).boxed(),
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            })
            .flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocType;
    use crate::pipeline::IngestionRunner;
    use crate::sources::test_server::{TestServer, route};
    use crate::storage::{DocumentSink, MemorySink};
    use chrono::TimeZone;

    const FORECAST: &str = r#"{
        "cod": "200",
        "list": [
            {"dt": 1792238400, "main": {"temp": 61.0, "temp_min": 58.1, "temp_max": 63.0},
             "weather": [{"main": "Clouds", "description": "broken clouds"}]},
            {"dt": 1792249200, "main": {"temp": 66.0, "temp_min": 64.0, "temp_max": 68.4},
             "weather": [{"main": "Clear", "description": "clear sky"}]},
            {"dt": 1792270800, "main": {"temp": 55.0, "temp_min": 52.3, "temp_max": 56.0},
             "weather": [{"main": "Clear", "description": "clear sky"}]},
            {"dt": 1792310400, "main": {"temp": 50.0, "temp_min": 49.5, "temp_max": 51.0},
             "weather": [{"main": "Rain", "description": "light rain"}]}
        ]
    }"#;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_collapse_forecast() {
        let forecast: Forecast = serde_json::from_str(FORECAST).unwrap();
        let (samples, errors) = decode_samples(forecast.list);
        assert!(errors.is_empty());
        let days = collapse_forecast(&samples, Some(60.2), date("2026-10-17"), 40.71, -74.01);

        assert_eq!(days.len(), 2);

        let today = &days[0];
        assert_eq!(today.date, date("2026-10-17"));
        assert_eq!(today.high_temp, 68.4);
        assert_eq!(today.low_temp, 52.3);
        assert_eq!(today.status, "broken clouds");
        assert_eq!(today.current_temp, Some(60.2));
        assert_eq!(today.key(), "2026-10-17|40.71|-74.01");

        let tomorrow = &days[1];
        assert_eq!(tomorrow.date, date("2026-10-18"));
        assert_eq!(tomorrow.status, "light rain");
        assert!(tomorrow.current_temp.is_none());
    }

    #[test]
    fn test_collapse_empty_forecast() {
        let days = collapse_forecast(&[], Some(70.0), date("2026-10-17"), 0.0, 0.0);
        assert!(days.is_empty());
    }

    #[test]
    fn test_current_conditions_parse() {
        let current: Conditions = serde_json::from_str(
            r#"{"weather": [{"description": "mist"}], "main": {"temp": 59.9, "temp_min": 57.0, "temp_max": 61.0, "humidity": 90}}"#,
        )
        .unwrap();
        assert_eq!(current.main.temp, 59.9);
        assert_eq!(current.weather[0].description, "mist");
    }

    #[test]
    fn test_bad_sample_keeps_the_rest() {
        let list: Vec<Value> = serde_json::from_str(
            r#"[
                {"dt": 1792238400, "main": {"temp": 61.0, "temp_min": 58.1, "temp_max": 63.0}},
                {"dt": "soon", "main": {"temp": 1.0, "temp_min": 1.0, "temp_max": 1.0}},
                {"dt": 1792249200},
                {"dt": 1792310400, "main": {"temp": 50.0, "temp_min": 49.5, "temp_max": 51.0}}
            ]"#,
        )
        .unwrap();
        let (samples, errors) = decode_samples(list);

        assert_eq!(samples.len(), 2);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, AppError::ItemMalformed(_))));

        let days = collapse_forecast(&samples, None, date("2026-10-17"), 0.0, 0.0);
        assert_eq!(days.len(), 2);
    }

    #[tokio::test]
    async fn test_forecast_stored_when_current_conditions_fail() {
        let server = TestServer::start(vec![
            route("/weather", 500, r#"{"cod": 500}"#),
            route("/forecast", 200, FORECAST),
        ])
        .await;
        let config: WeatherSourceConfig = toml::from_str(&format!(
            "lat = 40.71\nlon = -74.01\napi_base = \"{}\"",
            server.base()
        ))
        .unwrap();
        let source = WeatherSource::new("weather-nyc", reqwest::Client::new(), config, "k".into());
        let sink = MemorySink::new();
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();

        let summary = IngestionRunner::new(&sink, 25)
            .run(&source, &FetchParams::new(now))
            .await;
        assert!(summary.is_success());
        assert_eq!(summary.inserted, 2);
        assert_eq!(server.hits("/weather"), 1);
        assert!(
            sink.contains(DocType::Weather, "2026-10-17|40.71|-74.01")
                .await
                .unwrap()
        );
    }
}

// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Heatwise.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Octopus Energy client: Agile unit rates and smart meter consumption.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use heatwise_core::{ConsumptionFeed, RateFeed};
use heatwise_types::{ConsumptionSample, RateSlot};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::{FeedError, FeedResult};

pub const DEFAULT_BASE_URL: &str = "https://api.octopus.energy/v1";
pub const SOURCE: &str = "octopus";

/// Upper bound on followed `next` links for one fetch.
const MAX_PAGES: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct UnitRate {
    value_inc_vat: f64,
    valid_from: DateTime<Utc>,
    #[serde(default)]
    valid_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    consumption: f64,
    interval_start: DateTime<Utc>,
    interval_end: DateTime<Utc>,
}

/// Electricity meter the consumption endpoint reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterPoint {
    pub mpan: String,
    pub serial_number: String,
}

/// Fetches half-hourly standard unit rates for one tariff.
#[derive(Clone)]
pub struct OctopusRateFeed {
    base_url: String,
    product_code: String,
    tariff_code: String,
    api_key: Option<String>,
    meter: Option<MeterPoint>,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for OctopusRateFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctopusRateFeed")
            .field("base_url", &self.base_url)
            .field("product_code", &self.product_code)
            .field("tariff_code", &self.tariff_code)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("meter", &self.meter)
            .finish_non_exhaustive()
    }
}

impl OctopusRateFeed {
    pub fn new(
        base_url: impl Into<String>,
        product_code: impl Into<String>,
        tariff_code: impl Into<String>,
        api_key: Option<String>,
    ) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::Config(format!("Failed to build HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            product_code: product_code.into(),
            tariff_code: tariff_code.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            meter: None,
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Build from configuration values, falling back to `OCTOPUS_API_KEY`
    /// when no key is configured.
    pub fn from_config(
        base_url: impl Into<String>,
        product_code: impl Into<String>,
        tariff_code: impl Into<String>,
        api_key: Option<String>,
    ) -> FeedResult<Self> {
        let api_key = api_key.or_else(|| std::env::var("OCTOPUS_API_KEY").ok());
        if api_key.is_none() {
            info!("No Octopus API key configured, using unauthenticated requests");
        }
        Self::new(base_url, product_code, tariff_code, api_key)
    }

    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Enable consumption reads for this meter.
    pub fn with_meter(mut self, meter: MeterPoint) -> Self {
        self.meter = Some(meter);
        self
    }

    pub fn meter(&self) -> Option<&MeterPoint> {
        self.meter.as_ref()
    }

    fn unit_rates_url(&self) -> String {
        format!(
            "{}/products/{}/electricity-tariffs/{}/standard-unit-rates/",
            self.base_url, self.product_code, self.tariff_code
        )
    }

    fn consumption_url(&self, meter: &MeterPoint) -> String {
        format!(
            "{}/electricity-meter-points/{}/meters/{}/consumption/",
            self.base_url, meter.mpan, meter.serial_number
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.basic_auth(key, Some("")),
            None => request,
        }
    }

    /// Unit rates valid in `[from, to)`, oldest first.
    pub async fn fetch_unit_rates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> FeedResult<Vec<RateSlot>> {
        let period_from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let period_to = to.to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!("Fetching Octopus unit rates {} .. {}", period_from, period_to);

        let url = self.unit_rates_url();
        let results: Vec<UnitRate> = self
            .get_all(|| {
                self.client
                    .get(&url)
                    .query(&[("period_from", &period_from), ("period_to", &period_to)])
            })
            .await?;

        let slots = to_slots(results);
        info!("Fetched {} Octopus unit rates", slots.len());
        Ok(slots)
    }

    /// Metered half-hourly import for intervals starting in `[from, to)`,
    /// oldest first. Needs a meter and an API key.
    pub async fn fetch_meter_consumption(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> FeedResult<Vec<ConsumptionSample>> {
        let Some(meter) = &self.meter else {
            return Err(FeedError::Config("no electricity meter configured".to_owned()));
        };
        if self.api_key.is_none() {
            return Err(FeedError::Config(
                "reading consumption requires an API key".to_owned(),
            ));
        }

        let period_from = from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let period_to = to.to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!("Fetching Octopus consumption {} .. {}", period_from, period_to);

        let url = self.consumption_url(meter);
        let readings: Vec<Reading> = self
            .get_all(|| {
                self.client.get(&url).query(&[
                    ("period_from", period_from.as_str()),
                    ("period_to", period_to.as_str()),
                    ("order_by", "period"),
                ])
            })
            .await?;

        let samples = to_samples(readings, from, to);
        info!("Fetched {} Octopus consumption readings", samples.len());
        Ok(samples)
    }

    /// Results of the first page and every `next` page after it.
    async fn get_all<T, F>(&self, first: F) -> FeedResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut results = Vec::new();
        let mut page: Page<T> = self.get_page(first).await?;

        for _ in 1..MAX_PAGES {
            results.append(&mut page.results);
            let Some(next) = page.next.take() else {
                break;
            };
            page = self.get_page(|| self.client.get(&next)).await?;
        }
        if page.next.is_some() {
            warn!("Octopus response has more than {} pages, ignoring the rest", MAX_PAGES);
        }
        results.append(&mut page.results);
        Ok(results)
    }

    async fn get_page<T, F>(&self, build: F) -> FeedResult<Page<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = self
            .retry_request(|| async { self.authorize(build()).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => response
                .json::<Page<T>>()
                .await
                .map_err(|e| FeedError::InvalidResponse(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("Octopus API rejected the API key");
                Err(FeedError::AuthenticationFailed)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Octopus API returned {}: {}", status, body);
                Err(FeedError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> FeedResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts > self.max_retries => {
                    error!("Octopus request failed after {} attempts: {}", attempts, e);
                    return Err(FeedError::Http(e));
                }
                Err(e) => {
                    warn!(
                        "Octopus request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

/// Sort ascending, drop duplicates and anything that is not a plain
/// half-hour slot.
fn to_slots(rates: Vec<UnitRate>) -> Vec<RateSlot> {
    let mut slots: Vec<RateSlot> = rates
        .into_iter()
        .filter_map(|rate| {
            let slot = RateSlot {
                start: rate.valid_from,
                end: rate.valid_to.unwrap_or(rate.valid_from),
                unit_rate: rate.value_inc_vat,
            };
            if slot.is_aligned() && slot.unit_rate.is_finite() {
                Some(slot)
            } else {
                debug!("Skipping non half-hour rate starting {}", rate.valid_from);
                None
            }
        })
        .collect();
    slots.sort_by_key(|slot| slot.start);
    slots.dedup_by_key(|slot| slot.start);
    slots
}

/// Keep readings inside `[from, to)`, oldest first, one per interval.
fn to_samples(readings: Vec<Reading>, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<ConsumptionSample> {
    let mut samples: Vec<ConsumptionSample> = readings
        .into_iter()
        .map(|r| ConsumptionSample {
            start: r.interval_start,
            end: r.interval_end,
            kwh: r.consumption,
        })
        .filter(|s| s.is_valid() && from <= s.start && s.start < to)
        .collect();
    samples.sort_by_key(|s| s.start);
    samples.dedup_by_key(|s| s.start);
    samples
}

#[async_trait]
impl RateFeed for OctopusRateFeed {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn fetch_rates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> anyhow::Result<Vec<RateSlot>> {
        Ok(self.fetch_unit_rates(from, to).await?)
    }
}

#[async_trait]
impl ConsumptionFeed for OctopusRateFeed {
    async fn fetch_consumption(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ConsumptionSample>> {
        Ok(self.fetch_meter_consumption(from, to).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const PATH: &str =
        "/products/AGILE-FLEX-22-11-25/electricity-tariffs/E-1R-AGILE-FLEX-22-11-25-B/standard-unit-rates/";

    fn feed(url: String, key: Option<&str>) -> OctopusRateFeed {
        OctopusRateFeed::new(
            url,
            "AGILE-FLEX-22-11-25",
            "E-1R-AGILE-FLEX-22-11-25-B",
            key.map(str::to_owned),
        )
        .unwrap()
        .with_retry_config(1, Duration::from_millis(5))
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let from = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        (from, from + chrono::Duration::hours(24))
    }

    #[tokio::test]
    async fn test_fetch_sorts_newest_first_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("period_from".into(), "2025-01-06T00:00:00Z".into()),
                Matcher::UrlEncoded("period_to".into(), "2025-01-07T00:00:00Z".into()),
            ]))
            // "sk_test:" in base64
            .match_header("authorization", "Basic c2tfdGVzdDo=")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "count": 2,
                    "next": null,
                    "previous": null,
                    "results": [
                        {"value_exc_vat": 20.0, "value_inc_vat": 21.0,
                         "valid_from": "2025-01-06T00:30:00Z", "valid_to": "2025-01-06T01:00:00Z"},
                        {"value_exc_vat": 11.4, "value_inc_vat": 12.0,
                         "valid_from": "2025-01-06T00:00:00Z", "valid_to": "2025-01-06T00:30:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = window();
        let slots = feed(server.url(), Some("sk_test"))
            .fetch_unit_rates(from, to)
            .await
            .unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start, from);
        assert_eq!(slots[0].unit_rate, 12.0);
        assert_eq!(slots[1].unit_rate, 21.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_follows_next_page() {
        let mut server = Server::new_async().await;
        let next = format!("{}/page-two", server.url());
        let first = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "next": next,
                    "results": [{"value_inc_vat": 12.0,
                                 "valid_from": "2025-01-06T00:30:00Z",
                                 "valid_to": "2025-01-06T01:00:00Z"}]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/page-two")
            .with_status(200)
            .with_body(
                json!({
                    "next": null,
                    "results": [{"value_inc_vat": 9.5,
                                 "valid_from": "2025-01-06T00:00:00Z",
                                 "valid_to": "2025-01-06T00:30:00Z"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = window();
        let slots = feed(server.url(), None).fetch_unit_rates(from, to).await.unwrap();

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].unit_rate, 9.5);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_skips_slots_that_are_not_half_hours() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "results": [
                        {"value_inc_vat": 24.0, "valid_from": "2025-01-06T00:00:00Z", "valid_to": null},
                        {"value_inc_vat": 12.0, "valid_from": "2025-01-06T01:00:00Z",
                         "valid_to": "2025-01-06T01:30:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = window();
        let slots = feed(server.url(), None).fetch_unit_rates(from, to).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].unit_rate, 12.0);
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let (from, to) = window();
        let err = feed(server.url(), Some("bad"))
            .fetch_unit_rates(from, to)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_server_error_reports_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let (from, to) = window();
        let err = feed(server.url(), None).fetch_unit_rates(from, to).await.unwrap_err();
        assert!(matches!(err, FeedError::UnexpectedStatus { status: 503, .. }));
    }

    const CONSUMPTION_PATH: &str = "/electricity-meter-points/2000012345678/meters/21L4381234/consumption/";

    fn metered(url: String, key: Option<&str>) -> OctopusRateFeed {
        feed(url, key).with_meter(MeterPoint {
            mpan: "2000012345678".to_owned(),
            serial_number: "21L4381234".to_owned(),
        })
    }

    #[tokio::test]
    async fn test_fetch_consumption_reads_meter_intervals() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", CONSUMPTION_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("period_from".into(), "2025-01-06T00:00:00Z".into()),
                Matcher::UrlEncoded("period_to".into(), "2025-01-07T00:00:00Z".into()),
                Matcher::UrlEncoded("order_by".into(), "period".into()),
            ]))
            .match_header("authorization", "Basic c2tfdGVzdDo=")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "count": 3,
                    "next": null,
                    "previous": null,
                    "results": [
                        {"consumption": 1.52,
                         "interval_start": "2025-01-06T00:30:00Z", "interval_end": "2025-01-06T01:00:00Z"},
                        {"consumption": 0.21,
                         "interval_start": "2025-01-06T00:00:00+00:00", "interval_end": "2025-01-06T00:30:00+00:00"},
                        {"consumption": 0.4,
                         "interval_start": "2025-01-07T00:00:00Z", "interval_end": "2025-01-07T00:30:00Z"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = window();
        let samples = metered(server.url(), Some("sk_test"))
            .fetch_meter_consumption(from, to)
            .await
            .unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].start, from);
        assert_eq!(samples[0].kwh, 0.21);
        assert_eq!(samples[1].kwh, 1.52);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_consumption_follows_next_page() {
        let mut server = Server::new_async().await;
        let next = format!("{}/consumption-two", server.url());
        let _first = server
            .mock("GET", CONSUMPTION_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "next": next,
                    "results": [{"consumption": 0.5,
                                 "interval_start": "2025-01-06T00:00:00Z",
                                 "interval_end": "2025-01-06T00:30:00Z"}]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _second = server
            .mock("GET", "/consumption-two")
            .with_status(200)
            .with_body(
                json!({
                    "next": null,
                    "results": [{"consumption": 0.75,
                                 "interval_start": "2025-01-06T00:30:00Z",
                                 "interval_end": "2025-01-06T01:00:00Z"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (from, to) = window();
        let samples = metered(server.url(), Some("sk_test"))
            .fetch_consumption(from, to)
            .await
            .unwrap();
        let total: f64 = samples.iter().map(|s| s.kwh).sum();
        assert!((total - 1.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_consumption_needs_meter_and_key() {
        let (from, to) = window();

        let err = feed("http://127.0.0.1:9".to_owned(), Some("sk_test"))
            .fetch_meter_consumption(from, to)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));

        let err = metered("http://127.0.0.1:9".to_owned(), None)
            .fetch_meter_consumption(from, to)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }

    #[tokio::test]
    async fn test_consumption_rejected_key() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", CONSUMPTION_PATH)
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let (from, to) = window();
        let err = metered(server.url(), Some("bad"))
            .fetch_meter_consumption(from, to)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::AuthenticationFailed));
    }
}

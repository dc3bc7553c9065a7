//! Yahoo Finance provider.
//!
//! Fundamentals come from the quote-summary endpoint, FX rates from the
//! chart endpoint of the `{FROM}{TO}=X` pseudo-ticker. Every request goes
//! through a [`RequestPacer`] and every result through the injected
//! [`MarketDataCache`].

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::cache::MarketDataCache;
use super::resolve::{split_minor_unit, RawFields, ResolvedFundamentals};
use super::{FinancialDataProvider, FinancialSnapshot};
use crate::error::PeerValueError;
use crate::types::{Currency, Rate};
use crate::PeerValueResult;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Quote-summary modules, in precedence order for duplicate keys.
const MODULES: [&str; 4] = ["price", "summaryDetail", "financialData", "defaultKeyStatistics"];

#[derive(Debug, Clone)]
pub struct YahooConfig {
    pub base_url: String,
    pub reporting_currency: Currency,
    /// Per-request timeout
    pub timeout: Duration,
    /// Minimum spacing between consecutive requests
    pub request_delay: Duration,
    /// Responses with fewer fields than this are retried once
    pub min_fields: usize,
    pub retry_pause: Duration,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            reporting_currency: Currency::EUR,
            timeout: Duration::from_secs(20),
            request_delay: Duration::from_millis(100),
            min_fields: 10,
            retry_pause: Duration::from_secs(1),
        }
    }
}

/// Enforces a minimum interval between request starts.
#[derive(Debug)]
struct RequestPacer {
    last: Mutex<Option<Instant>>,
    interval: Duration,
}

impl RequestPacer {
    fn new(interval: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct YahooProvider {
    client: Client,
    config: YahooConfig,
    pacer: RequestPacer,
    cache: Arc<MarketDataCache>,
}

impl YahooProvider {
    pub fn new(config: YahooConfig, cache: Arc<MarketDataCache>) -> PeerValueResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PeerValueError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            pacer: RequestPacer::new(config.request_delay),
            config,
            cache,
        })
    }

    pub fn cache(&self) -> &MarketDataCache {
        &self.cache
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> PeerValueResult<Value> {
        self.pacer.wait().await;
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| PeerValueError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PeerValueError::Provider(format!("HTTP {}", response.status())));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| PeerValueError::Provider(e.to_string()))
    }

    async fn fetch_fields(&self, ticker: &str) -> PeerValueResult<RawFields> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.config.base_url, ticker);
        let modules = MODULES.join(",");
        let body = self.get_json(&url, &[("modules", modules.as_str())]).await?;
        parse_quote_summary(&body)
    }

    /// Fetch and resolve fields, retrying once on a sparse response.
    async fn fetch_snapshot(&self, ticker: &str) -> FinancialSnapshot {
        let fields = match self.fetch_fields(ticker).await {
            Ok(first) if first.len() < self.config.min_fields => {
                tracing::debug!(ticker, fields = first.len(), "sparse response, retrying");
                tokio::time::sleep(self.config.retry_pause).await;
                match self.fetch_fields(ticker).await {
                    Ok(second) if second.len() > first.len() => second,
                    Ok(_) => first,
                    Err(e) => {
                        tracing::warn!(ticker, error = %e, "retry failed, keeping first response");
                        first
                    }
                }
            }
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(ticker, error = %e, "fundamentals fetch failed");
                return FinancialSnapshot::unavailable(ticker, e.to_string());
            }
        };

        let resolved = ResolvedFundamentals::from_fields(&fields);

        // Yahoo omits the currency mostly for US listings.
        let (quote_ccy, quote_divisor) = resolved
            .currency
            .as_deref()
            .map(split_minor_unit)
            .unwrap_or((Currency::USD, Decimal::ONE));
        // Statements are reported in major units even for minor-unit quotes.
        let (statement_ccy, statement_divisor) = resolved
            .financial_currency
            .as_deref()
            .map(split_minor_unit)
            .unwrap_or_else(|| (quote_ccy.clone(), Decimal::ONE));

        let quote_scale = self.rate_or_one(&quote_ccy).await / quote_divisor;
        let statement_scale = self.rate_or_one(&statement_ccy).await / statement_divisor;

        let snapshot = resolved.into_snapshot(ticker, quote_ccy, quote_scale, statement_scale);
        if snapshot.success {
            tracing::debug!(ticker, price = ?snapshot.price, "snapshot resolved");
        } else {
            tracing::warn!(ticker, "no usable price in response");
        }
        snapshot
    }

    /// Rate into the reporting currency, or 1.0 with a warning.
    async fn rate_or_one(&self, from: &Currency) -> Rate {
        let to = &self.config.reporting_currency;
        match self.get_exchange_rate(from, to).await {
            Some(rate) => rate,
            None => {
                tracing::warn!(from = %from, to = %to, "exchange rate unavailable, using 1.0");
                Decimal::ONE
            }
        }
    }

    async fn fetch_rate(&self, from: &Currency, to: &Currency) -> Option<Rate> {
        let url = format!(
            "{}/v8/finance/chart/{}{}=X",
            self.config.base_url,
            from.code(),
            to.code()
        );
        match self.get_json(&url, &[("range", "1d"), ("interval", "1d")]).await {
            Ok(body) => parse_chart_rate(&body),
            Err(e) => {
                tracing::warn!(from = %from, to = %to, error = %e, "exchange rate fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl FinancialDataProvider for YahooProvider {
    async fn get_snapshot(&self, ticker: &str) -> FinancialSnapshot {
        let ticker = ticker.trim().to_ascii_uppercase();
        let key = ticker.as_str();
        self.cache
            .snapshot_or_fetch(key, move || self.fetch_snapshot(key))
            .await
    }

    async fn get_exchange_rate(&self, from: &Currency, to: &Currency) -> Option<Rate> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.cache
            .rate_or_fetch(from, to, move || self.fetch_rate(from, to))
            .await
    }
}

/// Flatten a quote-summary response into [`RawFields`].
///
/// Values may be bare numbers, `{"raw": n, "fmt": ..}` objects or strings.
/// Keys found in earlier modules take precedence.
pub fn parse_quote_summary(body: &Value) -> PeerValueResult<RawFields> {
    let summary = &body["quoteSummary"];
    if let Some(err) = summary.get("error").filter(|e| !e.is_null()) {
        let description = err["description"].as_str().unwrap_or("unknown error");
        return Err(PeerValueError::Provider(description.to_string()));
    }
    let result = summary["result"]
        .get(0)
        .and_then(Value::as_object)
        .ok_or_else(|| PeerValueError::Provider("empty quote summary".into()))?;

    let ordered = MODULES
        .iter()
        .filter_map(|m| result.get(*m))
        .chain(
            result
                .iter()
                .filter(|(k, _)| !MODULES.contains(&k.as_str()))
                .map(|(_, v)| v),
        );

    let mut fields = RawFields::new();
    for module in ordered {
        let Some(entries) = module.as_object() else {
            continue;
        };
        for (key, value) in entries {
            match value {
                Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        fields.insert_number(key.as_str(), v);
                    }
                }
                Value::Object(obj) => {
                    if let Some(v) = obj.get("raw").and_then(Value::as_f64) {
                        fields.insert_number(key.as_str(), v);
                    }
                }
                Value::String(s) => fields.insert_text(key.as_str(), s.as_str()),
                _ => {}
            }
        }
    }
    Ok(fields)
}

/// Last traded rate from a chart response; non-positive rates are absent.
pub fn parse_chart_rate(body: &Value) -> Option<Rate> {
    body["chart"]["result"]
        .get(0)?
        .get("meta")?
        .get("regularMarketPrice")?
        .as_f64()
        .and_then(Decimal::from_f64)
        .filter(|r| *r > Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::resolve::{CURRENCY_KEYS, NAME_KEYS, PRICE_KEYS, REVENUE_KEYS};
    use serde_json::json;

    #[test]
    fn test_parse_quote_summary_flattens_modules() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 61.2, "fmt": "61.20"},
                        "longName": "The Coca-Cola Company",
                        "currency": "USD"
                    },
                    "financialData": {
                        "currentPrice": {"raw": 61.0},
                        "totalRevenue": {"raw": 45754000000.0, "fmt": "45.75B"},
                        "ebitda": {}
                    }
                }],
                "error": null
            }
        });
        let fields = parse_quote_summary(&body).unwrap();
        assert_eq!(fields.number(&PRICE_KEYS), Some(61.0));
        assert_eq!(fields.number(&REVENUE_KEYS), Some(45754000000.0));
        assert_eq!(fields.text(&NAME_KEYS), Some("The Coca-Cola Company"));
        assert_eq!(fields.text(&CURRENCY_KEYS), Some("USD"));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_parse_quote_summary_error() {
        let body = json!({
            "quoteSummary": {
                "result": null,
                "error": {"code": "Not Found", "description": "Quote not found for ticker symbol: XXXX"}
            }
        });
        let err = parse_quote_summary(&body).unwrap_err();
        assert!(err.to_string().contains("Quote not found"));
    }

    #[test]
    fn test_parse_chart_rate() {
        let body = json!({
            "chart": {"result": [{"meta": {"currency": "EUR", "regularMarketPrice": 0.9214}}]}
        });
        assert_eq!(parse_chart_rate(&body), Some(Decimal::from_f64(0.9214).unwrap()));
        assert_eq!(parse_chart_rate(&json!({"chart": {"result": []}})), None);
    }

    // -----------------------------------------------------------------------
    // HTTP path against a local mock server
    // -----------------------------------------------------------------------

    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, request_delay: Duration) -> YahooProvider {
        let config = YahooConfig {
            base_url: server.uri(),
            reporting_currency: Currency::EUR,
            timeout: Duration::from_secs(5),
            request_delay,
            min_fields: 10,
            retry_pause: Duration::from_millis(10),
        };
        YahooProvider::new(config, Arc::new(MarketDataCache::new())).unwrap()
    }

    /// Quote summary with ten fundamentals plus any currency fields given.
    fn summary(currency: Option<&str>, financial_currency: Option<&str>, price: f64) -> Value {
        let mut price_module = json!({
            "regularMarketPrice": {"raw": price, "fmt": "-"},
            "longName": "Test Holdings plc"
        });
        if let Some(c) = currency {
            price_module["currency"] = json!(c);
        }
        let mut financial = json!({
            "totalRevenue": {"raw": 1000.0},
            "ebitda": {"raw": 200.0},
            "totalDebt": {"raw": 300.0},
            "totalCash": {"raw": 100.0},
            "grossProfit": {"raw": 400.0}
        });
        if let Some(c) = financial_currency {
            financial["financialCurrency"] = json!(c);
        }
        json!({
            "quoteSummary": {
                "result": [{
                    "price": price_module,
                    "financialData": financial,
                    "defaultKeyStatistics": {
                        "trailingEps": {"raw": 150.0},
                        "sharesOutstanding": {"raw": 50.0},
                        "netIncomeToCommon": {"raw": 80.0}
                    }
                }],
                "error": null
            }
        })
    }

    fn chart(rate: f64) -> Value {
        json!({"chart": {"result": [{"meta": {"regularMarketPrice": rate}}]}})
    }

    async fn mount_summary(server: &MockServer, ticker: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v10/finance/quoteSummary/{ticker}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_pence_quote_converted_with_fx() {
        let server = MockServer::start().await;
        mount_summary(&server, "VOD.L", summary(Some("GBp"), Some("GBP"), 2000.0)).await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/GBPEUR=X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(1.25)))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = provider(&server, Duration::ZERO).get_snapshot("VOD.L").await;

        assert!(snapshot.success);
        assert_eq!(snapshot.name, "Test Holdings plc");
        assert_eq!(snapshot.currency, Some(Currency::GBP));
        // 2000 pence -> 20 GBP -> 25 EUR
        assert_eq!(snapshot.price, Some(dec!(25)));
        assert_eq!(snapshot.eps, Some(dec!(1.875)));
        // statements are in pounds already
        assert_eq!(snapshot.revenue, Some(dec!(1250)));
        assert_eq!(snapshot.ebitda, Some(dec!(250)));
        assert_eq!(snapshot.shares, Some(dec!(50)));
    }

    #[tokio::test]
    async fn test_missing_fx_rate_falls_back_to_one() {
        let server = MockServer::start().await;
        mount_summary(&server, "KO", summary(Some("USD"), Some("USD"), 40.0)).await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/USDEUR=X"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let p = provider(&server, Duration::ZERO);
        let snapshot = p.get_snapshot("KO").await;

        assert!(snapshot.success);
        assert_eq!(snapshot.currency, Some(Currency::USD));
        assert_eq!(snapshot.price, Some(dec!(40)));
        assert_eq!(snapshot.revenue, Some(dec!(1000)));
        assert_eq!(p.get_exchange_rate(&Currency::USD, &Currency::EUR).await, None);
    }

    #[tokio::test]
    async fn test_absent_currency_is_taken_as_usd() {
        let server = MockServer::start().await;
        mount_summary(&server, "MSFT", summary(None, None, 40.0)).await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/USDEUR=X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(0.5)))
            .mount(&server)
            .await;

        let snapshot = provider(&server, Duration::ZERO).get_snapshot("MSFT").await;

        assert_eq!(snapshot.currency, Some(Currency::USD));
        assert_eq!(snapshot.price, Some(dec!(20)));
        assert_eq!(snapshot.revenue, Some(dec!(500)));
    }

    #[tokio::test]
    async fn test_sparse_response_retried_once() {
        let server = MockServer::start().await;
        let sparse = json!({
            "quoteSummary": {
                "result": [{"price": {"regularMarketPrice": {"raw": 90.0}, "currency": "EUR"}}],
                "error": null
            }
        });
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/SAP.DE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sparse))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        mount_summary(&server, "SAP.DE", summary(Some("EUR"), Some("EUR"), 90.0)).await;

        let snapshot = provider(&server, Duration::ZERO).get_snapshot("SAP.DE").await;

        assert!(snapshot.success);
        assert_eq!(snapshot.revenue, Some(dec!(1000)));
        assert_eq!(snapshot.eps, Some(dec!(150)));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_http_error_gives_unavailable_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/GONE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let snapshot = provider(&server, Duration::ZERO).get_snapshot("GONE").await;

        assert!(!snapshot.success);
        assert!(snapshot.failure_reason().contains("500"));
    }

    #[tokio::test]
    async fn test_second_lookup_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/SAP.DE"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(summary(Some("EUR"), Some("EUR"), 90.0)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server, Duration::ZERO);
        let first = p.get_snapshot("SAP.DE").await;
        let second = p.get_snapshot("sap.de").await;

        assert_eq!(first, second);
        let stats = p.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_requests_are_spaced() {
        let server = MockServer::start().await;
        mount_summary(&server, "AAA", summary(Some("EUR"), Some("EUR"), 10.0)).await;
        mount_summary(&server, "BBB", summary(Some("EUR"), Some("EUR"), 10.0)).await;

        let delay = Duration::from_millis(150);
        let p = provider(&server, delay);
        let start = Instant::now();
        p.get_snapshot("AAA").await;
        p.get_snapshot("BBB").await;

        assert!(start.elapsed() >= delay);
    }
}

//! Yahoo client against a local mock server

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::test_config;
use industry_screener::analysis::extract_company;
use industry_screener::api::{FinancialDataProvider, ProviderError, YahooClient};
use industry_screener::models::Config;

const TIMESERIES_PATH: &str = "/ws/fundamentals-timeseries/v1/finance/timeseries/TCS.NS";
const PROFILE_PATH: &str = "/v10/finance/quoteSummary/TCS.NS";

fn points(values: &[(&str, f64)]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|(date, raw)| json!({ "asOfDate": date, "reportedValue": { "raw": raw } }))
            .collect(),
    )
}

fn timeseries_body() -> Value {
    let revenue = points(&[
        ("2021-03-31", 1000.0),
        ("2022-03-31", 1100.0),
        ("2023-03-31", 1210.0),
        ("2024-03-31", 1331.0),
    ]);
    let net_income = points(&[
        ("2021-03-31", 100.0),
        ("2022-03-31", 110.0),
        ("2023-03-31", 121.0),
        ("2024-03-31", 133.1),
    ]);
    json!({
        "timeseries": {
            "result": [
                { "meta": { "symbol": ["TCS.NS"], "type": ["annualTotalRevenue"] }, "annualTotalRevenue": revenue },
                { "meta": { "symbol": ["TCS.NS"], "type": ["annualNetIncome"] }, "annualNetIncome": net_income },
                { "meta": { "symbol": ["TCS.NS"], "type": ["annualDilutedEPS"] } }
            ],
            "error": null
        }
    })
}

fn profile_body() -> Value {
    json!({
        "quoteSummary": {
            "result": [{
                "assetProfile": { "industry": "Information Technology Services" },
                "price": { "marketCap": { "raw": 1.4e13, "fmt": "14T" } }
            }],
            "error": null
        }
    })
}

fn client_for(server: &MockServer) -> YahooClient {
    let dir = tempdir().unwrap();
    let config = Config {
        yahoo_base_url: server.uri(),
        rate_limit_per_minute: 6000,
        ..test_config(dir.path())
    };
    YahooClient::new(&config).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_fetch_company_builds_statements_and_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TIMESERIES_PATH))
        .and(query_param("symbol", "TCS.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(timeseries_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .and(query_param("modules", "assetProfile,price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let company = client.fetch_company("TCS.NS").await.unwrap();

    assert_eq!(company.income_statement.get("Total Revenue").map(|s| s.len()), Some(4));
    assert!(company.income_statement.get("Diluted EPS").is_none());
    assert_eq!(
        company.info.industry.as_deref(),
        Some("Information Technology Services")
    );

    let record = extract_company(&company, 4);
    assert!((record.revenue_cagr.unwrap() - 0.10).abs() < 1e-9);
    assert!((record.net_profit_margin_avg.unwrap() - 0.10).abs() < 1e-9);
    assert_eq!(record.market_cap, Some(1.4e13));

    let years = client.annual_report_years("TCS.NS").await.unwrap();
    assert_eq!(years.into_iter().collect::<Vec<_>>(), vec![2021, 2022, 2023, 2024]);
}

#[test_log::test(tokio::test)]
async fn test_missing_profile_leaves_info_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TIMESERIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(timeseries_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PROFILE_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let company = client_for(&server).fetch_company("TCS.NS").await.unwrap();

    assert_eq!(company.info.industry, None);
    assert_eq!(company.info.market_cap, None);
}

#[test_log::test(tokio::test)]
async fn test_http_errors_map_to_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ws/fundamentals-timeseries/v1/finance/timeseries/BUSY.NS"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/fundamentals-timeseries/v1/finance/timeseries/DOWN.NS"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/fundamentals-timeseries/v1/finance/timeseries/BROKEN.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&server);

    assert_eq!(
        client.fetch_company("BUSY.NS").await.unwrap_err(),
        ProviderError::RateLimited
    );

    let down = client.fetch_company("DOWN.NS").await.unwrap_err();
    assert!(down.is_transient());
    assert_matches!(down, ProviderError::Http { status: 503, .. });

    let missing = client.fetch_company("NOPE.NS").await.unwrap_err();
    assert!(!missing.is_transient());
    assert_matches!(missing, ProviderError::NotFound(t) if t == "NOPE.NS");

    let broken = client.fetch_company("BROKEN.NS").await.unwrap_err();
    assert!(!broken.is_transient());
}

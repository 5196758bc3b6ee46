//! HTTP adapter tests for the price feed and the chain explorers.
//!
//! Uses `wiremock` to stand in for CoinGecko, BlockCypher and Etherscan.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

use ticket_checkout::domain::{
    AppError, ChainObserver, ConfirmationPolicy, Currency, ExternalServiceError, PriceFeed,
};
use ticket_checkout::infra::{BlockCypherObserver, CoinGeckoPriceFeed, EtherscanObserver};

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// COINGECKO
// ============================================================================

mod coingecko_tests {
    use super::*;

    async fn feed(server: &MockServer) -> CoinGeckoPriceFeed {
        CoinGeckoPriceFeed::new(Some(server.uri()), TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_usd_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bitcoin": {"usd": 60000.5}})))
            .expect(1)
            .mount(&server)
            .await;

        let price = feed(&server).await.fetch_usd_price(Currency::Btc).await.unwrap();
        assert_eq!(price, Decimal::new(600005, 1));
    }

    #[tokio::test]
    async fn test_usdt_uses_tether_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "tether"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tether": {"usd": 1.0}})))
            .mount(&server)
            .await;

        let price = feed(&server).await.fetch_usd_price(Currency::Usdt).await.unwrap();
        assert_eq!(price, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_missing_quote_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = feed(&server).await.fetch_usd_price(Currency::Eth).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::ExternalService(ExternalServiceError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_throttled_feed_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = feed(&server).await.fetch_usd_price(Currency::Btc).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::ExternalService(ExternalServiceError::RateLimited(_))
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = feed(&server).await.fetch_usd_price(Currency::Btc).await.unwrap_err();
        match &err {
            AppError::ExternalService(ExternalServiceError::ApiError { status_code, message }) => {
                assert_eq!(*status_code, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
        assert!(err.is_transient());
    }
}

// ============================================================================
// BLOCKCYPHER
// ============================================================================

mod blockcypher_tests {
    use super::*;

    const ADDRESS: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

    fn observer(server: &MockServer) -> BlockCypherObserver {
        BlockCypherObserver::new(Some(server.uri()), ADDRESS, ConfirmationPolicy::default(), TIMEOUT)
            .unwrap()
    }

    fn address_response(satoshis: i64, confirmations: u32, received: chrono::DateTime<Utc>) -> serde_json::Value {
        json!({
            "address": ADDRESS,
            "txs": [
                {
                    "hash": "btc-tx-1",
                    "received": received.to_rfc3339(),
                    "confirmations": confirmations,
                    "outputs": [
                        { "value": satoshis, "addresses": [ADDRESS] },
                        { "value": 12345, "addresses": ["tb1qchange"] }
                    ]
                }
            ]
        })
    }

    async fn mount(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/addrs/{ADDRESS}/full")))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_matching_output_is_found() {
        let server = MockServer::start().await;
        let since = Utc::now() - ChronoDuration::minutes(5);
        mount(&server, address_response(500_000, 2, Utc::now())).await;

        let observation = observer(&server)
            .check(Currency::Btc, Decimal::new(500_000, 8), since)
            .await
            .unwrap();
        assert!(observation.found);
        assert!(observation.is_complete);
        assert_eq!(observation.confirmations, 2);
        assert_eq!(observation.tx_hash.as_deref(), Some("btc-tx-1"));
        assert_eq!(observation.received_amount, Some(Decimal::new(500_000, 8)));
    }

    #[tokio::test]
    async fn test_unconfirmed_match_is_not_complete() {
        let server = MockServer::start().await;
        let since = Utc::now() - ChronoDuration::minutes(5);
        mount(&server, address_response(500_000, 0, Utc::now())).await;

        let observation = observer(&server)
            .check(Currency::Btc, Decimal::new(500_000, 8), since)
            .await
            .unwrap();
        assert!(observation.found);
        assert!(!observation.is_complete);
        assert_eq!(observation.required_confirmations, 1);
    }

    #[tokio::test]
    async fn test_transaction_before_payment_window_is_ignored() {
        let server = MockServer::start().await;
        let since = Utc::now();
        mount(&server, address_response(500_000, 6, since - ChronoDuration::hours(1))).await;

        let observation = observer(&server)
            .check(Currency::Btc, Decimal::new(500_000, 8), since)
            .await
            .unwrap();
        assert!(!observation.found);
    }

    #[tokio::test]
    async fn test_wrong_amount_is_not_found() {
        let server = MockServer::start().await;
        let since = Utc::now() - ChronoDuration::minutes(5);
        mount(&server, address_response(400_000, 6, Utc::now())).await;

        let observation = observer(&server)
            .check(Currency::Btc, Decimal::new(500_000, 8), since)
            .await
            .unwrap();
        assert!(!observation.found);
    }

    #[tokio::test]
    async fn test_address_without_history() {
        let server = MockServer::start().await;
        mount(&server, json!({ "address": ADDRESS })).await;

        let observation = observer(&server)
            .check(Currency::Btc, Decimal::new(1, 3), Utc::now())
            .await
            .unwrap();
        assert!(!observation.found);
    }

    #[tokio::test]
    async fn test_explorer_outage_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = observer(&server)
            .check(Currency::Btc, Decimal::new(1, 3), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_explorer_is_transient() {
        let observer = BlockCypherObserver::new(
            Some("http://127.0.0.1:1".to_string()),
            ADDRESS,
            ConfirmationPolicy::default(),
            TIMEOUT,
        )
        .unwrap();

        let err = observer
            .check(Currency::Btc, Decimal::new(1, 3), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

// ============================================================================
// ETHERSCAN
// ============================================================================

mod etherscan_tests {
    use super::*;

    const ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb";
    const CONTRACT: &str = "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06";

    fn observer(server: &MockServer) -> EtherscanObserver {
        EtherscanObserver::new(
            Some(server.uri()),
            None,
            ADDRESS,
            Some(CONTRACT.to_string()),
            ConfirmationPolicy::default(),
            TIMEOUT,
        )
        .unwrap()
    }

    fn transfer(value: &str, confirmations: u32, token_decimal: Option<&str>) -> serde_json::Value {
        let mut tx = json!({
            "hash": "0xfeed",
            "timeStamp": Utc::now().timestamp().to_string(),
            "from": "0x0000000000000000000000000000000000000001",
            "to": ADDRESS.to_lowercase(),
            "value": value,
            "confirmations": confirmations.to_string(),
            "isError": "0"
        });
        if let Some(decimals) = token_decimal {
            tx["tokenDecimal"] = json!(decimals);
        }
        tx
    }

    fn ok(txs: Vec<serde_json::Value>) -> serde_json::Value {
        json!({ "status": "1", "message": "OK", "result": txs })
    }

    #[tokio::test]
    async fn test_native_transfer_uses_txlist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("module", "account"))
            .and(query_param("action", "txlist"))
            .and(query_param("address", ADDRESS))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok(vec![transfer(
                "100000000000000000",
                12,
                None,
            )])))
            .expect(1)
            .mount(&server)
            .await;

        let since = Utc::now() - ChronoDuration::minutes(5);
        let observation = observer(&server)
            .check(Currency::Eth, Decimal::new(1, 1), since)
            .await
            .unwrap();
        assert!(observation.found);
        assert!(observation.is_complete);
        assert_eq!(observation.tx_hash.as_deref(), Some("0xfeed"));
    }

    #[tokio::test]
    async fn test_token_transfer_uses_tokentx_and_contract() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "tokentx"))
            .and(query_param("contractaddress", CONTRACT))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok(vec![transfer(
                "300000000",
                3,
                Some("6"),
            )])))
            .mount(&server)
            .await;

        let since = Utc::now() - ChronoDuration::minutes(5);
        let observation = observer(&server)
            .check(Currency::Usdt, Decimal::from(300), since)
            .await
            .unwrap();
        assert!(observation.found);
        assert!(!observation.is_complete);
        assert_eq!(observation.confirmations, 3);
        assert_eq!(observation.required_confirmations, 12);
    }

    #[tokio::test]
    async fn test_no_transactions_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "No transactions found",
                "result": []
            })))
            .mount(&server)
            .await;

        let observation = observer(&server)
            .check(Currency::Eth, Decimal::new(1, 1), Utc::now())
            .await
            .unwrap();
        assert!(!observation.found);
    }

    #[tokio::test]
    async fn test_notok_message_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "NOTOK",
                "result": "Invalid API Key"
            })))
            .mount(&server)
            .await;

        let err = observer(&server)
            .check(Currency::Eth, Decimal::new(1, 1), Utc::now())
            .await
            .unwrap_err();
        match err {
            AppError::ExternalService(ExternalServiceError::ApiError { message, .. }) => {
                assert!(message.contains("Invalid API Key"));
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_message_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "NOTOK",
                "result": "Max rate limit reached"
            })))
            .mount(&server)
            .await;

        let err = observer(&server)
            .check(Currency::Eth, Decimal::new(1, 1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::ExternalService(ExternalServiceError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_transaction_is_skipped() {
        let server = MockServer::start().await;
        let mut failed = transfer("100000000000000000", 20, None);
        failed["isError"] = json!("1");
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok(vec![failed])))
            .mount(&server)
            .await;

        let since = Utc::now() - ChronoDuration::minutes(5);
        let observation = observer(&server)
            .check(Currency::Eth, Decimal::new(1, 1), since)
            .await
            .unwrap();
        assert!(!observation.found);
    }

    #[tokio::test]
    async fn test_btc_is_not_supported() {
        let server = MockServer::start().await;
        let err = observer(&server)
            .check(Currency::Btc, Decimal::ONE, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotSupported(_)));
    }
}

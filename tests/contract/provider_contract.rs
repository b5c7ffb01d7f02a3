//! Contract tests for the Polygon provider adapters
//!
//! The REST adapter runs against an in-process HTTP fake routed by URL; the
//! trade feed runs against a real WebSocket server bound to localhost.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use time::macros::date;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use tickvault_core::{
    HttpClient, HttpError, HttpRequest, HttpResponse, PolygonAdapter, PolygonStream,
    ProviderConfig, ProviderErrorKind, ReferenceDataProvider, RequestThrottle, RetryConfig,
    TradeFeed,
};

const DETAILS_AAPL: &str = r#"{
  "request_id": "31d59dda-80e5-4721-8496-d0d32a654afe",
  "status": "OK",
  "results": {
    "ticker": "AAPL",
    "name": "Apple Inc.",
    "market": "stocks",
    "active": true,
    "primary_exchange": "XNAS",
    "list_date": "1980-12-12",
    "cik": "0000320193",
    "address": {"address1": "One Apple Park Way", "city": "Cupertino", "state": "CA", "postal_code": "95014"},
    "branding": {"logo_url": "https://api.polygon.io/v1/reference/company-branding/logo.svg"},
    "total_employees": 154000,
    "weighted_shares_outstanding": 16319441000
  }
}"#;

// =============================================================================
// HTTP fake
// =============================================================================

/// Answers by URL path; records every request.
#[derive(Default)]
struct RoutedHttpClient {
    routes: Vec<(&'static str, u16, &'static str)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RoutedHttpClient {
    fn route(mut self, path: &'static str, status: u16, body: &'static str) -> Self {
        self.routes.push((path, status, body));
        self
    }

    fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("request log lock")
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }
}

impl HttpClient for RoutedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let path = request
            .url
            .trim_start_matches("https://polygon.test")
            .split('?')
            .next()
            .unwrap_or_default()
            .to_owned();
        self.requests.lock().expect("request log lock").push(request);

        let response = self
            .routes
            .iter()
            .find(|(route, _, _)| *route == path)
            .map(|(_, status, body)| HttpResponse::new(*status, *body))
            .ok_or_else(|| HttpError::non_retryable(format!("no route for {path}")));
        Box::pin(async move { response })
    }
}

fn rest_config() -> ProviderConfig {
    ProviderConfig {
        rest_url: String::from("https://polygon.test"),
        ..ProviderConfig::new("contract-key")
    }
}

fn provider(client: Arc<RoutedHttpClient>, retry: RetryConfig) -> Arc<dyn ReferenceDataProvider> {
    Arc::new(
        PolygonAdapter::with_http_client(client, &rest_config())
            .with_retry(retry)
            .with_throttle(RequestThrottle::unlimited()),
    )
}

// =============================================================================
// Reference Data Contract
// =============================================================================

#[tokio::test]
async fn when_listing_then_detailing_records_carry_nested_groups() {
    // Given: A listing of one ticker and its detail document
    let client = Arc::new(
        RoutedHttpClient::default()
            .route("/v3/reference/tickers", 200, r#"{"results":[{"ticker":"AAPL","market":"stocks"}],"status":"OK"}"#)
            .route("/v3/reference/tickers/AAPL", 200, DETAILS_AAPL),
    );
    let provider = provider(client.clone(), RetryConfig::no_retry());

    // When: The universe is listed and each ticker detailed
    let day = date!(2021 - 01 - 04);
    let universe = provider
        .list_tickers(day, "stocks", 1000)
        .await
        .expect("listing succeeds");
    let record = provider
        .ticker_details(&universe[0].ticker, day)
        .await
        .expect("details succeed");

    // Then: Nested address and branding fields land in their columns
    let row = record.to_row();
    assert_eq!(row[0], "AAPL");
    assert_eq!(row[3], "true");
    assert_eq!(row[4], "Apple Inc.");
    assert_eq!(row[12], "Cupertino");
    assert_eq!(record.total_employees, Some(154_000));
    assert_eq!(
        client.urls(),
        vec![
            String::from("https://polygon.test/v3/reference/tickers?date=2021-01-04&market=stocks&limit=1000"),
            String::from("https://polygon.test/v3/reference/tickers/AAPL?date=2021-01-04"),
        ]
    );
}

#[tokio::test]
async fn when_details_have_no_results_the_ticker_is_not_found() {
    let client = Arc::new(RoutedHttpClient::default().route(
        "/v3/reference/tickers/GONE",
        200,
        r#"{"status":"OK","request_id":"x"}"#,
    ));

    let error = provider(client, RetryConfig::no_retry())
        .ticker_details("GONE", date!(2021 - 01 - 04))
        .await
        .expect_err("missing results");

    assert!(error.is_not_found());
    assert_eq!(error.code(), "provider.not_found");
}

#[tokio::test]
async fn when_status_fails_the_error_kind_follows_the_status() {
    let cases = [
        ("/v3/reference/tickers/A", 401, ProviderErrorKind::Unauthorized, false),
        ("/v3/reference/tickers/B", 403, ProviderErrorKind::Unauthorized, false),
        ("/v3/reference/tickers/C", 404, ProviderErrorKind::NotFound, false),
        ("/v3/reference/tickers/D", 429, ProviderErrorKind::RateLimited, true),
        ("/v3/reference/tickers/E", 503, ProviderErrorKind::Unavailable, true),
        ("/v3/reference/tickers/F", 418, ProviderErrorKind::Internal, false),
    ];
    let client = cases
        .iter()
        .fold(RoutedHttpClient::default(), |client, (path, status, _, _)| {
            client.route(*path, *status, "{}")
        });
    let provider = provider(Arc::new(client), RetryConfig::no_retry());

    for (path, status, kind, retryable) in cases {
        let ticker = path.rsplit('/').next().unwrap_or_default();
        let error = provider
            .ticker_details(ticker, date!(2021 - 01 - 04))
            .await
            .expect_err("status must fail");
        assert_eq!(error.kind(), kind, "status {status}");
        assert_eq!(error.retryable(), retryable, "status {status}");
    }
}

#[tokio::test]
async fn when_rate_limited_past_the_retry_budget_the_last_status_is_reported() {
    let client = Arc::new(RoutedHttpClient::default().route("/v3/reference/tickers", 429, "{}"));
    let provider = provider(client.clone(), RetryConfig::fixed(Duration::ZERO, 2));

    let error = provider
        .list_tickers(date!(2021 - 01 - 04), "stocks", 1000)
        .await
        .expect_err("rate limit persists");

    assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
    assert_eq!(client.urls().len(), 3);
}

// =============================================================================
// Trade History Contract
// =============================================================================

#[tokio::test]
async fn when_trades_are_listed_rest_fields_map_onto_trade_rows() {
    // Given: One page of historical trades for AAPL
    let client = Arc::new(RoutedHttpClient::default().route(
        "/v3/trades/AAPL",
        200,
        r#"{"results":[{"conditions":[12,37],"correction":1,"exchange":11,"id":"52983525029461","participant_timestamp":1609770600000000000,"price":131.9,"sequence_number":1063,"sip_timestamp":1609770600001000000,"size":100,"tape":3,"trf_id":201,"trf_timestamp":1609770600000500000}],"status":"OK"}"#,
    ));
    let provider = provider(client.clone(), RetryConfig::no_retry());

    // When: The day's trades are listed
    let trades = provider
        .list_trades("AAPL", date!(2021 - 01 - 04))
        .await
        .expect("trades succeed");

    // Then: Every REST field lands in its archive column
    assert_eq!(
        trades[0].to_row().join("|"),
        "AAPL|12,37|1|11|52983525029461|1609770600000000000|131.9|1063|1609770600001000000|100|3|201|1609770600000500000"
    );
    assert_eq!(
        client.urls(),
        vec![String::from("https://polygon.test/v3/trades/AAPL?timestamp=2021-01-04&limit=50000")]
    );
}

#[tokio::test]
async fn when_a_ticker_has_no_trade_history_it_is_not_found() {
    let client = Arc::new(RoutedHttpClient::default().route("/v3/trades/ZVZZT", 404, "{}"));

    let error = provider(client, RetryConfig::no_retry())
        .list_trades("ZVZZT", date!(2021 - 01 - 04))
        .await
        .expect_err("no history");

    assert!(error.is_not_found());
}

// =============================================================================
// Trade Feed Contract
// =============================================================================

/// Serves one WebSocket session: reads auth, answers `auth_reply`, reads the
/// subscription, pushes `frames`, then closes. Returns the control messages.
async fn serve_once(
    auth_reply: &'static str,
    frames: Vec<&'static str>,
) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = accept_async(stream).await.expect("handshake");
        let mut controls = Vec::new();

        let auth = socket.next().await.expect("auth frame").expect("auth read");
        controls.push(auth.into_text().expect("auth text").as_str().to_owned());
        socket.send(Message::text(auth_reply)).await.expect("auth reply");

        if auth_reply.contains("auth_success") {
            let subscribe = socket.next().await.expect("subscribe frame").expect("subscribe read");
            controls.push(subscribe.into_text().expect("subscribe text").as_str().to_owned());
            for frame in frames {
                socket.send(Message::text(frame)).await.expect("frame");
            }
        }
        let _ = socket.close(None).await;
        controls
    });

    (format!("ws://{address}"), server)
}

fn feed(url: String) -> PolygonStream {
    PolygonStream::new(&ProviderConfig {
        stream_url: url,
        ..ProviderConfig::new("contract-key")
    })
}

#[tokio::test]
async fn when_subscribed_trade_frames_arrive_as_batches() {
    // Given: A server that authenticates and pushes mixed frames
    let (url, server) = serve_once(
        r#"[{"ev":"status","status":"connected","message":"Connected Successfully"},{"ev":"status","status":"auth_success","message":"authenticated"}]"#,
        vec![
            r#"[{"ev":"status","status":"success","message":"subscribed to: T.*"}]"#,
            r#"[{"ev":"T","sym":"AAPL","x":4,"i":"1","z":3,"p":132.05,"s":100,"c":[0,12],"t":1609770600123,"q":1}]"#,
            "not json",
            r#"[{"ev":"T","sym":"ZVZZT","p":10.0,"s":1},{"ev":"Q","sym":"MSFT"},{"ev":"T","sym":"MSFT","p":222.42,"s":5}]"#,
        ],
    )
    .await;
    let feed = feed(url);

    // When: The feed is subscribed and drained
    let batches = feed
        .subscribe("T.*")
        .await
        .expect("subscription succeeds")
        .collect::<Vec<_>>()
        .await;

    // Then: Status frames and malformed frames produce no batches
    let symbols = batches
        .into_iter()
        .map(|batch| {
            batch
                .expect("batch ok")
                .into_iter()
                .map(|trade| trade.symbol)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    assert_eq!(
        symbols,
        vec![
            vec![String::from("AAPL")],
            vec![String::from("ZVZZT"), String::from("MSFT")],
        ]
    );

    let controls = server.await.expect("server task");
    assert_eq!(controls[0], r#"{"action":"auth","params":"contract-key"}"#);
    assert_eq!(controls[1], r#"{"action":"subscribe","params":"T.*"}"#);
}

#[tokio::test]
async fn when_credentials_are_rejected_subscribe_is_unauthorized() {
    let (url, server) = serve_once(
        r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#,
        Vec::new(),
    )
    .await;

    let error = match feed(url).subscribe("T.*").await {
        Ok(_) => panic!("auth must fail"),
        Err(error) => error,
    };

    assert_eq!(error.kind(), ProviderErrorKind::Unauthorized);
    assert!(error.message().contains("authentication failed"));
    assert_eq!(server.await.expect("server task").len(), 1);
}

#[tokio::test]
async fn when_nothing_listens_subscribe_is_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    drop(listener);

    let error = match feed(format!("ws://{address}")).subscribe("T.*").await {
        Ok(_) => panic!("connect must fail"),
        Err(error) => error,
    };

    assert_eq!(error.kind(), ProviderErrorKind::Unavailable);
    assert!(error.retryable());
}

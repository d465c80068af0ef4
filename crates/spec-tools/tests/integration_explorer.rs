//! End-to-end exercise of the public surface: fetch -> cache/index -> query.
//!
//! Uses an in-process fetcher and a manual clock, so no network or wall-clock sleeps
//! are involved.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use unrelated_spec_tools::cache::{Clock, SpecCache};
use unrelated_spec_tools::config::SpecSourceConfig;
use unrelated_spec_tools::error::Result;
use unrelated_spec_tools::fetch::{FetchedSpec, SpecFetcher};
use unrelated_spec_tools::query::{EndpointFilter, SchemaFilter, SpecExplorer};

const SPEC: &str = r#"
openapi: "3.0.0"
info:
  title: Orders API
  version: "2.1"
paths:
  /orders:
    get:
      operationId: listOrders
      summary: List orders
      tags: [orders]
    post:
      operationId: createOrder
      summary: Place an order
      tags: [orders]
      requestBody:
        content:
          application/json:
            schema: { $ref: '#/components/schemas/Order' }
  /orders/{orderId}:
    get:
      operationId: getOrder
      summary: Fetch one order
      tags: [orders]
  /health:
    get:
      operationId: health
      summary: Liveness probe
components:
  schemas:
    Order:
      type: object
      description: One placed order.
      properties:
        id: { type: string }
        lines:
          type: array
          items: { $ref: '#/components/schemas/OrderLine' }
    OrderLine:
      type: object
      properties:
        sku: { type: string }
        quantity: { type: integer }
"#;

struct ManualClock(Mutex<Instant>);

impl ManualClock {
    fn starting_now() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Instant::now())))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

struct ToggleFetcher {
    hits: AtomicUsize,
    fail: AtomicBool,
}

impl ToggleFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            hits: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SpecFetcher for ToggleFetcher {
    async fn fetch(&self) -> Result<FetchedSpec> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(unrelated_spec_tools::error::SpecToolsError::SpecFetch {
                url: "http://test/orders.yaml".to_string(),
                message: "network unreachable".to_string(),
            });
        }
        Ok(FetchedSpec {
            body: SPEC.to_string(),
            content_type: Some("application/yaml".to_string()),
        })
    }
}

fn setup() -> (Arc<ToggleFetcher>, Arc<ManualClock>, SpecExplorer) {
    let mut config = SpecSourceConfig::new("http://test/orders.yaml");
    config.ttl_secs = 120;
    let fetcher = ToggleFetcher::new();
    let clock = ManualClock::starting_now();
    let cache = Arc::new(SpecCache::with_clock(
        &config,
        fetcher.clone(),
        clock.clone(),
    ));
    (fetcher, clock, SpecExplorer::new(cache))
}

#[tokio::test]
async fn search_then_detail_roundtrip() {
    let (fetcher, _clock, explorer) = setup();

    let page = explorer
        .search_endpoints(&EndpointFilter {
            tags: Some(vec!["orders".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.endpoints[0].operation_id.as_deref(), Some("listOrders"));

    let details = explorer
        .endpoint_details("/orders", "post", true)
        .await
        .unwrap();
    let schema = &details.endpoint["requestBody"]["content"]["application/json"]["schema"];
    assert_eq!(
        schema["properties"]["lines"]["items"]["properties"]["sku"],
        json!({ "type": "string" })
    );

    let schemas = explorer
        .search_schemas(&SchemaFilter {
            property_name: Some("sku".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(schemas.schemas.len(), 1);
    assert_eq!(schemas.schemas[0].name, "OrderLine");

    // Everything above rode on a single fetch.
    assert_eq!(fetcher.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_cache_survives_failed_refresh() {
    let (fetcher, clock, explorer) = setup();

    let before = explorer
        .schema_details("Order", true, 5)
        .await
        .unwrap();
    assert_eq!(
        before.schema["properties"]["lines"]["items"]["properties"]["quantity"],
        json!({ "type": "integer" })
    );

    // TTL expires and the upstream goes away; queries keep answering from the
    // stale document.
    fetcher.fail.store(true, Ordering::SeqCst);
    clock.advance(Duration::from_secs(121));

    let after = explorer.schema_details("Order", true, 5).await.unwrap();
    assert_eq!(after.schema, before.schema);
    assert_eq!(fetcher.hits.load(Ordering::SeqCst), 2);

    let section = explorer
        .spec_section(Some("paths"), Some("^/orders$"))
        .await
        .unwrap();
    let keys: Vec<&str> = section.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["/orders"]);
}

#[tokio::test]
async fn spec_section_full_document() {
    let (_fetcher, _clock, explorer) = setup();

    let full = explorer.spec_section(None, None).await.unwrap();
    assert_eq!(full["info"]["title"], json!("Orders API"));
    assert_eq!(full["paths"].as_object().unwrap().len(), 3);
}

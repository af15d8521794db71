use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use metrics::MetricsHandle;
use serde_json::{json, Value};
use storage::Store;
use tower::ServiceExt;
use uuid::Uuid;

use crate::api::{route_label, router, AppState};
use crate::config::{Config, PersistenceMode, DEFAULT_CORS_ORIGIN};

fn config(mode: PersistenceMode, cors_origins: &[&str]) -> Config {
    Config {
        bind: "127.0.0.1:8000".parse().unwrap(),
        metrics_addr: "127.0.0.1:9109".parse().unwrap(),
        app_name: "Biz Analysis API".into(),
        cors_origins: cors_origins.iter().map(|o| o.to_string()).collect(),
        mode,
        database: None,
    }
}

async fn app_with_store() -> (Router, MetricsHandle) {
    let store = Store::connect("sqlite::memory:", Duration::from_secs(5))
        .await
        .expect("memory store should open");
    let metrics = MetricsHandle::new().expect("metrics");
    let app = router(AppState::new(
        config(PersistenceMode::Local, &[DEFAULT_CORS_ORIGIN]),
        Some(store),
        metrics.clone(),
    ));
    (app, metrics)
}

fn app_without_store() -> Router {
    router(AppState::new(
        config(PersistenceMode::Disabled, &[DEFAULT_CORS_ORIGIN]),
        None,
        MetricsHandle::new().expect("metrics"),
    ))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("body bytes");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

fn error_fields(body: &Value) -> Vec<String> {
    body["fields"]
        .as_array()
        .expect("fields array")
        .iter()
        .map(|f| f["field"].as_str().expect("field name").to_string())
        .collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app_without_store(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn bcg_classifies_products() {
    let (status, body) = send(
        &app_without_store(),
        Method::POST,
        "/bcg",
        Some(json!([
            {"name": "A", "market_share": 0.4, "largest_rival_share": 0.2, "market_growth_rate": 15},
            {"name": "B", "market_share": 0.1, "largest_rival_share": 0.0, "market_growth_rate": -4}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body[0],
        json!({"name": "A", "rms": 2.0, "growth": 15.0, "quadrant": "Star"})
    );
    assert_eq!(body[1]["quadrant"], "Cash Cow");
}

#[tokio::test]
async fn bcg_rejects_out_of_range_and_malformed_input() {
    let app = app_without_store();
    let (status, body) = send(
        &app,
        Method::POST,
        "/bcg",
        Some(json!([
            {"name": "A", "market_share": 1.4, "largest_rival_share": 0.2, "market_growth_rate": 5}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(error_fields(&body), ["[0].market_share"]);

    let (status, body) = send(
        &app,
        Method::POST,
        "/bcg",
        Some(json!([{"name": "A", "market_share": "lots"}])),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_fields(&body), ["body"]);
}

#[tokio::test]
async fn swot_is_passed_through() {
    let input = json!({
        "strengths": ["brand"],
        "weaknesses": [],
        "opportunities": ["exports"],
        "threats": ["tariffs"]
    });
    let (status, body) =
        send(&app_without_store(), Method::POST, "/swot", Some(input.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, input);
}

#[tokio::test]
async fn porter_scores_and_echoes_forces() {
    let app = app_without_store();
    let (status, body) = send(&app, Method::POST, "/porter", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"per_force": {}, "overall": 0.0}));

    let (_, body) = send(
        &app,
        Method::POST,
        "/porter",
        Some(json!({"supplier": 4, "buyer": 4, "rivalry": 4, "substitutes": 4, "new_entrants": 4, "esg": 9})),
    )
    .await;
    assert_eq!(body["overall"], 4.0);
    assert_eq!(body["per_force"]["esg"], 9.0);

    let (status, _) = send(&app, Method::POST, "/porter", Some(json!({"buyer": "high"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn suggest_swot_uses_heuristics() {
    let (status, body) = send(
        &app_without_store(),
        Method::POST,
        "/ai/suggest-swot",
        Some(json!({
            "company": "Acme",
            "industry": "logistics",
            "markets": [{"name": "EU", "growth_rate": 12}],
            "products": [{"name": "Freight", "market_share": 0.1, "largest_rival_share": 0.4}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["strengths"], json!(["Brand equity for Acme"]));
    assert_eq!(body["weaknesses"], json!(["Low relative share: Freight"]));
    assert_eq!(
        body["opportunities"],
        json!([
            "High growth market tailwinds",
            "Evolving logistics customer needs"
        ])
    );
    assert_eq!(body["threats"], json!(["Intense competition in logistics"]));
}

#[tokio::test]
async fn snapshot_create_fetch_and_list() {
    let (app, _) = app_with_store().await;
    let payload = json!({"points": [{"name": "A", "rms": 2.0, "growth": 15, "quadrant": "Star"}]});

    let (status, created) = send(
        &app,
        Method::POST,
        "/snapshots",
        Some(json!({"kind": "BCG", "payload": payload})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("generated id").to_string();
    assert!(created["created_at"].is_string());
    assert_eq!(created["note"], Value::Null);

    let (status, fetched) = send(&app, Method::GET, &format!("/snapshots/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["kind"], "BCG");
    assert_eq!(fetched["payload"], payload);
    assert_eq!(fetched, created);

    let (status, swot) = send(&app, Method::GET, "/snapshots?kind=SWOT", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(swot, json!([]));

    let (_, all) = send(&app, Method::GET, "/snapshots?limit=500", None).await;
    assert_eq!(all.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn snapshot_errors_are_distinct() {
    let (app, _) = app_with_store().await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/snapshots/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(&app, Method::GET, "/snapshots/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_fields(&body), ["path"]);

    let (status, _) = send(
        &app,
        Method::POST,
        "/snapshots",
        Some(json!({"kind": "MOAT", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &app,
        Method::POST,
        "/snapshots",
        Some(json!({"kind": "SWOT", "payload": ["not", "an", "object"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, Method::GET, "/snapshots?kind=moat", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_fields(&body), ["query"]);
}

#[tokio::test]
async fn crud_endpoints_link_companies_markets_and_products() {
    let (app, _) = app_with_store().await;

    let (status, acme) = send(
        &app,
        Method::POST,
        "/companies",
        Some(json!({"name": "Acme", "industry": "retail"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    send(&app, Method::POST, "/companies", Some(json!({"name": "Beta"}))).await;
    let acme_id = acme["id"].as_str().expect("company id").to_string();

    let (_, companies) = send(&app, Method::GET, "/companies", None).await;
    let names: Vec<_> = companies
        .as_array()
        .expect("list")
        .iter()
        .map(|c| c["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, ["Acme", "Beta"]);

    let (status, markets) = send(
        &app,
        Method::POST,
        "/markets/bulk",
        Some(json!([
            {"company_id": acme_id, "name": "Online", "growth_rate": 18.5, "size": 1200.0},
            {"name": "Wholesale", "growth_rate": -3}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(markets.as_array().map(Vec::len), Some(2));
    let online_id = markets[0]["id"].as_str().expect("market id").to_string();

    let (_, acme_markets) =
        send(&app, Method::GET, &format!("/markets?company_id={acme_id}"), None).await;
    assert_eq!(acme_markets.as_array().map(Vec::len), Some(1));
    assert_eq!(acme_markets[0]["name"], "Online");

    let (status, products) = send(
        &app,
        Method::POST,
        "/products/bulk",
        Some(json!([
            {"market_id": online_id, "company_id": acme_id, "name": "Widget", "market_share": 0.3, "largest_rival_share": 0.2},
            {"name": "Loose", "price": 2.5}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(products[1]["market_share"], Value::Null);

    let (_, filtered) =
        send(&app, Method::GET, &format!("/products?market_id={online_id}"), None).await;
    assert_eq!(filtered.as_array().map(Vec::len), Some(1));
    assert_eq!(filtered[0]["name"], "Widget");

    let product_id = filtered[0]["id"].as_str().expect("product id").to_string();
    let (status, fetched) =
        send(&app, Method::GET, &format!("/products/{product_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["company_id"], acme_id.as_str());

    let (status, _) = send(
        &app,
        Method::POST,
        "/products",
        Some(json!({"name": "Bad", "largest_rival_share": 3.0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn storage_failures_are_generic_and_counted() {
    let (app, metrics) = app_with_store().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/markets",
        Some(json!({"company_id": Uuid::new_v4(), "name": "Orphan", "growth_rate": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "internal_error"}));

    let (_, markets) = send(&app, Method::GET, "/markets", None).await;
    assert_eq!(markets, json!([]));

    let (_, exposition) = metrics.render().expect("render");
    let text = String::from_utf8(exposition).expect("utf8");
    assert!(text.contains("bizanalysis_storage_failures_total 1"));
    assert!(text.contains("route=\"/markets\""));
}

#[tokio::test]
async fn disabled_persistence_answers_unavailable() {
    let app = app_without_store();

    let (status, body) = send(
        &app,
        Method::POST,
        "/snapshots",
        Some(json!({"kind": "SWOT", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "persistence_unavailable");

    for uri in ["/snapshots", "/companies", "/markets", "/products"] {
        let (status, _) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }

    let id = Uuid::new_v4();
    for entity in ["snapshots", "companies", "markets", "products"] {
        let uri = format!("/{entity}/{id}");
        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(body["error"], "persistence_unavailable");
    }

    let (status, _) = send(
        &app,
        Method::POST,
        "/markets/bulk",
        Some(json!([{"name": "EU", "growth_rate": 2}])),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(
        &app,
        Method::POST,
        "/products/bulk",
        Some(json!([{"name": "Widget"}])),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, Method::GET, "/db-status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"configured": false, "mode": "disabled", "backend": null, "reachable": false})
    );
}

#[tokio::test]
async fn db_status_pings_configured_store() {
    let (app, _) = app_with_store().await;
    let (_, body) = send(&app, Method::GET, "/db-status", None).await;
    assert_eq!(
        body,
        json!({"configured": true, "mode": "local", "backend": "sqlite", "reachable": true})
    );
}

#[tokio::test]
async fn cors_allows_only_listed_origins() {
    let app = router(AppState::new(
        config(
            PersistenceMode::Disabled,
            &["http://localhost:5173", "https://biz-*.vercel.app"],
        ),
        None,
        MetricsHandle::new().expect("metrics"),
    ));

    for (origin, allowed) in [
        ("http://localhost:5173", true),
        ("https://biz-preview-42.vercel.app", true),
        ("https://evil.example", false),
    ] {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/bcg")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let echoed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap_or_default().to_string());
        if allowed {
            assert_eq!(echoed.as_deref(), Some(origin));
        } else {
            assert_eq!(echoed, None, "{origin} should not be allowed");
        }
    }
}

#[tokio::test]
async fn companies_and_markets_fetch_by_id() {
    let (app, _) = app_with_store().await;

    let (_, company) = send(
        &app,
        Method::POST,
        "/companies",
        Some(json!({"name": "Acme", "region": "EU"})),
    )
    .await;
    let company_id = company["id"].as_str().expect("company id").to_string();
    let (status, fetched) =
        send(&app, Method::GET, &format!("/companies/{company_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, company);
    assert_eq!(fetched["industry"], Value::Null);

    let (status, market) = send(
        &app,
        Method::POST,
        "/markets",
        Some(json!({"company_id": company_id, "name": "Online", "growth_rate": 7.5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let market_id = market["id"].as_str().expect("market id").to_string();
    let (status, fetched) = send(&app, Method::GET, &format!("/markets/{market_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, market);
    assert_eq!(fetched["size"], Value::Null);

    for entity in ["companies", "markets", "products"] {
        let uri = format!("/{entity}/{}", Uuid::new_v4());
        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "not_found");
    }
}

#[tokio::test]
async fn products_without_figures_list_with_nulls() {
    let (app, _) = app_with_store().await;
    let (status, _) = send(&app, Method::POST, "/products", Some(json!({"name": "Sketch"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, products) = send(&app, Method::GET, "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(products.as_array().map(Vec::len), Some(1));
    for field in ["market_share", "largest_rival_share", "price", "revenue", "market_id"] {
        assert_eq!(products[0][field], Value::Null, "{field}");
    }
}

#[tokio::test]
async fn snapshot_payload_numbers_are_returned_verbatim() {
    let (app, _) = app_with_store().await;
    let payload: Value =
        serde_json::from_str(r#"{"id": 123456789012345678901234567890, "share": 0.30}"#)
            .expect("payload");

    let (status, created) = send(
        &app,
        Method::POST,
        "/snapshots",
        Some(json!({"kind": "PORTER", "payload": payload})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().expect("id").to_string();

    let (_, fetched) = send(&app, Method::GET, &format!("/snapshots/{id}"), None).await;
    assert_eq!(fetched["payload"], payload);
    assert_eq!(
        fetched["payload"]["id"].to_string(),
        "123456789012345678901234567890"
    );
}

#[tokio::test]
async fn unmatched_requests_use_a_fixed_route_label() {
    assert_eq!(route_label(None), "unmatched");

    let (app, metrics) = app_with_store().await;
    let (status, _) = send(&app, Method::GET, "/no/such/path", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    send(&app, Method::GET, "/health", None).await;

    let (_, exposition) = metrics.render().expect("render");
    let text = String::from_utf8(exposition).expect("utf8");
    assert!(text.contains("route=\"/health\""));
    assert!(!text.contains("/no/such/path"));
}

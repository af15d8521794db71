use std::sync::Arc;

use analysis::{
    build_swot, classify_bcg, forces_index, suggest_swot, BcgPoint, ForceIntensities, ForcesScore,
    ProductInput, SuggestSwotRequest, Swot,
};
use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        MatchedPath, Path, Query, State,
    },
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use metrics::MetricsHandle;
use serde::Serialize;
use serde_json::{json, Value};
use storage::{
    AnalysisSnapshot, Backend, Company, CompanyFilter, Market, MarketFilter, NewCompany,
    NewMarket, NewProduct, NewSnapshot, Product, ProductFilter, SnapshotFilter, Store,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, PersistenceMode};
use crate::cors::cors_layer;
use crate::error::{ApiError, ApiResult, StorageFailure};
use crate::extract::ValidJson;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: MetricsHandle,
    store: Option<Store>,
}

impl AppState {
    pub fn new(config: Config, store: Option<Store>, metrics: MetricsHandle) -> Self {
        Self {
            config: Arc::new(config),
            metrics,
            store,
        }
    }

    fn store(&self) -> ApiResult<&Store> {
        self.store.as_ref().ok_or(ApiError::Unavailable)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/db-status", get(db_status))
        .route("/bcg", post(bcg))
        .route("/swot", post(swot))
        .route("/porter", post(porter))
        .route("/ai/suggest-swot", post(suggest))
        .route("/snapshots", post(create_snapshot).get(list_snapshots))
        .route("/snapshots/:id", get(get_snapshot))
        .route("/companies", post(create_company).get(list_companies))
        .route("/companies/:id", get(get_company))
        .route("/markets", post(create_market).get(list_markets))
        .route("/markets/bulk", post(create_markets))
        .route("/markets/:id", get(get_market))
        .route("/products", post(create_product).get(list_products))
        .route("/products/bulk", post(create_products))
        .route("/products/:id", get(get_product))
        .route_layer(middleware::from_fn_with_state(state.clone(), record_request))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn record_request<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let route = route_label(req.extensions().get::<MatchedPath>());
    let response = next.run(req).await;
    state
        .metrics
        .record_request(&route, response.status().as_u16());
    if response.extensions().get::<StorageFailure>().is_some() {
        state.metrics.record_storage_failure();
    }
    response
}

const UNMATCHED_ROUTE: &str = "unmatched";

// Requests without a matched route share one series.
pub(crate) fn route_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_owned())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct DbStatus {
    configured: bool,
    mode: PersistenceMode,
    backend: Option<Backend>,
    reachable: bool,
}

async fn db_status(State(state): State<AppState>) -> Json<DbStatus> {
    let mode = state.config.mode;
    let status = match &state.store {
        Some(store) => {
            let reachable = match store.ping().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = ?err, "database ping failed");
                    false
                }
            };
            DbStatus {
                configured: true,
                mode,
                backend: Some(store.backend()),
                reachable,
            }
        }
        None => DbStatus {
            configured: false,
            mode,
            backend: None,
            reachable: false,
        },
    };
    Json(status)
}

async fn bcg(ValidJson(products): ValidJson<Vec<ProductInput>>) -> Json<Vec<BcgPoint>> {
    Json(classify_bcg(&products))
}

async fn swot(ValidJson(body): ValidJson<Swot>) -> Json<Swot> {
    Json(build_swot(body))
}

async fn porter(ValidJson(inputs): ValidJson<ForceIntensities>) -> Json<ForcesScore> {
    Json(forces_index(inputs))
}

async fn suggest(ValidJson(body): ValidJson<SuggestSwotRequest>) -> Json<Swot> {
    Json(suggest_swot(&body))
}

async fn create_snapshot(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewSnapshot>,
) -> ApiResult<(StatusCode, Json<AnalysisSnapshot>)> {
    let snapshot = state.store()?.create_snapshot(&body).await?;
    info!(id = %snapshot.id, kind = %snapshot.kind, "snapshot stored");
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_snapshots(
    State(state): State<AppState>,
    query: Result<Query<SnapshotFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<AnalysisSnapshot>>> {
    let Query(filter) = query?;
    Ok(Json(state.store()?.list_snapshots(&filter).await?))
}

async fn get_snapshot(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<AnalysisSnapshot>> {
    let Path(id) = path?;
    state
        .store()?
        .get_snapshot(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            entity: "snapshot",
            id,
        })
}

async fn create_company(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewCompany>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    let company = state.store()?.create_company(&body).await?;
    info!(id = %company.id, "company stored");
    Ok((StatusCode::CREATED, Json(company)))
}

async fn list_companies(
    State(state): State<AppState>,
    query: Result<Query<CompanyFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Company>>> {
    let Query(filter) = query?;
    Ok(Json(state.store()?.list_companies(&filter).await?))
}

async fn get_company(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Company>> {
    let Path(id) = path?;
    state
        .store()?
        .get_company(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            entity: "company",
            id,
        })
}

async fn create_market(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewMarket>,
) -> ApiResult<(StatusCode, Json<Market>)> {
    let market = state.store()?.create_market(&body).await?;
    Ok((StatusCode::CREATED, Json(market)))
}

async fn create_markets(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<Vec<NewMarket>>,
) -> ApiResult<(StatusCode, Json<Vec<Market>>)> {
    let markets = state.store()?.create_markets(&body).await?;
    info!(count = markets.len(), "markets stored");
    Ok((StatusCode::CREATED, Json(markets)))
}

async fn list_markets(
    State(state): State<AppState>,
    query: Result<Query<MarketFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Market>>> {
    let Query(filter) = query?;
    Ok(Json(state.store()?.list_markets(&filter).await?))
}

async fn get_market(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Market>> {
    let Path(id) = path?;
    state
        .store()?
        .get_market(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            entity: "market",
            id,
        })
}

async fn create_product(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = state.store()?.create_product(&body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn create_products(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<Vec<NewProduct>>,
) -> ApiResult<(StatusCode, Json<Vec<Product>>)> {
    let products = state.store()?.create_products(&body).await?;
    info!(count = products.len(), "products stored");
    Ok((StatusCode::CREATED, Json(products)))
}

async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ProductFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Product>>> {
    let Query(filter) = query?;
    Ok(Json(state.store()?.list_products(&filter).await?))
}

async fn get_product(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Product>> {
    let Path(id) = path?;
    state
        .store()?
        .get_product(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            entity: "product",
            id,
        })
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::db::{Store, StoreError};

type Reply = (StatusCode, Json<Value>);

/// Read-only routes over the store.
pub fn router(store: Store) -> Router {
    Router::new()
        .route("/:model/:year/summary", get(summary))
        .route("/:model/:year/data", get(car_data))
        .route("/cars", get(cars))
        .route("/suggestions/:query", get(suggestions))
        .route("/all_cars", get(all_cars))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn serve(store: Store, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Serving read API");
    axum::serve(listener, router(store)).await?;
    Ok(())
}

/// Run a store read off the async runtime and shape the result.
async fn read<T, F, R>(store: Store, op: F, respond: R) -> Reply
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    R: FnOnce(T) -> Reply,
{
    match tokio::task::spawn_blocking(move || op(&store)).await {
        Ok(Ok(value)) => respond(value),
        Ok(Err(e)) => {
            error!(op = e.op(), error = %e, "Store read failed");
            internal_error(e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Store read task panicked");
            internal_error(e.to_string())
        }
    }
}

fn bad_request(message: String) -> Reply {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn parse_year(raw: &str) -> Result<i32, Reply> {
    raw.trim()
        .parse()
        .map_err(|_| bad_request(format!("invalid year {raw:?}")))
}

fn internal_error(message: String) -> Reply {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message })))
}

pub async fn summary(State(store): State<Store>, Path((model, year)): Path<(String, String)>) -> Reply {
    let year = match parse_year(&year) {
        Ok(y) => y,
        Err(reply) => return reply,
    };
    let lookup = model.clone();
    read(store, move |s| s.get_summary(&lookup, year), |found| match found {
        Some(text) => (StatusCode::OK, Json(json!({ "summary": text }))),
        None => bad_request(format!("no summary for {model} {year}")),
    })
    .await
}

pub async fn car_data(State(store): State<Store>, Path((model, year)): Path<(String, String)>) -> Reply {
    let year = match parse_year(&year) {
        Ok(y) => y,
        Err(reply) => return reply,
    };
    read(store, move |s| s.get_vehicle_spec(&model, year), |found| {
        let rows: Vec<_> = found.into_iter().collect();
        (StatusCode::OK, Json(json!({ "car_data": rows })))
    })
    .await
}

pub async fn cars(State(store): State<Store>) -> Reply {
    read(store, |s| s.list_distinct_models_and_years(), |(models, years)| {
        (StatusCode::OK, Json(json!({ "models": models, "years": years })))
    })
    .await
}

pub async fn suggestions(State(store): State<Store>, Path(query): Path<String>) -> Reply {
    read(store, move |s| s.search_by_model_substring(&query), |keys| {
        let pairs: Vec<(String, i32)> = keys.into_iter().map(|k| (k.model, k.year)).collect();
        (StatusCode::OK, Json(json!({ "suggestions": pairs })))
    })
    .await
}

pub async fn all_cars(State(store): State<Store>) -> Reply {
    read(store, |s| s.list_all_vehicles(), |vehicles| {
        (StatusCode::OK, Json(json!({ "all_cars": vehicles })))
    })
    .await
}

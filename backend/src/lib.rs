pub mod aggregate;
pub mod config;
pub mod error;
pub mod geo;
pub mod parser;
pub mod source;
pub mod speed;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use shared::{ApiError, InitialCoordinates, Track};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::aggregate::{AggregateError, PagePolicy, TraceAggregate};
use crate::error::TraceError;
use crate::geo::{BoundingBox, GeoError, SAMPLE_BBOX};
use crate::source::{SourceError, TraceSource};
use crate::storage::{StorageError, StoredTrack, TrackStore};

/// Shared handler state. The trace source is injected so tests can swap in
/// a static one.
pub struct AppState<S> {
    pub source: Arc<S>,
    pub max_pages: u32,
    pub store: Option<Arc<TrackStore>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            max_pages: self.max_pages,
            store: self.store.clone(),
        }
    }
}

impl<S: TraceSource> AppState<S> {
    pub fn new(source: S, max_pages: u32) -> Self {
        Self {
            source: Arc::new(source),
            max_pages,
            store: None,
        }
    }

    pub fn with_store(self, store: TrackStore) -> Self {
        Self {
            store: Some(Arc::new(store)),
            ..self
        }
    }
}

pub fn create_router<S: TraceSource + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(initial_coordinates_handler))
        .route("/gpx", get(gpx_handler::<S>))
        .route("/gpx/stored", get(stored_gpx_handler::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query string of the `/gpx` routes. Leaving out all four bounds selects
/// the sample area.
#[derive(Debug, Default, Deserialize)]
pub struct BboxQuery {
    pub min_lat: Option<f64>,
    pub min_long: Option<f64>,
    pub max_lat: Option<f64>,
    pub max_long: Option<f64>,
    #[serde(default)]
    pub strict: bool,
}

impl BboxQuery {
    pub fn bbox(&self) -> Result<BoundingBox, GeoError> {
        match (self.min_lat, self.min_long, self.max_lat, self.max_long) {
            (None, None, None, None) => Ok(SAMPLE_BBOX),
            (Some(min_lat), Some(min_long), Some(max_lat), Some(max_long)) => {
                let bbox = BoundingBox::new(min_long, min_lat, max_long, max_lat);
                bbox.validate()?;
                Ok(bbox)
            }
            _ => Err(GeoError::Incomplete),
        }
    }
}

async fn initial_coordinates_handler() -> Json<InitialCoordinates> {
    Json(InitialCoordinates {
        initial_coordinates: SAMPLE_BBOX.center(),
    })
}

async fn gpx_handler<S: TraceSource + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<BboxQuery>,
) -> Result<Json<Vec<Track>>, (StatusCode, Json<ApiError>)> {
    let bbox = query.bbox().map_err(|e| api_error(e.into()))?;
    let aggregate = TraceAggregate::fetch(
        state.source.as_ref(),
        bbox,
        state.max_pages,
        PagePolicy::FailFast,
    )
    .await
    .map_err(|e| api_error(e.into()))?;

    Ok(Json(aggregate.into_tracks()))
}

async fn stored_gpx_handler<S: TraceSource + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<BboxQuery>,
) -> Result<Json<Vec<Track>>, (StatusCode, Json<ApiError>)> {
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| api_error(StorageError::NotConfigured.into()))?;
    let bbox = query.bbox().map_err(|e| api_error(e.into()))?;

    let rows = if query.strict {
        store.query_strict(bbox).await
    } else {
        store.query_intersecting(bbox).await
    }
    .map_err(|e| api_error(e.into()))?;

    let tracks = rows
        .iter()
        .map(StoredTrack::track)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(tracks))
}

fn api_error(err: TraceError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        TraceError::BoundingBox(_) => StatusCode::BAD_REQUEST,
        TraceError::Aggregate(AggregateError::Source(SourceError::Unreachable(_))) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        TraceError::Aggregate(_) => StatusCode::BAD_GATEWAY,
        TraceError::Storage(StorageError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
        TraceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("request failed: {err}");
    } else {
        tracing::debug!("request rejected: {err}");
    }

    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}

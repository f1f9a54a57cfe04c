use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use gpx_speed::{
    aggregate::{PagePolicy, TraceAggregate},
    create_router,
    geo::{haversine_m, BoundingBox, SAMPLE_BBOX},
    source::{OsmTraceClient, SourceError, StaticPages, TraceSource},
    storage::TrackStore,
    AppState,
};
use hyper::StatusCode;
use shared::{ApiError, InitialCoordinates, Track};
use tower::ServiceExt;

const PAGE_VALID: &str = include_str!("fixtures/page_valid.gpx");
const PAGE_SHORT: &str = include_str!("fixtures/page_short.gpx");

fn test_app(pages: &[&str]) -> axum::Router {
    create_router(AppState::new(StaticPages::new(pages.iter().copied()), 5))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, bytes.to_vec())
}

struct FailingSource;

impl TraceSource for FailingSource {
    async fn fetch_page(
        &self,
        bbox: BoundingBox,
        page: u32,
    ) -> Result<Option<String>, SourceError> {
        Err(SourceError::Status {
            status: 500,
            url: format!("https://traces.invalid/trackpoints?bbox={bbox}&page={page}"),
        })
    }
}

#[tokio::test]
async fn root_returns_center_of_sample_area() {
    let (status, body) = get(test_app(&[]), "/").await;
    assert_eq!(status, StatusCode::OK);

    let body: InitialCoordinates = serde_json::from_slice(&body).unwrap();
    assert!((body.initial_coordinates.lat - 51.625).abs() < 1e-9);
    assert!((body.initial_coordinates.lon - 0.125).abs() < 1e-9);
}

#[tokio::test]
async fn gpx_endpoint_returns_enriched_tracks() {
    let app = test_app(&[PAGE_VALID, PAGE_SHORT]);
    let (status, body) = get(
        app,
        "/gpx?min_lat=51.5&min_long=0.0&max_lat=51.75&max_long=0.25",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let tracks: Vec<Track> = serde_json::from_slice(&body).unwrap();
    assert_eq!(tracks.len(), 1);

    let track = &tracks[0];
    assert_eq!(track.name.as_deref(), Some("20230601_river.gpx"));
    assert_eq!(track.desc.as_deref(), Some("Cycling along the Thames"));
    assert_eq!(track.point_count(), 11);
    assert!(track.points().all(|p| p.speed_kph.is_some()));
    assert!(track.average_speed_kph.unwrap() > 0.0);
}

#[tokio::test]
async fn gpx_endpoint_speeds_match_manual_computation() {
    let (_, body) = get(test_app(&[PAGE_VALID]), "/gpx").await;
    let tracks: Vec<Track> = serde_json::from_slice(&body).unwrap();
    let points: Vec<_> = tracks[0].points().cloned().collect();

    let step_kph = haversine_m(points[0].coordinate(), points[1].coordinate()) / 10.0 * 3.6;
    let expected_avg = step_kph * 10.0 / 11.0;

    let track = &tracks[0];
    assert!((track.track_max_speed_kph.unwrap() - step_kph).abs() < 1e-6);
    assert!((track.average_speed_kph.unwrap() - expected_avg).abs() < 1e-6);
    assert_eq!(points[0].speed_kph, points[1].speed_kph);
    assert_eq!(points[10].speed_kph, Some(0.0));
}

#[tokio::test]
async fn incomplete_bbox_is_bad_request() {
    let (status, body) = get(test_app(&[PAGE_VALID]), "/gpx?min_lat=51.5&max_lat=51.75").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ApiError = serde_json::from_slice(&body).unwrap();
    assert!(error.message.contains("min_long"));
}

#[tokio::test]
async fn inverted_bbox_is_bad_request() {
    let (status, _) = get(
        test_app(&[PAGE_VALID]),
        "/gpx?min_lat=52&min_long=0&max_lat=51&max_long=1",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unparsable_page_is_bad_gateway() {
    let (status, body) = get(test_app(&[PAGE_VALID, "<html>rate limited"]), "/gpx").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let error: ApiError = serde_json::from_slice(&body).unwrap();
    assert!(error.message.contains("page 1"));
}

#[tokio::test]
async fn upstream_error_status_is_bad_gateway() {
    let app = create_router(AppState::new(FailingSource, 5));
    let (status, _) = get(app, "/gpx").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn unreachable_source_is_service_unavailable() {
    let client = OsmTraceClient::new("http://127.0.0.1:1/api/0.6", Duration::from_secs(2)).unwrap();
    let app = create_router(AppState::new(client, 1));
    let (status, body) = get(app, "/gpx").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: ApiError = serde_json::from_slice(&body).unwrap();
    assert!(error.message.contains("unreachable"));
}

#[tokio::test]
async fn stored_traces_need_a_database() {
    let (status, _) = get(test_app(&[]), "/gpx/stored").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

/// Store with the schema applied, on a throwaway Postgres container.
async fn setup_test_store() -> (
    TrackStore,
    testcontainers::ContainerAsync<testcontainers_modules::postgres::Postgres>,
) {
    use testcontainers::{runners::AsyncRunner, ImageExt};
    use testcontainers_modules::postgres::Postgres;

    let container = Postgres::default()
        .with_tag("17-alpine")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");
    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");
    let database_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    let store = TrackStore::connect(&database_url).await.unwrap();
    store.migrate().await.unwrap();
    (store, container)
}

#[tokio::test]
async fn strict_stored_query_returns_stored_tracks() {
    let (store, _container) = setup_test_store().await;
    let track = TraceAggregate::from_pages(SAMPLE_BBOX, &[PAGE_VALID], PagePolicy::FailFast)
        .unwrap()
        .into_tracks()
        .remove(0);
    store.store_track(SAMPLE_BBOX, &track).await.unwrap();

    let source = StaticPages::new(Vec::<String>::new());
    let app = create_router(AppState::new(source, 5).with_store(store));

    let (status, body) = get(
        app.clone(),
        "/gpx/stored?min_lat=51.5&min_long=0.0&max_lat=51.75&max_long=0.25&strict=true",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tracks: Vec<Track> = serde_json::from_slice(&body).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].name.as_deref(), Some("20230601_river.gpx"));
    assert_eq!(tracks[0].point_count(), 11);

    let (status, body) = get(
        app.clone(),
        "/gpx/stored?min_lat=51.0&min_long=-1.0&max_lat=52.0&max_long=1.0&strict=true",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tracks: Vec<Track> = serde_json::from_slice(&body).unwrap();
    assert!(tracks.is_empty());

    let (_, body) = get(
        app,
        "/gpx/stored?min_lat=51.0&min_long=-1.0&max_lat=52.0&max_long=1.0",
    )
    .await;
    let tracks: Vec<Track> = serde_json::from_slice(&body).unwrap();
    assert_eq!(tracks.len(), 1);
}

//! Postgres persistence for enriched tracks, keyed by the bbox they were fetched for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shared::Track;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres};

use crate::aggregate::TraceAggregate;
use crate::geo::BoundingBox;

/// Corner tolerance, in degrees, for [`TrackStore::query_strict`].
pub const STRICT_EPSILON_DEG: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("invalid track data: {0}")]
    InvalidData(String),

    #[error("track storage is not configured")]
    NotConfigured,
}

/// One persisted track (DB representation).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoredTrack {
    pub id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub bbox_geojson: sqlx::types::JsonValue,
    pub track_data: sqlx::types::JsonValue,
    pub average_speed_kph: Option<f64>,
    pub max_speed_kph: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl StoredTrack {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }

    pub fn track(&self) -> Result<Track, StorageError> {
        serde_json::from_value(self.track_data.clone())
            .map_err(|e| StorageError::InvalidData(format!("failed to deserialize track: {e}")))
    }
}

/// GeoJSON polygon for the box, as stored alongside each track.
pub fn bbox_geojson(bbox: &BoundingBox) -> serde_json::Value {
    let ring: Vec<[f64; 2]> = bbox
        .to_polygon()
        .exterior()
        .coords()
        .map(|c| [c.x, c.y])
        .collect();
    json!({ "type": "Polygon", "coordinates": [ring] })
}

pub struct TrackStore {
    pool: PgPool,
}

impl TrackStore {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool created");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        // raw_sql: the migration holds more than one statement
        let mut conn = self.pool.acquire().await?;
        sqlx::raw_sql(include_str!("../migrations/20250601_create_gpx_tracks.sql"))
            .execute(&mut *conn)
            .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    pub async fn store_track(&self, bbox: BoundingBox, track: &Track) -> Result<i64, StorageError> {
        let id = insert_track(&self.pool, bbox, track).await?;
        tracing::info!("stored track {:?} as {id}", track.name);
        Ok(id)
    }

    /// Store every track of the aggregate in one transaction.
    pub async fn store_aggregate(
        &self,
        aggregate: &TraceAggregate,
    ) -> Result<Vec<i64>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(aggregate.tracks().len());
        for track in aggregate.tracks() {
            ids.push(insert_track(&mut *tx, aggregate.bbox(), track).await?);
        }
        tx.commit().await?;

        tracing::info!("stored {} tracks for bbox {}", ids.len(), aggregate.bbox());
        Ok(ids)
    }

    /// Tracks whose stored bbox overlaps `bbox`.
    pub async fn query_intersecting(
        &self,
        bbox: BoundingBox,
    ) -> Result<Vec<StoredTrack>, StorageError> {
        let rows = sqlx::query_as::<_, StoredTrack>(
            r#"
            SELECT * FROM gpx_tracks
            WHERE min_lon <= $3 AND max_lon >= $1
              AND min_lat <= $4 AND max_lat >= $2
            ORDER BY id
            "#,
        )
        .bind(bbox.min_lon)
        .bind(bbox.min_lat)
        .bind(bbox.max_lon)
        .bind(bbox.max_lat)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("{} stored tracks intersect {bbox}", rows.len());
        Ok(rows)
    }

    /// Tracks stored for (nearly) this exact bbox: within it, and equal
    /// corner by corner up to [`STRICT_EPSILON_DEG`].
    pub async fn query_strict(&self, bbox: BoundingBox) -> Result<Vec<StoredTrack>, StorageError> {
        let rows = sqlx::query_as::<_, StoredTrack>(
            r#"
            SELECT * FROM gpx_tracks
            WHERE min_lon >= $1 AND min_lat >= $2
              AND max_lon <= $3 AND max_lat <= $4
            ORDER BY id
            "#,
        )
        .bind(bbox.min_lon)
        .bind(bbox.min_lat)
        .bind(bbox.max_lon)
        .bind(bbox.max_lat)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.bbox().approx_eq(&bbox, STRICT_EPSILON_DEG))
            .collect())
    }
}

async fn insert_track<'e, E>(
    executor: E,
    bbox: BoundingBox,
    track: &Track,
) -> Result<i64, StorageError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let track_data =
        serde_json::to_value(track).map_err(|e| StorageError::InvalidData(e.to_string()))?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO gpx_tracks (
            name, description, url, min_lon, min_lat, max_lon, max_lat,
            bbox_geojson, track_data, average_speed_kph, max_speed_kph
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(&track.name)
    .bind(&track.desc)
    .bind(&track.url)
    .bind(bbox.min_lon)
    .bind(bbox.min_lat)
    .bind(bbox.max_lon)
    .bind(bbox.max_lat)
    .bind(bbox_geojson(&bbox))
    .bind(track_data)
    .bind(track.average_speed_kph)
    .bind(track.track_max_speed_kph)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

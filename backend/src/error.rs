use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::geo::GeoError;
use crate::storage::StorageError;

/// Everything a request against the HTTP surface can fail with.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid bounding box: {0}")]
    BoundingBox(#[from] GeoError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

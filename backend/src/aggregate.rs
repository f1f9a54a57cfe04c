use rayon::prelude::*;
use serde::Serialize;
use shared::Track;

use crate::geo::BoundingBox;
use crate::parser::{parse_page, ParseError};
use crate::source::{fetch_pages, SourceError, TraceSource};
use crate::{speed, validation};

/// What to do with a page that is not readable GPX.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PagePolicy {
    /// Log it, count it, keep going with the other pages.
    #[default]
    SkipMalformed,
    /// Abort the whole aggregate on the first bad page.
    FailFast,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("trace page {index} could not be parsed: {source}")]
    Page {
        index: usize,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Enriched, validated tracks for one bounding-box query.
#[derive(Debug, Clone, Serialize)]
pub struct TraceAggregate {
    bbox: BoundingBox,
    tracks: Vec<Track>,
    #[serde(skip)]
    skipped_pages: usize,
}

impl TraceAggregate {
    /// Parse every page, drop unusable tracks and annotate the rest with
    /// speeds. Track order is page order, then document order.
    pub fn from_pages<P>(
        bbox: BoundingBox,
        pages: &[P],
        policy: PagePolicy,
    ) -> Result<Self, AggregateError>
    where
        P: AsRef<str> + Sync,
    {
        let parsed: Vec<Result<Vec<Track>, ParseError>> = pages
            .par_iter()
            .map(|page| parse_page(page.as_ref()))
            .collect();

        let mut tracks = Vec::new();
        let mut skipped_pages = 0;
        for (index, result) in parsed.into_iter().enumerate() {
            match result {
                Ok(page_tracks) => tracks.extend(page_tracks),
                Err(source) if policy == PagePolicy::SkipMalformed => {
                    tracing::warn!("skipping trace page {index}: {source}");
                    skipped_pages += 1;
                }
                Err(source) => return Err(AggregateError::Page { index, source }),
            }
        }

        let parsed_tracks = tracks.len();
        let tracks: Vec<Track> = validation::validate(tracks)
            .into_par_iter()
            .map(speed::enrich)
            .collect();

        tracing::info!(
            "bbox {bbox}: {} pages, {parsed_tracks} tracks parsed, {} kept",
            pages.len(),
            tracks.len()
        );

        Ok(Self {
            bbox,
            tracks,
            skipped_pages,
        })
    }

    /// Fetch up to `max_pages` pages from `source` and build the aggregate.
    pub async fn fetch<S: TraceSource>(
        source: &S,
        bbox: BoundingBox,
        max_pages: u32,
        policy: PagePolicy,
    ) -> Result<Self, AggregateError> {
        let pages = fetch_pages(source, bbox, max_pages).await?;
        Self::from_pages(bbox, &pages, policy)
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn skipped_pages(&self) -> usize {
        self.skipped_pages
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }
}

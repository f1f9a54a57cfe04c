use std::future::Future;
use std::time::Duration;

use crate::geo::BoundingBox;

pub const DEFAULT_API_URL: &str = "https://api.openstreetmap.org/api/0.6";
pub const DEFAULT_MAX_PAGES: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("trace source unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("trace source answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Paginated provider of raw GPX trace pages.
///
/// `Ok(None)` means there are no more pages.
pub trait TraceSource: Send + Sync {
    fn fetch_page(
        &self,
        bbox: BoundingBox,
        page: u32,
    ) -> impl Future<Output = Result<Option<String>, SourceError>> + Send;
}

/// Pull pages `0..max_pages`, stopping early at the first empty one.
pub async fn fetch_pages<S: TraceSource>(
    source: &S,
    bbox: BoundingBox,
    max_pages: u32,
) -> Result<Vec<String>, SourceError> {
    let mut pages = Vec::new();
    for page in 0..max_pages {
        tracing::info!("requesting trace page {page} for bbox {bbox}");
        match source.fetch_page(bbox, page).await? {
            Some(body) if !body.trim().is_empty() => pages.push(body),
            _ => {
                tracing::debug!("trace page {page} is empty, stopping");
                break;
            }
        }
    }
    Ok(pages)
}

/// Client for the public GPS trackpoints endpoint of the OSM API.
#[derive(Debug, Clone)]
pub struct OsmTraceClient {
    http: reqwest::Client,
    base_url: String,
}

impl OsmTraceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gpx_speed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn page_url(&self, bbox: BoundingBox, page: u32) -> String {
        format!(
            "{}/trackpoints?bbox={bbox}&page={page}",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl TraceSource for OsmTraceClient {
    async fn fetch_page(
        &self,
        bbox: BoundingBox,
        page: u32,
    ) -> Result<Option<String>, SourceError> {
        let url = self.page_url(bbox, page);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(SourceError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await.map_err(SourceError::Unreachable)?;
        Ok(if body.is_empty() { None } else { Some(body) })
    }
}

/// In-memory source serving a fixed list of pages, whatever the bbox.
#[derive(Debug, Clone, Default)]
pub struct StaticPages {
    pages: Vec<String>,
}

impl StaticPages {
    pub fn new<I, P>(pages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }
}

impl TraceSource for StaticPages {
    async fn fetch_page(
        &self,
        _bbox: BoundingBox,
        page: u32,
    ) -> Result<Option<String>, SourceError> {
        Ok(self.pages.get(page as usize).cloned())
    }
}

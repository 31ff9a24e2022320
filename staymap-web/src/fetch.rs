use async_trait::async_trait;
use staymap_http::{HttpClient, HttpError, RequestOpts};
use url::Url;

/// A successfully fetched document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects; relative links resolve against it.
    pub url: Url,
    pub body: String,
}

/// Seam between the spider and the fetch engine.
///
/// Implementations must report non-success HTTP statuses as
/// [`HttpError::Status`] rather than returning the error page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument, HttpError>;
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument, HttpError> {
        let page = self.get_page(url, RequestOpts::default()).await?;
        if !page.is_success() {
            return Err(HttpError::Status {
                status: page.status,
                url: page.url.to_string(),
                message: format!("{} bytes", page.body.len()),
            });
        }
        Ok(FetchedDocument {
            url: page.url,
            body: page.body,
        })
    }
}

use std::io::Read;
use std::time::Duration;
use reqwest::blocking::Client;

/// Error type returned by fetchers; wrapped into [`Error::Fetch`](crate::Error::Fetch)
/// together with the tool and URL.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Opens a download stream for a URL.
///
/// The installer reads the returned stream exactly once, hashing it while it
/// is unpacked, so implementations should not buffer the whole payload.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError>;
}

/// Fetches over HTTP(S) with a blocking `reqwest` client.
///
/// Non-success statuses are errors. No retries and no timeout are applied;
/// callers needing either configure the client passed to
/// [`HttpFetcher::with_client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        // reqwest's blocking client times out after 30s by default, too short for toolchains.
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", crate::global::utils::APP_NAME)
            .send()?
            .error_for_status()?;
        Ok(Box::new(response))
    }
}

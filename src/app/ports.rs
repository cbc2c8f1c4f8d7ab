use async_trait::async_trait;

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, request: &HttpGetRequest) -> Result<HttpGetResult, String>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpGetRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    /// Value for the `Cookie` header; omitted when empty
    pub cookie_header: String,
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

use crate::app::ports::{HttpClientPort, HttpGetRequest, HttpGetResult};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::header::COOKIE;
use std::time::Duration;

/// reqwest-backed client shared by every performer's fetch job.
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, request: &HttpGetRequest) -> std::result::Result<HttpGetResult, String> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        if !request.cookie_header.is_empty() {
            builder = builder.header(COOKIE, &request.cookie_header);
        }
        let resp = builder.send().await.map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpGetResult { status, bytes })
    }
}

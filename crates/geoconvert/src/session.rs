//! HTTP transport for one wizard walk.
//!
//! Wraps a reqwest client with a cookie jar so the ColdFusion session
//! (`CFID`/`CFTOKEN`) survives from the first GET to the final download.
//! Requests are not retried: a failed step leaves the server-side wizard in
//! an unknown state, so the walk is aborted instead.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use crate::error::{GeoconvertError, GeoconvertResult};

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    /// Decoded response body.
    pub body: String,
}

/// A file attached to a multipart request.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Form field the file is sent under.
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Cookie-holding HTTP session rooted at one base URL.
pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
}

impl Session {
    /// Create a session. `timeout_ms` of `None` keeps reqwest's defaults.
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> GeoconvertResult<Self> {
        // Url::join drops the last path segment unless the base ends in '/'.
        let base = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        let jar = Arc::new(Jar::default());
        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(concat!("geoconvert/", env!("CARGO_PKG_VERSION")));
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        Ok(Self {
            client: builder.build()?,
            jar,
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a page or form action against the base URL.
    pub fn resolve(&self, page: &str) -> GeoconvertResult<Url> {
        Ok(self.base.join(page)?)
    }

    /// Value of a session cookie for the base URL.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.base)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }

    pub async fn get(&self, page: &str) -> GeoconvertResult<Page> {
        let url = self.resolve(page)?;
        tracing::debug!(%url, "GET");
        let resp = self.client.get(url.clone()).send().await?;
        read_page(url, resp).await
    }

    /// POST `application/x-www-form-urlencoded` fields.
    pub async fn post_form(
        &self,
        page: &str,
        fields: &[(String, String)],
    ) -> GeoconvertResult<Page> {
        let url = self.resolve(page)?;
        tracing::debug!(%url, fields = fields.len(), "POST form");
        let resp = self.client.post(url.clone()).form(fields).send().await?;
        read_page(url, resp).await
    }

    /// POST `multipart/form-data` with text fields and one file part.
    pub async fn post_multipart(
        &self,
        page: &str,
        fields: &[(String, String)],
        upload: &Upload,
    ) -> GeoconvertResult<Page> {
        let url = self.resolve(page)?;
        tracing::debug!(%url, fields = fields.len(), file = %upload.file_name, "POST multipart");

        let mut form = reqwest::multipart::Form::new();
        for (name, value) in fields {
            form = form.text(name.clone(), value.clone());
        }
        let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone());
        form = form.part(upload.field.clone(), part);

        let resp = self.client.post(url.clone()).multipart(form).send().await?;
        read_page(url, resp).await
    }

    /// Download a resource as raw bytes.
    pub async fn fetch_bytes(&self, url: &Url) -> GeoconvertResult<Vec<u8>> {
        tracing::debug!(%url, "GET bytes");
        let resp = self.client.get(url.clone()).send().await?;
        let resp = check_status(url, resp)?;
        Ok(resp.bytes().await?.to_vec())
    }
}

fn check_status(url: &Url, resp: reqwest::Response) -> GeoconvertResult<reqwest::Response> {
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(GeoconvertError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(resp)
}

async fn read_page(url: Url, resp: reqwest::Response) -> GeoconvertResult<Page> {
    let resp = check_status(&url, resp)?;
    let status = resp.status().as_u16();
    let final_url = resp.url().to_string();
    let body = resp.text().await?;
    Ok(Page {
        url: final_url,
        status,
        body,
    })
}

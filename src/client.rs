use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Client as ReqwestClient, Response};
use url::Url;

use crate::error::{Error, Result};

/// Origin used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

/// HTTP client for the assistant backend.
///
/// The client never sets a whole-request timeout: answers stream for as long
/// as the backend keeps the connection open.  Only connection establishment
/// can be bounded, via [`Backend::with_options`].
#[derive(Debug, Clone)]
pub struct Backend {
    client: ReqwestClient,
    base_url: Url,
    connect_timeout: Option<Duration>,
}

impl Backend {
    /// Create a new client for the given origin.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(Some(base_url), None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<&str>, connect_timeout: Option<Duration>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.unwrap_or(DEFAULT_BASE_URL))?;

        let mut builder = ReqwestClient::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })?;

        Ok(Self {
            client,
            base_url,
            connect_timeout,
        })
    }

    /// The normalized origin, always ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the origin.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Open a GET request that answers with `text/event-stream`.
    pub async fn get_event_stream(&self, url: Url) -> Result<Response> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    /// POST a multipart form and hand back the still-streaming response.
    pub async fn post_multipart(&self, url: Url, form: Form) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            let limit = self
                .connect_timeout
                .map(|t| format!(" after {:.1}s", t.as_secs_f64()))
                .unwrap_or_default();
            Error::timeout(format!("Connecting timed out{limit}: {e}"))
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        let message = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", body.trim())
        };

        match status_code {
            400 => Error::bad_request(message),
            404 => Error::not_found(message),
            500 => Error::internal_server(message),
            502..=504 => Error::service_unavailable(message),
            _ => Error::api(status_code, message),
        }
    }
}

fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(Error::url(
            format!("{base_url} cannot be used as a base URL"),
            None,
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_origin() {
        let backend = Backend::with_options(None, None).unwrap();
        assert_eq!(backend.base_url().as_str(), DEFAULT_BASE_URL);
        assert!(backend.connect_timeout.is_none());
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let backend = Backend::new("https://assistant.example.com/api").unwrap();
        assert_eq!(
            backend.endpoint("chat-stream").unwrap().as_str(),
            "https://assistant.example.com/api/chat-stream"
        );
    }

    #[test]
    fn custom_connect_timeout() {
        let backend =
            Backend::with_options(Some("http://127.0.0.1:9000"), Some(Duration::from_secs(5)))
                .unwrap();
        assert_eq!(backend.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(backend.base_url().as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(Backend::new("mailto:someone@example.com").is_err());
        assert!(Backend::new("not a url").is_err());
    }
}

use async_trait::async_trait;

/// HTTP response reduced to what the vendor protocol needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,

    /// Cookie pairs from `Set-Cookie` response headers. The login response
    /// carries the account identifier here; the auth cookie itself stays in
    /// the client's cookie store.
    pub cookies: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Trait for the HTTP transport used by the vendor protocol
///
/// This trait allows for mocking the transport for testing purposes. The
/// real implementation holds a cookie store so the cloud session cookie set
/// at login is attached to every later request.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET request
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;

    /// Issue a POST request with a form-encoded body
    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, HttpError>;
}

/// Real HTTP client backed by reqwest with an in-memory cookie store
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> reqwest::Result<Self> {
        let inner = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { inner })
    }

    async fn convert(
        url: &str,
        result: reqwest::Result<reqwest::Response>,
    ) -> Result<HttpResponse, HttpError> {
        let response = result.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let cookies = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|s| {
                let pair = s.split(';').next()?;
                let (name, value) = pair.split_once('=')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(HttpResponse {
            status,
            body,
            cookies,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        Self::convert(url, self.inner.get(url).send().await).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, HttpError> {
        Self::convert(url, self.inner.post(url).form(form).send().await).await
    }
}

/// Mock HTTP client for testing
#[cfg(test)]
pub use mock::{MockHttpClient, RecordedRequest};

#[cfg(test)]
mod mock {
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{HttpClient, HttpError, HttpResponse};

    /// A request as seen by the mock client
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: &'static str,
        pub url: String,
        pub form: Vec<(String, String)>,
    }

    /// Mock client serving canned responses per URL
    ///
    /// Responses for one URL are served in queue order; the last queued
    /// response is sticky so repeated polls keep getting an answer. A URL
    /// with no queued response fails like a transport error.
    #[derive(Default)]
    pub struct MockHttpClient {
        responses: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, status: u16, body: &str) {
            self.respond_with_cookies(url, status, body, Vec::new());
        }

        pub fn respond_with_cookies(
            &self,
            url: &str,
            status: u16,
            body: &str,
            cookies: Vec<(String, String)>,
        ) {
            let mut responses = self.responses.lock().unwrap();
            responses
                .entry(url.to_string())
                .or_default()
                .push_back(HttpResponse {
                    status,
                    body: body.to_string(),
                    cookies,
                });
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn serve(
            &self,
            method: &'static str,
            url: &str,
            form: Vec<(String, String)>,
        ) -> Result<HttpResponse, HttpError> {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                url: url.to_string(),
                form,
            });

            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(url)
                .ok_or_else(|| HttpError::Transport {
                    url: url.to_string(),
                    message: "no mock response configured".to_string(),
                })?;

            let response = queue.pop_front().ok_or_else(|| HttpError::Transport {
                url: url.to_string(),
                message: "mock response queue empty".to_string(),
            })?;
            if queue.is_empty() {
                queue.push_back(response.clone());
            }
            Ok(response)
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
            self.serve("GET", url, Vec::new())
        }

        async fn post_form(
            &self,
            url: &str,
            form: &[(String, String)],
        ) -> Result<HttpResponse, HttpError> {
            self.serve("POST", url, form.to_vec())
        }
    }
}

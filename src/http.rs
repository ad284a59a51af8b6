//! HTTP transport abstraction so the broker, catalog and content server
//! clients can be exercised against a mock in tests.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, header::REFERER};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub referer: Option<String>,
    /// `None` waits for as long as the server takes.
    pub timeout: Option<Duration>,
    /// When set the request is a form-encoded POST.
    pub form: Option<Vec<(String, String)>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequest {
            url: url.into(),
            referer: None,
            timeout: None,
            form: None,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        HttpRequest {
            form: Some(form),
            ..Self::get(url)
        }
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub trait HttpClient: Send + Sync {
    /// Performs the request and returns the body of a 2xx response.
    ///
    /// Non-2xx responses are [`Error::HttpStatus`], transport failures are
    /// [`Error::Network`].
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// No client-wide timeout: manifests can be large and content servers
    /// slow. Callers that need one set it per request.
    pub fn new() -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .use_native_tls()
            .tcp_keepalive(Duration::from_secs(20))
            .user_agent(concat!("depot-manifest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ReqwestClient { client })
    }
}

impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>> {
        let mut builder = match &request.form {
            Some(form) => {
                tracing::debug!("POST {}", request.url);
                self.client.post(&request.url).form(form)
            }
            None => {
                tracing::debug!("GET {}", request.url);
                self.client.get(&request.url)
            }
        };
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: request.url,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// `scheme://host` of a URL, used as the Referer for broker requests.
pub fn base_domain(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum MockResponse {
        Body(Vec<u8>),
        Status(u16),
        Unreachable,
    }

    /// Mock HTTP client for testing.
    ///
    /// Responses are matched by URL substring. Each route replays its queue
    /// in order and keeps returning the last entry once drained.
    #[derive(Default)]
    pub struct MockHttpClient {
        routes: Mutex<Vec<(String, VecDeque<MockResponse>)>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(self, pattern: &str, responses: Vec<MockResponse>) -> Self {
            self.routes
                .lock()
                .unwrap()
                .push((pattern.to_owned(), responses.into()));
            self
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next_response(&self, url: &str) -> MockResponse {
            let mut routes = self.routes.lock().unwrap();
            let Some((_, queue)) = routes.iter_mut().find(|(p, _)| url.contains(p.as_str()))
            else {
                return MockResponse::Status(404);
            };
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or(MockResponse::Status(404))
            }
        }
    }

    impl HttpClient for MockHttpClient {
        async fn send(&self, request: HttpRequest) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(request.clone());
            match self.next_response(&request.url) {
                MockResponse::Body(body) => Ok(body),
                MockResponse::Status(status) => Err(Error::HttpStatus {
                    status,
                    url: request.url,
                }),
                MockResponse::Unreachable => Err(Error::Network("connection refused".into())),
            }
        }
    }

    #[test]
    fn test_base_domain() {
        assert_eq!(
            base_domain("https://codes.example.net/api/v1/5?x=1").as_deref(),
            Some("https://codes.example.net")
        );
        assert_eq!(
            base_domain("http://127.0.0.1:8080/a").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(base_domain("not a url"), None);
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("http://a/b")
            .referer("http://a")
            .timeout(Duration::from_secs(10));
        assert_eq!(request.referer.as_deref(), Some("http://a"));
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));
        assert!(request.form.is_none());

        let post = HttpRequest::post_form("http://a/c", vec![("k".into(), "v".into())]);
        assert_eq!(post.url, "http://a/c");
        assert_eq!(post.form, Some(vec![("k".to_owned(), "v".to_owned())]));
    }

    #[tokio::test]
    async fn test_mock_routes_replay_in_order() {
        let mock = MockHttpClient::new().route(
            "/x",
            vec![MockResponse::Unreachable, MockResponse::Body(b"ok".to_vec())],
        );
        assert!(mock.send(HttpRequest::get("http://h/x")).await.is_err());
        assert_eq!(mock.send(HttpRequest::get("http://h/x")).await.unwrap(), b"ok");
        assert_eq!(mock.send(HttpRequest::get("http://h/x")).await.unwrap(), b"ok");
        assert!(matches!(
            mock.send(HttpRequest::get("http://h/y")).await,
            Err(Error::HttpStatus { status: 404, .. })
        ));
        assert_eq!(mock.requests().len(), 4);
    }
}

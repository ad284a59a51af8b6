//! Manifest request codes.
//!
//! Content servers only hand out a manifest when the URL carries a
//! short-lived request code. Codes come from a remote broker; while waiting
//! on it the operator can press Enter to give up and paste one by hand.

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest, base_domain};
use crate::prompt::Prompt;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const BROKER_TIMEOUT: Duration = Duration::from_secs(10);
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait RequestCodeSource: Send + Sync {
    fn fetch(&self, manifest_id: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Broker reached over HTTP; the URL template carries `{manifest_id}`.
pub struct HttpRequestCodeSource<H: HttpClient> {
    http: H,
    url_template: String,
}

impl<H: HttpClient> HttpRequestCodeSource<H> {
    pub fn new(http: H, url_template: impl Into<String>) -> Self {
        HttpRequestCodeSource {
            http,
            url_template: url_template.into(),
        }
    }

    fn url(&self, manifest_id: &str) -> String {
        self.url_template.replace("{manifest_id}", manifest_id)
    }
}

impl<H: HttpClient> RequestCodeSource for HttpRequestCodeSource<H> {
    async fn fetch(&self, manifest_id: &str) -> Result<String> {
        let url = self.url(manifest_id);
        let mut request = HttpRequest::get(url.clone()).timeout(BROKER_TIMEOUT);
        if let Some(referer) = base_domain(&url) {
            request = request.referer(referer);
        }

        let body = self.http.send(request).await?;
        let code = String::from_utf8_lossy(&body).trim().to_owned();
        if code.is_empty() {
            return Err(Error::Network("broker returned an empty request code".into()));
        }
        Ok(code)
    }
}

/// A signal the operator can raise to abandon the broker request.
pub trait ManualCancel: Send + Sync {
    /// When `false` the broker is called without racing.
    fn is_supported(&self) -> bool {
        true
    }

    /// Resolves once the operator asks to cancel.
    fn cancelled(&self) -> impl Future<Output = ()> + Send;
}

/// Enter on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnterKeyCancel;

impl ManualCancel for EnterKeyCancel {
    fn is_supported(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    async fn cancelled(&self) {
        // Non-blocking poll so dropping this future stops it immediately.
        loop {
            if enter_pressed() {
                return;
            }
            sleep(KEY_POLL_INTERVAL).await;
        }
    }
}

fn enter_pressed() -> bool {
    while let Ok(true) = event::poll(Duration::ZERO) {
        match event::read() {
            Ok(Event::Key(key)) if key.code == KeyCode::Enter && key.kind == KeyEventKind::Press => {
                return true;
            }
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
    false
}

/// No cancellation: plain blocking call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl ManualCancel for NeverCancel {
    fn is_supported(&self) -> bool {
        false
    }

    fn cancelled(&self) -> impl Future<Output = ()> + Send {
        std::future::pending()
    }
}

impl ManualCancel for CancellationToken {
    fn cancelled(&self) -> impl Future<Output = ()> + Send {
        CancellationToken::cancelled(self)
    }
}

#[derive(Debug)]
pub enum RaceOutcome {
    Code(String),
    Cancelled,
    Failed(Error),
}

/// Runs one broker request against the cancel signal.
///
/// Both futures are polled from this task; whichever loses is dropped
/// before returning, so a cancelled request has no further effects.
pub async fn race_request_code<S, K>(source: &S, cancel: &K, manifest_id: &str) -> RaceOutcome
where
    S: RequestCodeSource,
    K: ManualCancel,
{
    let request = async {
        match source.fetch(manifest_id).await {
            Ok(code) => RaceOutcome::Code(code),
            Err(e) => RaceOutcome::Failed(e),
        }
    };

    if !cancel.is_supported() {
        return request.await;
    }

    tokio::select! {
        outcome = request => outcome,
        _ = cancel.cancelled() => {
            println!("Cancelling request...");
            RaceOutcome::Cancelled
        }
    }
}

pub struct RequestCodeBroker<S, K> {
    source: S,
    cancel: K,
    retry_interval: Duration,
    max_attempts: Option<u32>,
}

impl<S: RequestCodeSource, K: ManualCancel> RequestCodeBroker<S, K> {
    pub fn new(source: S, cancel: K) -> Self {
        RequestCodeBroker {
            source,
            cancel,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: None,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// `None` retries until the operator cancels.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Obtains a request code, retrying an unreachable broker every
    /// `retry_interval`. A cancel from the operator, or running out of
    /// attempts, falls back to asking for the code.
    pub async fn get<P: Prompt>(&self, manifest_id: &str, prompt: &P) -> Result<String> {
        println!("Getting request code...");
        if self.cancel.is_supported() {
            println!("If it takes too long, press Enter to cancel the request and input manually...");
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match race_request_code(&self.source, &self.cancel, manifest_id).await {
                RaceOutcome::Code(code) => {
                    println!("Request code is: {}", code);
                    return Ok(code);
                }
                RaceOutcome::Cancelled => return ask_request_code(prompt),
                RaceOutcome::Failed(e) => {
                    tracing::warn!(attempt, "request code endpoint failed: {}", e);
                    if self.max_attempts.is_some_and(|max| attempt >= max) {
                        println!("Request code endpoint gave up after {} attempts.", attempt);
                        return ask_request_code(prompt);
                    }
                }
            }

            if !self.cancel.is_supported() {
                sleep(self.retry_interval).await;
                continue;
            }
            tokio::select! {
                _ = sleep(self.retry_interval) => {}
                _ = self.cancel.cancelled() => return ask_request_code(prompt),
            }
        }
    }
}

fn ask_request_code<P: Prompt>(prompt: &P) -> Result<String> {
    loop {
        let code = prompt.ask_text("Paste the manifest request code:")?;
        if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(code);
        }
        println!("Request codes are numeric.");
    }
}

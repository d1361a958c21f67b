//! HTTP fetch client for retail product pages.
//!
//! Every request (warm-up, product page, search) goes through one
//! [`RequestPacer`], so the minimum gap between the end of one request and
//! the start of the next holds across callers, retries and fallback URLs.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wreq::StatusCode;
use wreq_util::Emulation;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("403 Forbidden for {url}")]
    Forbidden { url: String },

    #[error("request to {url} failed: {detail}")]
    Transport { url: String, detail: String },
}

impl FetchError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, FetchError::Forbidden { .. })
    }
}

/// A successfully fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError>;
}

/// Browser identity presented by a session.
///
/// The emulation covers the whole client fingerprint: TLS ClientHello,
/// HTTP/2 settings and the browser's own header set and order.
#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub name: &'static str,
    pub emulation: Emulation,
}

/// Profiles in rotation order. A fresh session moves to the next one.
pub const BROWSER_PROFILES: &[BrowserProfile] = &[
    BrowserProfile {
        name: "chrome-131",
        emulation: Emulation::Chrome131,
    },
    BrowserProfile {
        name: "edge-131",
        emulation: Emulation::Edge131,
    },
    BrowserProfile {
        name: "firefox-133",
        emulation: Emulation::Firefox133,
    },
    BrowserProfile {
        name: "safari-18",
        emulation: Emulation::Safari18,
    },
];

/// Global minimum interval between requests, measured from the end of the
/// previous request to the start of the next one.
#[derive(Debug)]
pub struct RequestPacer {
    delay: Duration,
    last_end: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_end: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `request` once the interval has elapsed. The lock is held for the
    /// whole request so concurrent callers are served one at a time.
    pub async fn run<F, Fut, T>(&self, request: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_end = self.last_end.lock().await;
        if let Some(end) = *last_end {
            tokio::time::sleep_until(end + self.delay).await;
        }

        let output = request().await;
        *last_end = Some(Instant::now());
        output
    }
}

struct Session {
    client: wreq::Client,
    profile_index: usize,
    warmed_up: bool,
}

/// Fingerprinted, cookie-keeping page fetcher.
pub struct PageFetcher {
    base_url: String,
    timeout: Duration,
    pacer: RequestPacer,
    // Lock order: session, then pacer. Never the reverse.
    session: Mutex<Session>,
}

impl PageFetcher {
    pub fn new(base_url: &str, rate_limit_delay: Duration, timeout: Duration) -> crate::Result<Self> {
        let session = Self::new_session(0, timeout)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            pacer: RequestPacer::new(rate_limit_delay),
            session: Mutex::new(session),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }

    fn new_session(profile_index: usize, timeout: Duration) -> Result<Session, wreq::Error> {
        let profile_index = profile_index % BROWSER_PROFILES.len();
        let profile = &BROWSER_PROFILES[profile_index];

        let client = wreq::Client::builder()
            .emulation(profile.emulation)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(wreq::redirect::Policy::limited(8))
            .timeout(timeout)
            .build()?;

        debug!(profile = profile.name, "Created new browser session");

        Ok(Session {
            client,
            profile_index,
            warmed_up: false,
        })
    }

    /// Visits the site root to collect session cookies. Failures only warn.
    async fn warm_up(&self, session: &mut Session) {
        session.warmed_up = true;

        let client = &session.client;
        let base_url = self.base_url.as_str();
        let outcome = self
            .pacer
            .run(move || async move {
                let response = client.get(base_url).send().await?;
                let status = response.status();
                // Drain so the cookies and connection are settled
                let _ = response.bytes().await;
                Ok::<StatusCode, wreq::Error>(status)
            })
            .await;

        match outcome {
            Ok(status) if status.is_success() => debug!("Session warmed up against {}", self.base_url),
            Ok(status) => warn!("Session warm-up returned HTTP {}", status.as_u16()),
            Err(e) => warn!("Could not warm up session: {}", e),
        }
    }

    /// Replaces the session with the next browser profile and a fresh cookie jar.
    async fn reset_session(&self, session: &mut Session, url: &str) -> Result<(), FetchError> {
        let next = Self::new_session(session.profile_index + 1, self.timeout).map_err(|e| {
            FetchError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            }
        })?;

        *session = next;
        metrics::counter!("brickwatch_session_resets_total").increment(1);
        info!(
            profile = BROWSER_PROFILES[session.profile_index].name,
            "Recreated fetch session"
        );

        self.warm_up(session).await;
        Ok(())
    }

    async fn send(&self, client: &wreq::Client, url: &str) -> Result<(StatusCode, String), FetchError> {
        self.pacer
            .run(move || async move {
                let response = client.get(url).send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, wreq::Error>((status, body))
            })
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            })
    }

    async fn fetch_inner(&self, url: &str) -> Result<RawPage, FetchError> {
        let mut session = self.session.lock().await;

        if !session.warmed_up {
            self.warm_up(&mut session).await;
        }

        let (mut status, mut body) = self.send(&session.client, url).await?;

        if status == StatusCode::FORBIDDEN {
            warn!(url, "403 Forbidden, retrying with a fresh session");
            self.reset_session(&mut session, url).await?;

            (status, body) = self.send(&session.client, url).await?;
            if status == StatusCode::FORBIDDEN {
                return Err(FetchError::Forbidden { url: url.to_string() });
            }
        }

        if !status.is_success() {
            return Err(FetchError::Transport {
                url: url.to_string(),
                detail: format!("HTTP {}", status.as_u16()),
            });
        }

        Ok(RawPage {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPage, FetchError> {
        let result = self.fetch_inner(url).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(FetchError::Forbidden { .. }) => "forbidden",
            Err(FetchError::Transport { .. }) => "transport",
        };
        metrics::counter!("brickwatch_fetch_requests_total", "outcome" => outcome).increment(1);

        if let Err(e) = &result {
            debug!("Fetch failed: {}", e);
        }
        result
    }
}

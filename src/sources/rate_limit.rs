//! Sliding-window rate limiting for the upstream APIs.
//!
//! Each upstream prefix owns an independent window of request timestamps.
//! When a window is saturated, the calling task sleeps until the oldest
//! request ages out, plus 100 ms of slack, then re-checks.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::Extensions;
use reqwest::Url;
use reqwest_middleware::{Middleware, Next};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

use crate::config;

const WINDOW: Duration = Duration::from_secs(60);
const SLACK: Duration = Duration::from_millis(100);
const DEFAULT_MAX_REQUESTS: usize = 100;

#[derive(Debug)]
pub(crate) struct SlidingWindow {
    max_requests: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub(crate) fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) async fn acquire(&self) {
        loop {
            let now = Instant::now();
            let mut sent = self.sent.lock().await;
            while sent
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                sent.pop_front();
            }

            if sent.len() < self.max_requests {
                sent.push_back(now);
                return;
            }

            let Some(oldest) = sent.front().copied() else {
                continue;
            };
            drop(sent);
            sleep_until(oldest + self.window + SLACK).await;
        }
    }
}

#[derive(Debug)]
struct Policy {
    key: &'static str,
    prefix: Cow<'static, str>,
    window: SlidingWindow,
}

#[derive(Debug)]
pub(crate) struct RateLimiter {
    policies: Vec<Policy>,
    default_max_requests: usize,
    default_windows: Mutex<HashMap<String, Arc<SlidingWindow>>>,
}

impl RateLimiter {
    pub(crate) fn from_env() -> Self {
        let registry_limit = std::env::var(config::CLINICALTRIALS_RATE_LIMIT_ENV)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(100);

        Self::new(vec![
            Policy {
                key: "clinicaltrials",
                prefix: config::env_base(
                    config::CLINICALTRIALS_BASE_DEFAULT,
                    config::CLINICALTRIALS_BASE_ENV,
                ),
                window: SlidingWindow::new(registry_limit, WINDOW),
            },
            Policy {
                key: "cerebras",
                prefix: config::env_base(config::CEREBRAS_BASE_DEFAULT, config::CEREBRAS_BASE_ENV),
                window: SlidingWindow::new(60, WINDOW),
            },
        ])
    }

    fn new(policies: Vec<Policy>) -> Self {
        Self {
            policies,
            default_max_requests: DEFAULT_MAX_REQUESTS,
            default_windows: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_policy(&self, url: &Url) -> Option<&Policy> {
        let full = url.as_str();
        self.policies
            .iter()
            .filter(|p| full.starts_with(p.prefix.as_ref()))
            .max_by_key(|p| p.prefix.len())
    }

    async fn default_window_for(&self, url: &Url) -> Arc<SlidingWindow> {
        let origin = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or("unknown-host")
        );
        let mut windows = self.default_windows.lock().await;
        windows
            .entry(origin)
            .or_insert_with(|| {
                Arc::new(SlidingWindow::new(self.default_max_requests, WINDOW))
            })
            .clone()
    }

    pub(crate) async fn wait_for_url(&self, url: &Url) {
        match self.resolve_policy(url) {
            Some(policy) => {
                tracing::trace!(policy = policy.key, "acquiring rate-limit slot");
                policy.window.acquire().await;
            }
            None => self.default_window_for(url).await.acquire().await,
        }
    }

    #[cfg(test)]
    fn resolve_key_for_str(&self, raw: &str) -> Option<&'static str> {
        let url = Url::parse(raw).ok()?;
        self.resolve_policy(&url).map(|p| p.key)
    }
}

static GLOBAL_RATE_LIMITER: OnceLock<Arc<RateLimiter>> = OnceLock::new();

pub(crate) fn global_limiter() -> Arc<RateLimiter> {
    GLOBAL_RATE_LIMITER
        .get_or_init(|| Arc::new(RateLimiter::from_env()))
        .clone()
}

#[derive(Clone, Debug)]
pub(crate) struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub(crate) fn new() -> Self {
        Self {
            limiter: global_limiter(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        self.limiter.wait_for_url(req.url()).await;
        next.run(req, extensions).await
    }
}

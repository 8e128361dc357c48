use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use slog::{debug, Logger};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

use crate::RateLimiter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed with status {status}")]
    Http {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        source: reqwest_middleware::Error,
    },
    #[error("error reading body of {url}: {source}")]
    Body {
        url: String,
        source: reqwest::Error,
    },
    #[error("could not build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fetches raw observation files with a bounded retry policy and a
/// shared rate limit, so one slow upstream resource cannot stall the
/// whole ingestion batch.
pub struct ResourceFetcher {
    logger: Logger,
    client: ClientWithMiddleware,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ResourceFetcher {
    pub fn new(
        logger: Logger,
        user_agent: String,
        rate_limiter: Arc<Mutex<RateLimiter>>,
    ) -> Result<Self, FetchError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let client = ClientBuilder::new(
            Client::builder()
                .user_agent(user_agent)
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        )
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

        Ok(Self {
            logger,
            client,
            rate_limiter,
        })
    }

    /// Fetch one resource and return its lines. The body is fully read
    /// before returning so there is no stream left open on any exit path.
    pub async fn fetch_lines(&self, url: &str) -> Result<Vec<String>, FetchError> {
        loop {
            let wait = { self.rate_limiter.lock().await.try_acquire() };
            match wait {
                Ok(()) => break,
                Err(delay) => {
                    debug!(self.logger, "rate limited, waiting {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        debug!(self.logger, "requesting: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            if is_timeout(&e) {
                FetchError::Timeout {
                    url: url.to_owned(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_owned(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_owned(),
                status,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_owned(),
            source: e,
        })?;

        Ok(body.lines().map(str::to_owned).collect())
    }
}

fn is_timeout(error: &reqwest_middleware::Error) -> bool {
    match error {
        reqwest_middleware::Error::Reqwest(e) => e.is_timeout(),
        reqwest_middleware::Error::Middleware(_) => false,
    }
}

//! Upstream market data: the source contract, a snapshot file reader and the
//! cache that decides when to hit the source again.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::domain::DashError;
use crate::market::MarketRow;

const MARKETS_KEY: &str = "markets";
/// Pause before retrying a failed fetch.
const FAILURE_RETRY: Duration = Duration::from_secs(30);
const MARKETS_PATH: &str = "/coins/markets";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    Generic(String),
    RateLimited(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Generic(msg) => write!(f, "Failed to load market data: {msg}"),
            FetchError::RateLimited(msg) => {
                write!(f, "Rate limited by the data provider, try again later ({msg})")
            }
        }
    }
}

impl std::error::Error for FetchError {}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Keyed values that go stale `ttl` after they were stored.
pub struct MarketCache<V, C: Clock> {
    clock: C,
    ttl: Duration,
    entries: HashMap<String, (V, Instant)>,
}

impl<V, C: Clock> MarketCache<V, C> {
    pub fn new(clock: C, ttl: Duration) -> Self {
        MarketCache {
            clock,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// The stored value and whether it is still fresh.
    pub fn get(&self, key: &str) -> Option<(&V, bool)> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|(value, stored)| (value, now.duration_since(*stored) < self.ttl))
    }

    pub fn put(&mut self, key: &str, value: V) {
        self.entries
            .insert(key.to_string(), (value, self.clock.now()));
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }
}

pub trait MarketSource {
    fn fetch_markets(&mut self) -> Result<Vec<MarketRow>, FetchError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MarketsResponse {
    Rows(Vec<MarketRow>),
    Failure { status: ApiStatus },
}

#[derive(Deserialize)]
struct ApiStatus {
    error_code: u16,
    #[serde(default)]
    error_message: String,
}

/// Rows of a `/coins/markets` body. The provider's error body maps to a
/// [`FetchError`], a 429 code to [`FetchError::RateLimited`].
fn parse_markets(body: &str) -> Result<Vec<MarketRow>, FetchError> {
    match serde_json::from_str::<MarketsResponse>(body) {
        Ok(MarketsResponse::Rows(rows)) => Ok(rows),
        Ok(MarketsResponse::Failure { status })
            if status.error_code == StatusCode::TOO_MANY_REQUESTS.as_u16() =>
        {
            Err(FetchError::RateLimited(status.error_message))
        }
        Ok(MarketsResponse::Failure { status }) => Err(FetchError::Generic(format!(
            "HTTP error! status: {} {}",
            status.error_code, status.error_message
        ))),
        Err(e) => Err(FetchError::Generic(e.to_string())),
    }
}

fn markets_from_response(status: StatusCode, body: &str) -> Result<Vec<MarketRow>, FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited(format!("HTTP status {status}")));
    }
    if !status.is_success() {
        return Err(FetchError::Generic(format!("HTTP error! status: {status}")));
    }
    parse_markets(body)
}

/// Fetches the top coins by market cap from a CoinGecko compatible API.
#[derive(Debug)]
pub struct HttpSource {
    client: Client,
    url: Url,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self, DashError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("coinview/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: &str, client: Client) -> Result<Self, DashError> {
        let mut url = Url::parse(&format!("{}{MARKETS_PATH}", base_url.trim_end_matches('/')))
            .map_err(|e| DashError::InvalidUrl(format!("{base_url}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("vs_currency", "usd")
            .append_pair("order", "market_cap_desc")
            .append_pair("per_page", "100")
            .append_pair("page", "1")
            .append_pair("sparkline", "true")
            .append_pair("price_change_percentage", "1h,24h,7d");
        debug!("Market data from {url}");
        Ok(HttpSource { client, url })
    }
}

impl MarketSource for HttpSource {
    fn fetch_markets(&mut self) -> Result<Vec<MarketRow>, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .map_err(|e| FetchError::Generic(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| FetchError::Generic(e.to_string()))?;
        trace!("GET {} -> {status}, {} bytes", self.url, body.len());
        markets_from_response(status, &body)
    }
}

/// Reads a `/coins/markets` response saved to disk. The file is read again on
/// every fetch so an external job can keep it current.
#[derive(Debug)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: PathBuf) -> Self {
        JsonFileSource { path }
    }
}

impl MarketSource for JsonFileSource {
    fn fetch_markets(&mut self) -> Result<Vec<MarketRow>, FetchError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| FetchError::Generic(format!("{}: {e}", self.path.display())))?;
        parse_markets(&content)
    }
}

/// A [`MarketSource`] behind a [`MarketCache`].
pub struct CachedSource<C: Clock> {
    source: Box<dyn MarketSource>,
    cache: MarketCache<Vec<MarketRow>, C>,
    last_failure: Option<Instant>,
}

impl<C: Clock> CachedSource<C> {
    pub fn new(source: Box<dyn MarketSource>, clock: C, ttl: Duration) -> Self {
        CachedSource {
            source,
            cache: MarketCache::new(clock, ttl),
            last_failure: None,
        }
    }

    /// True when there is no fresh data and no recent failed attempt.
    pub fn is_due(&self) -> bool {
        let fresh = matches!(self.cache.get(MARKETS_KEY), Some((_, true)));
        let backing_off = self
            .last_failure
            .is_some_and(|at| self.cache.now().duration_since(at) < FAILURE_RETRY);
        !fresh && !backing_off
    }

    /// Fresh cached rows, or rows fetched from the source.
    pub fn markets(&mut self) -> Result<&[MarketRow], FetchError> {
        if !matches!(self.cache.get(MARKETS_KEY), Some((_, true))) {
            match self.source.fetch_markets() {
                Ok(rows) => {
                    info!("Fetched {} markets", rows.len());
                    self.last_failure = None;
                    self.cache.put(MARKETS_KEY, rows);
                }
                Err(e) => {
                    warn!("{e}");
                    self.last_failure = Some(self.cache.now());
                    return Err(e);
                }
            }
        } else {
            debug!("Serving markets from cache");
        }
        Ok(self
            .cache
            .get(MARKETS_KEY)
            .map(|(rows, _)| rows.as_slice())
            .unwrap_or_default())
    }

    /// Forces the next [`CachedSource::markets`] call to fetch.
    pub fn invalidate(&mut self) {
        self.cache.invalidate(MARKETS_KEY);
        self.last_failure = None;
    }
}

use std::time::Duration;

use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::{header, StatusCode};
use serde::Deserialize;

use crate::config::Config;
use crate::limiter::{backoff_delay, RateLimiter};

const PER_PAGE: usize = 100;
const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RATELIMIT_WINDOW: Duration = Duration::from_secs(60);
const RATELIMIT_REMAINING_HEADER: &str = "X-Discogs-Ratelimit-Remaining";

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub value: f64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct WantlistItem {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub master_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub id: u64,
    pub price: Price,
    pub seller: String,
    pub condition: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceStats {
    #[serde(default)]
    pub num_for_sale: u32,
    #[serde(default)]
    pub lowest_price: Option<Price>,
}

// Wire shapes, converted to the public types above.

#[derive(Deserialize)]
struct WantsPage {
    pagination: Pagination,
    #[serde(default)]
    wants: Vec<Want>,
}

#[derive(Deserialize)]
struct Pagination {
    pages: u32,
}

#[derive(Deserialize)]
struct Want {
    basic_information: BasicInformation,
}

#[derive(Deserialize)]
struct BasicInformation {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    #[serde(default)]
    master_id: Option<u64>,
}

#[derive(Deserialize)]
struct ArtistRef {
    name: String,
}

impl From<Want> for WantlistItem {
    fn from(want: Want) -> Self {
        let info = want.basic_information;
        WantlistItem {
            id: info.id,
            title: info.title,
            artist: info
                .artists
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            // the API uses 0 for "no master release"
            master_id: info.master_id.filter(|&id| id != 0),
        }
    }
}

#[derive(Deserialize)]
struct ListingsPage {
    #[serde(default)]
    listings: Vec<RawListing>,
}

#[derive(Deserialize)]
struct RawListing {
    id: u64,
    price: Price,
    #[serde(default)]
    seller: Seller,
    #[serde(default)]
    condition: String,
    #[serde(default)]
    uri: String,
}

#[derive(Default, Deserialize)]
struct Seller {
    #[serde(default)]
    username: String,
}

impl From<RawListing> for Listing {
    fn from(raw: RawListing) -> Self {
        Listing {
            id: raw.id,
            price: raw.price,
            seller: raw.seller.username,
            condition: raw.condition,
            uri: raw.uri,
        }
    }
}

pub struct DiscogsClient {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl DiscogsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Discogs token={}", config.discogs_token)
                .parse()
                .wrap_err("discogs token is not a valid header value")?,
        );
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("failed to build discogs client")?;
        Ok(Self {
            http,
            base_url: config.discogs_base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::per_minute(config.requests_per_minute),
        })
    }

    pub fn fetch_wantlist(&mut self, username: &str) -> Result<Vec<WantlistItem>> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/users/{}/wants?page={}&per_page={}",
                self.base_url, username, page, PER_PAGE
            );
            let WantsPage { pagination, wants } =
                self.get(&url)?.error_for_status()?.json()?;
            let fetched = wants.len();
            items.extend(wants.into_iter().map(WantlistItem::from));
            debug!("wantlist page {page}: {fetched} item(s)");
            if pagination.pages <= page || fetched < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    pub fn fetch_stats(&mut self, release_id: u64) -> Result<MarketplaceStats> {
        let url = format!("{}/marketplace/stats/{}", self.base_url, release_id);
        let res = self.get(&url)?;
        // 404 means the release has no marketplace presence at all
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(MarketplaceStats::default());
        }
        res.error_for_status()?.json().map_err(Into::into)
    }

    pub fn fetch_listings(&mut self, release_id: u64) -> Result<Vec<Listing>> {
        let url = format!(
            "{}/marketplace/listings?release_id={}&status=For+Sale",
            self.base_url, release_id
        );
        let res = self.get(&url)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let page: ListingsPage = res.error_for_status()?.json()?;
        Ok(page.listings.into_iter().map(Listing::from).collect())
    }

    /// Issue a GET through the rate limiter, retrying a bounded number of
    /// times on 429. The wait honors `Retry-After` when present.
    fn get(&mut self, url: &str) -> Result<Response> {
        for attempt in 0..MAX_ATTEMPTS {
            self.limiter.acquire();
            let res = self.http.get(url).send()?;
            if res.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = backoff_delay(attempt, retry_after(&res));
                warn!(
                    "rate limited on {url}, retrying in {}s (attempt {})",
                    wait.as_secs(),
                    attempt + 1
                );
                self.limiter.penalize(wait);
                continue;
            }
            if ratelimit_remaining(&res) == Some(0) {
                debug!("rate-limit window exhausted, pausing requests");
                self.limiter.penalize(RATELIMIT_WINDOW);
            }
            return Ok(res);
        }
        Err(eyre!(
            "giving up on {url} after {MAX_ATTEMPTS} rate-limited attempts"
        ))
    }
}

fn retry_after(res: &Response) -> Option<Duration> {
    let secs: u64 = res
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs))
}

fn ratelimit_remaining(res: &Response) -> Option<u32> {
    res.headers()
        .get(RATELIMIT_REMAINING_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

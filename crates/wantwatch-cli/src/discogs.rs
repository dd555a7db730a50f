//! Discogs REST adapter: the user's wantlist and per-release listing counts.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, warn};
use wantwatch_core::catalog::{PAGE_SIZE, SourceError, TrackedItemSource, collect_pages};
use wantwatch_core::config::WatchConfig;
use wantwatch_core::fetch::{ListingSource, UpstreamError};
use wantwatch_core::model::{ItemId, TrackedItem};
use wantwatch_core::retry::RetryPolicy;

const RELEASE_URL: &str = "https://www.discogs.com/release";

#[derive(Debug, Deserialize)]
struct WantsPage {
    #[serde(default)]
    wants: Vec<Want>,
}

#[derive(Debug, Deserialize)]
struct Want {
    basic_information: BasicInformation,
}

#[derive(Debug, Deserialize)]
struct BasicInformation {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    num_for_sale: u64,
}

impl From<Want> for TrackedItem {
    fn from(want: Want) -> Self {
        let info = want.basic_information;
        Self {
            id: ItemId::from(info.id),
            title: if info.title.is_empty() {
                "No Title".to_string()
            } else {
                info.title
            },
            artists: info
                .artists
                .iter()
                .map(|artist| clean_artist_name(&artist.name))
                .collect(),
            url: format!("{RELEASE_URL}/{}", info.id),
        }
    }
}

/// Drop the `" (2)"` suffix Discogs uses to disambiguate artist names.
fn clean_artist_name(name: &str) -> String {
    let trimmed = name.trim();
    if let Some(open) = trimmed.rfind(" (") {
        let tail = &trimmed[open + 2..];
        if let Some(digits) = tail.strip_suffix(')') {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return trimmed[..open].to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Map an HTTP error status to the upstream signal it represents.
const fn status_signal(code: u16) -> UpstreamError {
    match code {
        429 => UpstreamError::RateLimited,
        404 => UpstreamError::NotFound,
        _ => UpstreamError::Status(code),
    }
}

fn upstream_error(err: ureq::Error) -> UpstreamError {
    match err {
        ureq::Error::Status(code, _) => status_signal(code),
        ureq::Error::Transport(transport) => UpstreamError::Connection(transport.to_string()),
    }
}

/// Authenticated Discogs client, built once per process from the config.
pub struct DiscogsClient {
    agent: ureq::Agent,
    base_url: String,
    username: String,
    token: String,
    user_agent: String,
    retry: RetryPolicy,
}

impl DiscogsClient {
    /// Build a client; `config` must already have passed validation.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let username = config
            .discogs
            .username
            .clone()
            .ok_or_else(|| anyhow::anyhow!("discogs.username is not set"))?;
        let token = config
            .discogs
            .token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("discogs.token is not set"))?;

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10).min(config.http_timeout()))
            .timeout(config.http_timeout())
            .build();

        Ok(Self {
            agent,
            base_url: config.discogs.base_url.trim_end_matches('/').to_string(),
            username,
            token,
            user_agent: config.discogs.user_agent.clone(),
            retry: config.retry_policy(),
        })
    }

    fn get(&self, url: &str) -> Result<ureq::Response, ureq::Error> {
        self.agent
            .get(url)
            .set("Authorization", &format!("Discogs token={}", self.token))
            .set("User-Agent", &self.user_agent)
            .set("Accept", "application/json")
            .call()
    }

    fn wants_url(&self, page: u32) -> String {
        format!(
            "{}/users/{}/wants?page={page}&per_page={PAGE_SIZE}",
            self.base_url,
            encode_path_segment(&self.username)
        )
    }

    fn release_url(&self, id: &ItemId) -> String {
        format!(
            "{}/releases/{}",
            self.base_url,
            encode_path_segment(id.as_str())
        )
    }

    /// One wantlist page, single attempt.
    fn wants_page(&self, page: u32) -> Result<Vec<TrackedItem>, UpstreamError> {
        let response = self.get(&self.wants_url(page)).map_err(upstream_error)?;
        let parsed: WantsPage = response
            .into_json()
            .map_err(|err| UpstreamError::Malformed(err.to_string()))?;
        debug!(page, wants = parsed.wants.len(), "wantlist page fetched");
        Ok(parsed.wants.into_iter().map(TrackedItem::from).collect())
    }
}

/// Page through the wantlist. Each page is retried on rate limits and
/// connection failures; a page that still fails aborts the whole read.
fn read_wantlist<F>(retry: &RetryPolicy, fetch_page: F) -> Result<Vec<TrackedItem>, SourceError>
where
    F: Fn(u32) -> Result<Vec<TrackedItem>, UpstreamError>,
{
    collect_pages(PAGE_SIZE, |page| {
        retry
            .run(
                |attempt| {
                    fetch_page(page).inspect_err(|err| {
                        warn!(page, attempt, error = %err, "wantlist page failed");
                    })
                },
                UpstreamError::is_transient,
            )
            .map_err(|(attempts, err)| {
                SourceError(format!(
                    "wantlist page {page}: {err} (after {attempts} attempt(s))"
                ))
            })
    })
}

impl TrackedItemSource for DiscogsClient {
    fn tracked_items(&self) -> Result<Vec<TrackedItem>, SourceError> {
        read_wantlist(&self.retry, |page| self.wants_page(page))
    }
}

impl ListingSource for DiscogsClient {
    fn listing_count(&self, id: &ItemId) -> Result<u64, UpstreamError> {
        let response = self.get(&self.release_url(id)).map_err(upstream_error)?;
        response
            .into_json::<Release>()
            .map(|release| release.num_for_sale)
            .map_err(|err| UpstreamError::Malformed(err.to_string()))
    }
}

fn encode_path_segment(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());

    for byte in raw.bytes() {
        let is_safe = byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte == b'.';
        if is_safe {
            encoded.push(char::from(byte));
        } else {
            push_percent_encoded_byte(&mut encoded, byte);
        }
    }

    encoded
}

fn push_percent_encoded_byte(buffer: &mut String, byte: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    buffer.push('%');
    buffer.push(char::from(HEX[(byte >> 4) as usize]));
    buffer.push(char::from(HEX[(byte & 0x0F) as usize]));
}

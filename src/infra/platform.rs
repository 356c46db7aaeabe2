//! Upstream video platform API client.
//!
//! Wraps the platform's paginated playlist-item listing and batched video
//! details endpoints. Every call is quota-metered upstream, so each one is
//! counted through the metrics facade.

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::application::retry::TransientError;
use crate::domain::entities::VideoStatistics;
use crate::domain::types::PrivacyStatus;

/// Fixed page size for playlist-item listing.
pub const PLAYLIST_PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },
    #[error("upstream response could not be decoded: {0}")]
    Decode(String),
}

impl TransientError for UpstreamError {
    fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Transport(_) => true,
            UpstreamError::Status { status } => *status == 429 || *status >= 500,
            UpstreamError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// One page of playlist membership.
#[derive(Debug, Clone, Default)]
pub struct PlaylistItemsPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Full metadata for one video as returned by the details endpoint.
#[derive(Debug, Clone)]
pub struct VideoDetails {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: OffsetDateTime,
    pub statistics: VideoStatistics,
    pub duration_seconds: i64,
    pub privacy: PrivacyStatus,
    pub tags: Vec<String>,
}

/// Seam between the sync engine and the remote platform; production uses
/// [`PlatformClient`], tests substitute fakes.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemsPage, UpstreamError>;

    async fn fetch_video_details(
        &self,
        video_ids: &[String],
    ) -> Result<Vec<VideoDetails>, UpstreamError>;
}

pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PlatformClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl VideoPlatform for PlatformClient {
    async fn list_playlist_items(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemsPage, UpstreamError> {
        counter!("vodsync_platform_list_calls_total").increment(1);

        let mut query = vec![
            ("part", "contentDetails".to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", PLAYLIST_PAGE_SIZE.to_string()),
            ("key", self.api_key.clone()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/playlistItems", self.base_url))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body: RawPlaylistItemsResponse = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(err.to_string()))?;

        Ok(PlaylistItemsPage {
            video_ids: body
                .items
                .into_iter()
                .map(|item| item.content_details.video_id)
                .collect(),
            next_page_token: body.next_page_token,
        })
    }

    async fn fetch_video_details(
        &self,
        video_ids: &[String],
    ) -> Result<Vec<VideoDetails>, UpstreamError> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }
        counter!("vodsync_platform_detail_calls_total").increment(1);

        let response = self
            .http
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet,statistics,contentDetails,status"),
                ("id", &video_ids.join(",")),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body: RawVideosResponse = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(err.to_string()))?;

        body.items.into_iter().map(VideoDetails::try_from).collect()
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlaylistItemsResponse {
    #[serde(default)]
    items: Vec<RawPlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlaylistItem {
    content_details: RawContentRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContentRef {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct RawVideosResponse {
    #[serde(default)]
    items: Vec<RawVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideo {
    id: String,
    snippet: RawSnippet,
    #[serde(default)]
    statistics: RawStatistics,
    content_details: RawVideoContentDetails,
    #[serde(default)]
    status: RawStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatistics {
    #[serde(default)]
    view_count: Option<String>,
    #[serde(default)]
    like_count: Option<String>,
    #[serde(default)]
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVideoContentDetails {
    duration: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    #[serde(default)]
    privacy_status: Option<String>,
}

impl TryFrom<RawVideo> for VideoDetails {
    type Error = UpstreamError;

    fn try_from(raw: RawVideo) -> Result<Self, Self::Error> {
        let published_at = OffsetDateTime::parse(&raw.snippet.published_at, &Rfc3339)
            .map_err(|err| {
                UpstreamError::Decode(format!(
                    "invalid publishedAt `{}`: {err}",
                    raw.snippet.published_at
                ))
            })?;

        let duration_seconds = parse_iso8601_duration(&raw.content_details.duration)
            .ok_or_else(|| {
                UpstreamError::Decode(format!(
                    "invalid duration `{}`",
                    raw.content_details.duration
                ))
            })?;

        Ok(VideoDetails {
            video_id: raw.id,
            title: raw.snippet.title,
            description: raw.snippet.description,
            published_at,
            statistics: VideoStatistics {
                view_count: parse_count(raw.statistics.view_count.as_deref()),
                like_count: parse_count(raw.statistics.like_count.as_deref()),
                comment_count: parse_count(raw.statistics.comment_count.as_deref()),
            },
            duration_seconds,
            privacy: parse_privacy(raw.status.privacy_status.as_deref()),
            tags: raw.snippet.tags,
        })
    }
}

// The platform serializes counters as decimal strings.
fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn parse_privacy(value: Option<&str>) -> PrivacyStatus {
    match value {
        Some("unlisted") => PrivacyStatus::Unlisted,
        Some("private") => PrivacyStatus::Private,
        _ => PrivacyStatus::Public,
    }
}

/// Parse an ISO-8601 duration of the forms the platform emits
/// (`PT#H#M#S`, `P#DT#H#M#S`) into whole seconds.
fn parse_iso8601_duration(value: &str) -> Option<i64> {
    let rest = value.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    let mut seconds: i64 = 0;
    let mut number = String::new();

    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else if ch == 'D' {
            seconds += number.parse::<i64>().ok()? * 86_400;
            number.clear();
        } else {
            return None;
        }
    }
    if !number.is_empty() {
        return None;
    }

    for ch in time_part.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            let unit = match ch {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return None,
            };
            seconds += number.parse::<i64>().ok()? * unit;
            number.clear();
        }
    }
    if !number.is_empty() {
        return None;
    }

    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT1M30S"), Some(90));
        assert_eq!(parse_iso8601_duration("PT2H3M4S"), Some(7384));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("PT0S"), Some(0));
        assert_eq!(parse_iso8601_duration("nonsense"), None);
        assert_eq!(parse_iso8601_duration("PT15"), None);
    }

    #[test]
    fn transient_classification() {
        assert!(UpstreamError::Status { status: 429 }.is_transient());
        assert!(UpstreamError::Status { status: 500 }.is_transient());
        assert!(UpstreamError::Status { status: 503 }.is_transient());
        assert!(!UpstreamError::Status { status: 403 }.is_transient());
        assert!(!UpstreamError::Status { status: 404 }.is_transient());
        assert!(UpstreamError::Transport("reset".into()).is_transient());
        assert!(!UpstreamError::Decode("bad json".into()).is_transient());
    }

    #[test]
    fn count_strings_tolerate_absence() {
        assert_eq!(parse_count(Some("12345")), 12_345);
        assert_eq!(parse_count(Some("not-a-number")), 0);
        assert_eq!(parse_count(None), 0);
    }
}

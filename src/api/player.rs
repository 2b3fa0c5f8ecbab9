// Player read endpoints: recently played and currently playing.
//
// Provider payloads are reduced to a flat summary; every missing field has a
// fallback so a partial provider response still renders.

use super::{authorize, with_cookies, AppError, AppState};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

const RECENT_PATH: &str = "me/player/recently-played?limit=20";
const NOW_PLAYING_PATH: &str = "me/player/currently-playing";

const RECENT_FAILURE: &str = "failed_to_fetch_recent_tracks";
const NOW_PLAYING_FAILURE: &str = "failed_to_fetch_now_playing";

const UNKNOWN: &str = "unknown";

// Provider shapes, lenient about missing and null fields

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
struct ProviderRecent {
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<ProviderPlay>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPlay {
    #[serde(default)]
    played_at: Option<String>,
    #[serde(default)]
    track: Option<ProviderTrack>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderCurrentlyPlaying {
    #[serde(default, deserialize_with = "null_as_default")]
    is_playing: bool,
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<ProviderTrack>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderTrack {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    artists: Vec<ProviderNamed>,
    #[serde(default)]
    album: Option<ProviderAlbum>,
    #[serde(default)]
    external_urls: Option<ProviderExternalUrls>,
    #[serde(default)]
    duration_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderNamed {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderAlbum {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    images: Vec<ProviderImage>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderImage {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

/// Display-ready track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub track_name: String,
    /// Artist names joined with ", "
    pub artists: String,
    pub album: String,
    pub album_image: Option<String>,
    pub external_url: Option<String>,
    pub duration_ms: u64,
}

impl From<ProviderTrack> for TrackSummary {
    fn from(track: ProviderTrack) -> Self {
        let (album, album_image) = match track.album {
            Some(album) => {
                // Prefer the medium-sized image, fall back to the largest
                let image = [1, 0]
                    .into_iter()
                    .find_map(|i| album.images.get(i).and_then(|img| img.url.clone()));
                (album.name, image)
            }
            None => (None, None),
        };

        Self {
            track_name: non_empty_or_unknown(track.name),
            artists: track
                .artists
                .into_iter()
                .filter_map(|artist| artist.name)
                .collect::<Vec<_>>()
                .join(", "),
            album: non_empty_or_unknown(album),
            album_image,
            external_url: track.external_urls.and_then(|urls| urls.spotify),
            duration_ms: track.duration_ms.unwrap_or(0),
        }
    }
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// One recently played entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentItem {
    pub played_at: Option<String>,
    #[serde(flatten)]
    pub track: TrackSummary,
}

/// GET /api/recent response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentResponse {
    pub items: Vec<RecentItem>,
    /// RFC 3339 UTC timestamp of the fetch
    pub fetched_at: String,
}

/// GET /api/now-playing response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingResponse {
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_ms: Option<u64>,
    pub item: Option<TrackSummary>,
}

impl From<Option<ProviderCurrentlyPlaying>> for NowPlayingResponse {
    fn from(payload: Option<ProviderCurrentlyPlaying>) -> Self {
        match payload {
            Some(ProviderCurrentlyPlaying {
                is_playing,
                progress_ms,
                item: Some(item),
            }) => Self {
                is_playing,
                progress_ms: Some(progress_ms.unwrap_or(0)),
                item: Some(item.into()),
            },
            // Nothing playing, or an ad/episode with no track item
            _ => Self {
                is_playing: false,
                progress_ms: None,
                item: None,
            },
        }
    }
}

/// Recently played tracks.
///
/// GET /api/recent
pub async fn recent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authorize(&state, &headers, RECENT_FAILURE).await?;

    let recent = state
        .provider
        .get_json::<ProviderRecent>(RECENT_PATH, &auth.access_token, false)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to fetch recently played tracks");
            AppError::Failed {
                code: RECENT_FAILURE,
                set_cookies: auth.set_cookies.clone(),
            }
        })?
        .unwrap_or_default();

    let items: Vec<RecentItem> = recent
        .items
        .into_iter()
        .map(|play| RecentItem {
            played_at: play.played_at,
            track: play.track.unwrap_or_default().into(),
        })
        .collect();

    debug!(count = items.len(), "Fetched recently played tracks");

    let body = RecentResponse {
        items,
        fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Ok(private(Json(body).into_response(), &auth.set_cookies))
}

/// Currently playing track.
///
/// GET /api/now-playing
pub async fn now_playing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authorize(&state, &headers, NOW_PLAYING_FAILURE).await?;

    let payload = state
        .provider
        .get_json::<ProviderCurrentlyPlaying>(NOW_PLAYING_PATH, &auth.access_token, true)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to fetch currently playing track");
            AppError::Failed {
                code: NOW_PLAYING_FAILURE,
                set_cookies: auth.set_cookies.clone(),
            }
        })?;

    let body = NowPlayingResponse::from(payload);
    Ok(private(Json(body).into_response(), &auth.set_cookies))
}

/// Mark a per-user response uncacheable and attach any session rewrite.
fn private(mut response: Response, cookies: &[String]) -> Response {
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-store"),
    );
    with_cookies(response, cookies)
}

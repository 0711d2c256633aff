//! Media Reference Resolver
//!
//! Turns user-supplied locators into stable media identifiers. Everything
//! here is pure and infallible: malformed input is handed back untouched.

use url::Url;

/// Host of the short-form sharing locator
const SHORT_HOST: &str = "youtu.be";

/// Canonical watch endpoint used for rewritten short links
const WATCH_BASE: &str = "https://www.youtube.com/watch?v=";

/// Query parameters added by share sheets; they never identify the media
const TRACKING_PARAMS: &[&str] = &["si", "feature"];

/// Length of a catalog video id
const VIDEO_ID_LEN: usize = 11;

/// Canonicalize a locator before it is sent in a CHANGE_URL event
///
/// - `https://youtu.be/<id>` becomes `https://www.youtube.com/watch?v=<id>`
/// - canonical-domain locators lose their tracking parameters, keeping `v`
///   and everything else
/// - anything else, including unparseable input, is returned unchanged
pub fn canonicalize(locator: &str) -> String {
    let trimmed = locator.trim();
    let mut parsed = match Url::parse(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => return locator.to_string(),
    };

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return locator.to_string(),
    };

    if host == SHORT_HOST {
        let id = parsed.path().trim_start_matches('/');
        let id = id.split('/').next().unwrap_or_default();
        if id.is_empty() {
            return locator.to_string();
        }
        return format!("{}{}", WATCH_BASE, id);
    }

    if host.ends_with("youtube.com") {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let kept: Vec<&(String, String)> = pairs
            .iter()
            .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_str()))
            .collect();

        if kept.len() == pairs.len() {
            return trimmed.to_string();
        }

        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(kept);
        }
        return parsed.to_string();
    }

    locator.to_string()
}

/// Extract the catalog video id from a locator
///
/// Recognizes watch, short, `embed/`, `v/`, `shorts/` and `live/` forms.
/// Returns `None` when no well-formed id is present, which the participant
/// surfaces as the "invalid media" state.
pub fn video_id(locator: &str) -> Option<String> {
    let parsed = Url::parse(locator.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let candidate = if host == SHORT_HOST {
        parsed.path_segments()?.next().map(str::to_string)
    } else if host.ends_with("youtube.com") || host.ends_with("youtube-nocookie.com") {
        let from_query = parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned());
        match from_query {
            Some(id) => Some(id),
            None => {
                let mut segments = parsed.path_segments()?;
                match segments.next() {
                    Some("embed") | Some("v") | Some("shorts") | Some("live") => {
                        segments.next().map(str::to_string)
                    }
                    _ => None,
                }
            }
        }
    } else {
        None
    };

    candidate.filter(|id| is_valid_video_id(id))
}

fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Search box input starting with `http` is a locator, not a catalog query
pub fn looks_like_url(input: &str) -> bool {
    input.trim_start().starts_with("http")
}

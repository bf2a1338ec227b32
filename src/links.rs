//! Track and playlist link parsing.

use url::Url;

const LINK_HOST: &str = "open.spotify.com";
const TRACK_BASE: &str = "https://open.spotify.com/track/";

/// Track id from a link like `https://open.spotify.com/track/<id>?si=...`.
pub fn extract_track_id(url: &str) -> Option<String> {
    id_after_segment(url, "track")
}

/// Playlist id from a link like `https://open.spotify.com/playlist/<id>`.
pub fn extract_playlist_id(url: &str) -> Option<String> {
    id_after_segment(url, "playlist")
}

/// Whether `url` points at a single track.
pub fn is_track_link(url: &str) -> bool {
    extract_track_id(url).is_some()
}

/// Every track link in free text, in order of appearance, with surrounding
/// brackets, quotes and sentence punctuation stripped.
pub fn find_track_links(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|token| {
            token
                .trim_start_matches(['<', '(', '"', '\''])
                .trim_end_matches(['>', ')', '"', '\'', '.', ',', ';', ':', '!', '?'])
        })
        .filter(|token| is_track_link(token))
        .collect()
}

pub fn track_url(track_id: &str) -> String {
    format!("{}{}", TRACK_BASE, track_id)
}

/// Parse `text` as an http(s) link on the streaming host.
fn parse_link(text: &str) -> Option<Url> {
    let url = Url::parse(text).ok()?;
    let web = matches!(url.scheme(), "https" | "http");
    (web && url.host_str() == Some(LINK_HOST)).then_some(url)
}

fn id_after_segment(url: &str, kind: &str) -> Option<String> {
    let url = parse_link(url)?;
    let mut segments = url.path_segments()?;
    segments.by_ref().find(|segment| *segment == kind)?;

    // Ids are base62; anything after them is punctuation glued on by chat.
    let id: String = segments
        .next()?
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    (!id.is_empty()).then_some(id)
}

//! Canonical blogger identifiers.
//!
//! A blogger is keyed by the lowercase account id found in a profile or post
//! URL. Two URL shapes carry it:
//!
//! | Shape | Example |
//! |-------|---------|
//! | `blogId` query parameter | `https://blog.naver.com/PostView.naver?blogId=abc&logNo=1` |
//! | first path segment | `https://blog.naver.com/abc/223456789` |
//!
//! The parameter wins over the path. Path segments naming system pages
//! (`PostView.naver`, `BlogList`, `prologue`, ...) are not accounts.

use crate::models::SearchResultItem;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

const BLOG_HOSTS: [&str; 2] = ["blog.naver.com", "m.blog.naver.com"];
const PROFILE_ID_PARAM: &str = "blogid";

/// First path segments that name system pages rather than accounts.
const SYSTEM_PATHS: [&str; 8] = [
    "postview",
    "postlist",
    "bloglist",
    "prologue",
    "postview.naver",
    "postlist.naver",
    "postview.nhn",
    "postlist.nhn",
];

static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Leading run of id characters, lowercased; `None` when empty.
fn clean_id(raw: &str) -> Option<String> {
    let id: String = raw.chars().take_while(|c| is_id_char(*c)).collect();
    (!id.is_empty()).then(|| id.to_lowercase())
}

fn parse_loose(input: &str) -> Option<Url> {
    Url::parse(input)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{input}")).ok())
}

/// Extract the id from one URL, or `None`.
fn id_from_url(input: &str) -> Option<String> {
    let url = parse_loose(input.trim())?;

    if let Some(id) = url
        .query_pairs()
        .find(|(k, _)| k.eq_ignore_ascii_case(PROFILE_ID_PARAM))
        .and_then(|(_, v)| clean_id(&v))
    {
        return Some(id);
    }

    let host = url.host_str()?.to_ascii_lowercase();
    if !BLOG_HOSTS.contains(&host.as_str()) {
        return None;
    }
    let segment = url.path_segments()?.next()?;
    let id = clean_id(segment)?;
    (!SYSTEM_PATHS.contains(&id.as_str())).then_some(id)
}

/// First id found among `urls`, tried in order.
pub fn canonical_blogger_id<'a, I>(urls: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    urls.into_iter()
        .filter(|u| !u.trim().is_empty())
        .find_map(id_from_url)
}

/// Id of a search hit, preferring the author profile link over the post link.
pub fn blogger_id_from_item(item: &SearchResultItem) -> Option<String> {
    canonical_blogger_id(
        item.author_link
            .as_deref()
            .into_iter()
            .chain(std::iter::once(item.link.as_str())),
    )
}

/// Id from user input: a bare account id, or any URL shape above.
pub fn extract_blogger_id(url_or_id: &str) -> Option<String> {
    let text = url_or_id.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_ascii_lowercase();
    if BARE_ID.is_match(text) && !BLOG_HOSTS.contains(&lower.as_str()) {
        return Some(lower);
    }
    canonical_blogger_id([text])
}

pub fn blog_url_from_id(blogger_id: &str) -> String {
    format!("https://blog.naver.com/{blogger_id}")
}

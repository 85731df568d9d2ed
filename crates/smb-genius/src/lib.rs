//! Genius adapter: song search through the API, lyrics scraped from the song page.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use smb_core::{errors::Error, providers::LyricsProvider, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://api.genius.com";

const LYRICS_CONTAINER: &str = r#"data-lyrics-container="true""#;
const EXCLUDED_FROM_SELECTION: &str = r#"data-exclude-from-selection="true""#;

#[derive(Clone, Debug)]
pub struct GeniusConfig {
    pub access_token: String,
    pub api_base_url: String,
    pub http_timeout: Duration,
}

impl GeniusConfig {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GeniusClient {
    http: reqwest::Client,
    cfg: GeniusConfig,
}

fn req_err(e: reqwest::Error) -> Error {
    Error::External(format!("genius request error: {e}"))
}

impl GeniusClient {
    pub fn new(cfg: GeniusConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| Error::Config(format!("genius http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    /// URL of the best matching song page, if any.
    async fn search(&self, query: &str) -> Result<Option<String>> {
        let res = self
            .http
            .get(format!("{}/search", self.cfg.api_base_url.trim_end_matches('/')))
            .bearer_auth(&self.cfg.access_token)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(req_err)?;

        let status = res.status();
        if !status.is_success() {
            return Err(Error::External(format!("genius search returned {status}")));
        }
        let body: Value = res.json().await.map_err(req_err)?;
        Ok(first_song_url(&body))
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let res = self.http.get(url).send().await.map_err(req_err)?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::External(format!("genius page returned {status}")));
        }
        res.text().await.map_err(req_err)
    }
}

#[async_trait]
impl LyricsProvider for GeniusClient {
    async fn lyrics(&self, song_name: &str, artists: &str) -> Result<Option<String>> {
        let query = format!("{song_name} {artists}");
        let Some(url) = self.search(query.trim()).await? else {
            debug!(query = %query, "no genius song hit");
            return Ok(None);
        };
        debug!(url = %url, "fetching genius lyrics page");
        let page = self.fetch_page(&url).await?;
        Ok(extract_lyrics(&page))
    }
}

fn first_song_url(search: &Value) -> Option<String> {
    search
        .pointer("/response/hits")?
        .as_array()?
        .iter()
        .find(|hit| hit.get("type").and_then(Value::as_str) == Some("song"))?
        .pointer("/result/url")?
        .as_str()
        .map(str::to_string)
}

/// Byte offsets of one `<div ...>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DivSpan {
    outer_start: usize,
    inner_start: usize,
    inner_end: usize,
    outer_end: usize,
}

/// Every `<div>` whose opening tag contains `marker`, outermost matches only.
fn div_spans(html: &str, marker: &str) -> Vec<DivSpan> {
    let mut spans = Vec::new();
    let mut from = 0usize;

    while let Some(rel) = html[from..].find(marker) {
        let at = from + rel;
        let Some(outer_start) = html[..at].rfind("<div") else {
            from = at + marker.len();
            continue;
        };
        let Some(gt) = html[at..].find('>') else {
            break;
        };
        let inner_start = at + gt + 1;

        let mut depth = 1usize;
        let mut pos = inner_start;
        let mut inner_end = None;
        while inner_end.is_none() {
            let next_open = html[pos..].find("<div").map(|i| pos + i);
            let next_close = html[pos..].find("</div").map(|i| pos + i);
            match (next_open, next_close) {
                (Some(open), Some(close)) if open < close => {
                    depth += 1;
                    pos = open + "<div".len();
                }
                (_, Some(close)) => {
                    depth -= 1;
                    if depth == 0 {
                        inner_end = Some(close);
                    }
                    pos = close + "</div".len();
                }
                (_, None) => break,
            }
        }

        // Unbalanced markup: stop rather than guess.
        let Some(inner_end) = inner_end else {
            break;
        };
        let outer_end = html[inner_end..]
            .find('>')
            .map_or(html.len(), |i| inner_end + i + 1);
        spans.push(DivSpan {
            outer_start,
            inner_start,
            inner_end,
            outer_end,
        });
        from = outer_end;
    }

    spans
}

fn br_regex() -> &'static Regex {
    static BR_RE: OnceLock<Regex> = OnceLock::new();
    BR_RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Plain-text lyrics from a Genius song page, `None` if the page has none.
pub fn extract_lyrics(page: &str) -> Option<String> {
    let parts: Vec<String> = div_spans(page, LYRICS_CONTAINER)
        .into_iter()
        .map(|span| {
            let inner = &page[span.inner_start..span.inner_end];
            html_to_text(&without_excluded(inner))
        })
        .collect();

    let text = parts.join("\n");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn without_excluded(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0usize;
    for span in div_spans(html, EXCLUDED_FROM_SELECTION) {
        out.push_str(&html[last..span.outer_start]);
        last = span.outer_end;
    }
    out.push_str(&html[last..]);
    out
}

fn html_to_text(html: &str) -> String {
    let with_breaks = br_regex().replace_all(html, "\n");
    let stripped = tag_regex().replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        response::{Html, IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::collections::HashMap;

    use super::*;

    const PAGE: &str = r#"<html><body>
<div class="Header">Song Title</div>
<div data-lyrics-container="true" class="Lyrics__Container"><div data-exclude-from-selection="true"><span>3 Contributors</span><div>Song Lyrics</div></div>[Verse 1]<br/>Don&#x27;t stop<br>Rock &amp; roll</div>
<div class="Ad"><div>buy now</div></div>
<div data-lyrics-container="true" class="Lyrics__Container"><a href="/x"><span>[Chorus]</span></a><br/>&quot;Hey&quot; &#8212; <i>yeah</i></div>
</body></html>"#;

    #[test]
    fn extracts_all_containers_in_order() {
        assert_eq!(
            extract_lyrics(PAGE).as_deref(),
            Some("[Verse 1]\nDon't stop\nRock & roll\n[Chorus]\n\"Hey\" \u{2014} yeah")
        );
    }

    #[test]
    fn page_without_lyrics_is_none() {
        assert_eq!(extract_lyrics("<div class=\"x\">instrumental</div>"), None);
        assert_eq!(
            extract_lyrics(r#"<div data-lyrics-container="true">  <br/> </div>"#),
            None
        );
    }

    #[test]
    fn nested_divs_stay_inside_container() {
        let spans = div_spans(
            r#"<div data-lyrics-container="true"><div>a</div>b</div><div>c</div>"#,
            LYRICS_CONTAINER,
        );
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].inner_start, 34);
    }

    #[test]
    fn unknown_entities_are_left_alone() {
        assert_eq!(decode_entities("a & b &bogus; &#65;"), "a & b &bogus; A");
    }

    #[test]
    fn first_song_hit_wins() {
        let body = json!({
            "response": { "hits": [
                { "type": "album", "result": { "url": "https://genius.com/albums/x" } },
                { "type": "song", "result": { "url": "https://genius.com/first" } },
                { "type": "song", "result": { "url": "https://genius.com/second" } }
            ]}
        });
        assert_eq!(first_song_url(&body).as_deref(), Some("https://genius.com/first"));
        assert_eq!(first_song_url(&json!({"response": {"hits": []}})), None);
    }

    async fn search(
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
        axum::extract::State(base): axum::extract::State<String>,
    ) -> Response {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer gtoken") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let hits = match q.get("q").map(String::as_str) {
            Some("Song A, B") => json!([{ "type": "song", "result": { "url": format!("{base}/song") } }]),
            Some("Broken A") => json!([{ "type": "song", "result": { "url": format!("{base}/missing") } }]),
            _ => json!([]),
        };
        Json(json!({ "meta": { "status": 200 }, "response": { "hits": hits } })).into_response()
    }

    async fn spawn_stub() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/search", get(search))
            .route("/song", get(|| async { Html(PAGE) }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn client(base: &str) -> GeniusClient {
        let mut cfg = GeniusConfig::new("gtoken".to_string());
        cfg.api_base_url = base.to_string();
        GeniusClient::new(cfg).unwrap()
    }

    #[tokio::test]
    async fn finds_lyrics_through_search_and_page() {
        let base = spawn_stub().await;
        let lyrics = client(&base).lyrics("Song", "A, B").await.unwrap().unwrap();
        assert!(lyrics.starts_with("[Verse 1]\nDon't stop"));
    }

    #[tokio::test]
    async fn no_search_hit_is_not_found() {
        let base = spawn_stub().await;
        assert_eq!(client(&base).lyrics("Unknown", "Nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_page_is_a_fetch_error() {
        let base = spawn_stub().await;
        assert!(client(&base).lyrics("Broken", "A").await.is_err());
    }
}

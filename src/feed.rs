//! Channel feed fetching and parsing
//!
//! Channels publish an Atom document (YouTube's `feeds/videos.xml`) or, for
//! other sources, RSS 2.0. Both are turned into [`Item`]s ordered newest
//! first. Parsing is lenient: a bad date sorts the entry as oldest, a bad
//! attribute is ignored, an entry with neither a URL nor an identifier is
//! dropped. Only a structurally broken document is an error.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

/// Canonical watch URL prefix used when only an identifier is known
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// An entry discovered in a channel feed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    /// Remote item identifier (video id), when known
    pub id: Option<String>,
    /// Entry title
    pub title: Option<String>,
    /// Publication time; `None` when missing or unparseable
    pub published: Option<DateTime<Utc>>,
    /// URL handed to the fetch tool
    pub url: String,
}

impl Item {
    /// Ordering key: the publication time, or the epoch when unknown
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.published.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Parse a feed document and return its items newest first
///
/// `limit` keeps only the newest N items after sorting (0 = keep all).
pub fn parse_feed(content: &str, limit: usize) -> Result<Vec<Item>> {
    let mut items = match root_element(content)?.as_str() {
        "feed" => parse_atom(content)?,
        "rss" | "RDF" => parse_rss(content)?,
        other => {
            return Err(Error::FeedParse(format!(
                "unsupported document root <{other}>"
            )));
        }
    };

    order_items(&mut items, limit);
    Ok(items)
}

/// Sort newest first and truncate to `limit` (0 = no truncation)
///
/// The sort is stable, so entries with equal (or equally missing) timestamps
/// keep document order.
pub fn order_items(items: &mut Vec<Item>, limit: usize) {
    items.sort_by_key(|item| std::cmp::Reverse(item.sort_key()));
    if limit > 0 {
        items.truncate(limit);
    }
}

/// Parse an RFC 3339 or RFC 2822 timestamp
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extract the `v` query parameter from a watch URL
pub fn video_id_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn watch_url(id: &str) -> String {
    format!("{WATCH_URL_PREFIX}{}", urlencoding::encode(id))
}

fn root_element(content: &str) -> Result<String> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(Error::FeedParse("document has no root element".into())),
            Err(e) => return Err(Error::FeedParse(e.to_string())),
            Ok(_) => {}
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AtomField {
    Id,
    VideoId,
    Title,
    Published,
    Updated,
}

#[derive(Debug, Default)]
struct AtomEntry {
    atom_id: Option<String>,
    video_id: Option<String>,
    title: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    watch_link: Option<String>,
    alternate_link: Option<String>,
}

impl AtomEntry {
    fn set(&mut self, field: AtomField, text: String) {
        let slot = match field {
            AtomField::Id => &mut self.atom_id,
            AtomField::VideoId => &mut self.video_id,
            AtomField::Title => &mut self.title,
            AtomField::Published => &mut self.published,
            AtomField::Updated => &mut self.updated,
        };
        // first occurrence wins; nested media:title etc. come later
        if slot.is_none() && !text.trim().is_empty() {
            *slot = Some(text.trim().to_string());
        }
    }

    fn add_link(&mut self, e: &BytesStart<'_>) {
        let mut rel = None;
        let mut href = None;
        for attr in e.attributes().flatten() {
            let Ok(value) = attr.unescape_value() else {
                continue;
            };
            match attr.key.local_name().as_ref() {
                b"rel" => rel = Some(value.into_owned()),
                b"href" => href = Some(value.into_owned()),
                _ => {}
            }
        }

        let Some(href) = href.filter(|h| !h.trim().is_empty()) else {
            return;
        };
        // Atom's default relation is "alternate"
        if rel.as_deref().unwrap_or("alternate") != "alternate" {
            return;
        }
        if href.contains("watch?v=") {
            self.watch_link.get_or_insert(href);
        } else {
            self.alternate_link.get_or_insert(href);
        }
    }

    fn finish(self) -> Option<Item> {
        let id = self
            .video_id
            .or_else(|| {
                self.atom_id
                    .as_deref()
                    .and_then(|id| id.strip_prefix("yt:video:"))
                    .map(str::to_string)
            })
            .or_else(|| self.watch_link.as_deref().and_then(video_id_from_url));

        let url = self
            .watch_link
            .or_else(|| id.as_deref().map(watch_url))
            .or(self.alternate_link)?;

        let published = self
            .published
            .as_deref()
            .or(self.updated.as_deref())
            .and_then(parse_timestamp);

        Some(Item {
            id,
            title: self.title,
            published,
            url,
        })
    }
}

fn parse_atom(content: &str) -> Result<Vec<Item>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut entry: Option<AtomEntry> = None;
    let mut field: Option<AtomField> = None;
    let mut dropped = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                field = None;
                match e.local_name().as_ref() {
                    b"entry" => entry = Some(AtomEntry::default()),
                    b"link" => {
                        if let Some(current) = entry.as_mut() {
                            current.add_link(&e);
                        }
                    }
                    name if entry.is_some() => {
                        field = match name {
                            b"id" => Some(AtomField::Id),
                            b"videoId" => Some(AtomField::VideoId),
                            b"title" => Some(AtomField::Title),
                            b"published" => Some(AtomField::Published),
                            b"updated" => Some(AtomField::Updated),
                            _ => None,
                        };
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link"
                    && let Some(current) = entry.as_mut()
                {
                    current.add_link(&e);
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    match t.unescape() {
                        Ok(text) => current.set(f, text.into_owned()),
                        Err(e) => debug!(error = %e, "ignoring undecodable text in feed entry"),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    current.set(f, String::from_utf8_lossy(&c.into_inner()).into_owned());
                }
            }
            Ok(Event::End(e)) => {
                field = None;
                if e.local_name().as_ref() == b"entry"
                    && let Some(done) = entry.take()
                {
                    match done.finish() {
                        Some(item) => items.push(item),
                        None => dropped += 1,
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::FeedParse(format!(
                    "invalid Atom document at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            Ok(_) => {}
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped feed entries without url or identifier");
    }
    Ok(items)
}

fn parse_rss(content: &str) -> Result<Vec<Item>> {
    let channel = content
        .parse::<rss::Channel>()
        .map_err(|e| Error::FeedParse(format!("invalid RSS document: {e}")))?;

    let items = channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = item
                .link()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    item.guid()
                        .filter(|g| g.is_permalink() && g.value().starts_with("http"))
                        .map(|g| g.value().to_string())
                });

            let id = link
                .as_deref()
                .and_then(video_id_from_url)
                .or_else(|| {
                    item.guid()
                        .map(|g| g.value().trim())
                        .filter(|v| !v.is_empty() && !v.starts_with("http"))
                        .map(str::to_string)
                });

            let url = link.or_else(|| id.as_deref().map(watch_url))?;

            Some(Item {
                id,
                title: item.title().map(str::to_string),
                published: item.pub_date().and_then(parse_timestamp),
                url,
            })
        })
        .collect();

    Ok(items)
}

/// HTTP client for channel feed documents
#[derive(Clone, Debug)]
pub struct FeedClient {
    http: reqwest::Client,
}

impl FeedClient {
    /// Build a client with the configured timeout and User-Agent
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// GET a feed document; non-2xx statuses are errors
    pub async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "fetching channel feed");
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Fetch and parse a feed, newest `limit` items first (0 = all)
    pub async fn fetch_items(&self, url: &str, limit: usize) -> Result<Vec<Item>> {
        let content = self.fetch(url).await?;
        parse_feed(&content, limit)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ATOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
 <link rel="self" href="http://www.youtube.com/feeds/videos.xml?channel_id=UC1"/>
 <id>yt:channel:UC1</id>
 <title>Test Channel</title>
 <entry>
  <id>yt:video:jan</id>
  <yt:videoId>jan</yt:videoId>
  <title>January &amp; friends</title>
  <link rel="alternate" href="https://www.youtube.com/watch?v=jan"/>
  <published>2024-01-01T00:00:00+00:00</published>
  <media:group><media:title>ignored</media:title></media:group>
 </entry>
 <entry>
  <id>yt:video:none</id>
  <yt:videoId>none</yt:videoId>
  <title>Undated</title>
 </entry>
 <entry>
  <yt:videoId>mar</yt:videoId>
  <title>March</title>
  <published>2024-03-01T00:00:00Z</published>
 </entry>
 <entry>
  <title>Nothing usable</title>
  <published>2024-06-01T00:00:00Z</published>
 </entry>
</feed>"#;

    #[test]
    fn atom_orders_newest_first_missing_last() {
        let items = parse_feed(ATOM, 0).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["mar", "jan", "none"]);

        assert_eq!(
            items[0].published,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(items[2].published, None);
        assert_eq!(items[1].title.as_deref(), Some("January & friends"));
    }

    #[test]
    fn atom_prefers_watch_link_then_synthesizes() {
        let items = parse_feed(ATOM, 0).unwrap();
        assert_eq!(items[1].url, "https://www.youtube.com/watch?v=jan");
        assert_eq!(items[0].url, "https://www.youtube.com/watch?v=mar");
    }

    #[test]
    fn limit_keeps_newest() {
        let items = parse_feed(ATOM, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id.as_deref(), Some("mar"));
        assert_eq!(items[1].id.as_deref(), Some("jan"));
    }

    #[test]
    fn malformed_dates_sort_as_oldest() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><id>yt:video:bad</id><published>yesterday-ish</published></entry>
            <entry><id>yt:video:good</id><published>2020-05-05T10:00:00Z</published></entry>
        </feed>"#;
        let items = parse_feed(doc, 0).unwrap();
        assert_eq!(items[0].id.as_deref(), Some("good"));
        assert_eq!(items[1].id.as_deref(), Some("bad"));
        assert_eq!(items[1].sort_key(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn structurally_broken_xml_is_an_error() {
        let err = parse_feed("<feed><entry></feed>", 0).unwrap_err();
        assert!(matches!(err, Error::FeedParse(_)));

        assert!(matches!(parse_feed("", 0).unwrap_err(), Error::FeedParse(_)));
        assert!(matches!(
            parse_feed("<html><body/></html>", 0).unwrap_err(),
            Error::FeedParse(_)
        ));
    }

    #[test]
    fn empty_feed_has_no_items() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#;
        assert!(parse_feed(doc, 0).unwrap().is_empty());
    }

    #[test]
    fn rss_documents_are_supported() {
        let doc = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Other</title><link>https://example.com</link><description>d</description>
  <item>
    <title>Old</title>
    <link>https://www.youtube.com/watch?v=old1</link>
    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
  </item>
  <item>
    <title>New</title>
    <guid isPermaLink="false">new1</guid>
    <pubDate>Fri, 01 Mar 2024 00:00:00 GMT</pubDate>
  </item>
  <item><title>Nothing</title></item>
</channel></rss>"#;
        let items = parse_feed(doc, 0).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id.as_deref(), Some("new1"));
        assert_eq!(items[0].url, "https://www.youtube.com/watch?v=new1");
        assert_eq!(items[1].id.as_deref(), Some("old1"));
    }

    #[test]
    fn video_id_extraction() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=abc&t=10").as_deref(),
            Some("abc")
        );
        assert_eq!(video_id_from_url("https://example.com/x"), None);
        assert_eq!(video_id_from_url("not a url"), None);
    }

    #[tokio::test]
    async fn client_fetches_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
            .mount(&server)
            .await;

        let client = FeedClient::new(&FetchConfig::default()).unwrap();
        let items = client
            .fetch_items(&format!("{}/feed", server.uri()), 1)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_deref(), Some("mar"));
    }

    #[tokio::test]
    async fn client_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = FeedClient::new(&FetchConfig::default()).unwrap();
        let err = client
            .fetch(&format!("{}/feed", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}

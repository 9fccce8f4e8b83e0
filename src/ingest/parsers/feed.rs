// src/ingest/parsers/feed.rs
//! RSS 2.0 / RSS 1.0 (RDF) / Atom parser.
//!
//! Event-driven scan over `item` and `entry` blocks rather than a typed
//! document model: real-world feeds mix namespaces and nest markup freely, and
//! only a handful of child elements matter here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use crate::ingest::parsers::usable_url;
use crate::ingest::types::{ParseLimits, RawRecord};
use crate::ingest::{normalize_text, parse_feed_date, truncate_chars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    PubDate,
    Published,
    DcDate,
    Updated,
    Content,
    Description,
    /// A repeated field; its text is dropped.
    Ignored,
}

impl Field {
    fn from_name(qname: &[u8]) -> Option<Field> {
        Some(match qname {
            b"title" => Field::Title,
            b"link" | b"atom:link" => Field::Link,
            b"pubDate" => Field::PubDate,
            b"published" => Field::Published,
            b"dc:date" => Field::DcDate,
            b"updated" => Field::Updated,
            b"content:encoded" | b"content" => Field::Content,
            b"description" | b"summary" => Field::Description,
            _ => return None,
        })
    }
}

fn is_entry(qname: &[u8]) -> bool {
    matches!(qname, b"item" | b"entry")
}

fn is_link(qname: &[u8]) -> bool {
    matches!(qname, b"link" | b"atom:link")
}

#[derive(Debug, Default)]
struct EntryDraft {
    title: String,
    link_text: String,
    alternate_href: Option<String>,
    other_href: Option<String>,
    pub_date: String,
    published: String,
    dc_date: String,
    updated: String,
    content: String,
    description: String,
}

impl EntryDraft {
    fn buf(&mut self, f: Field) -> Option<&mut String> {
        match f {
            Field::Title => Some(&mut self.title),
            Field::Link => Some(&mut self.link_text),
            Field::PubDate => Some(&mut self.pub_date),
            Field::Published => Some(&mut self.published),
            Field::DcDate => Some(&mut self.dc_date),
            Field::Updated => Some(&mut self.updated),
            Field::Content => Some(&mut self.content),
            Field::Description => Some(&mut self.description),
            Field::Ignored => None,
        }
    }

    fn push(&mut self, f: Field, text: &str) {
        if let Some(buf) = self.buf(f) {
            buf.push_str(text);
        }
    }

    /// Open `f` unless it already holds text (first occurrence wins).
    fn open(&mut self, f: Field) -> Field {
        match self.buf(f) {
            Some(buf) if buf.trim().is_empty() => f,
            _ => Field::Ignored,
        }
    }

    /// Atom-style `<link href=".." rel=".."/>`. `alternate` (or no rel) wins.
    fn offer_href(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = html_escape::decode_html_entities(&String::from_utf8_lossy(&attr.value))
                .trim()
                .to_string();
            match attr.key.as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let Some(href) = href.filter(|h| !h.is_empty()) else {
            return;
        };
        match rel.as_deref() {
            None | Some("alternate") => {
                self.alternate_href.get_or_insert(href);
            }
            Some("self") => {}
            Some(_) => {
                self.other_href.get_or_insert(href);
            }
        }
    }

    fn finish(self, base: Option<&Url>, limits: &ParseLimits, now: DateTime<Utc>) -> Option<RawRecord> {
        let title = normalize_text(&self.title);
        let link_text = self.link_text.trim();
        let raw_link = if !link_text.is_empty() {
            Some(link_text.to_string())
        } else {
            self.alternate_href.or(self.other_href)
        };
        let url = raw_link.and_then(|l| resolve_link(&l, base));

        let (title, url) = match (title.is_empty(), url) {
            (false, Some(url)) => (title, url),
            _ => return None,
        };

        let published_at = [&self.pub_date, &self.published, &self.dc_date, &self.updated]
            .into_iter()
            .find_map(|d| parse_feed_date(d))
            .unwrap_or(now);

        let mut body = normalize_text(&self.content);
        if body.is_empty() {
            body = normalize_text(&self.description);
        }

        Some(RawRecord {
            native_id: None,
            title,
            url,
            published_at,
            summary: truncate_chars(&body, limits.summary_max_chars),
            score: None,
            comments: None,
        })
    }
}

fn resolve_link(raw: &str, base: Option<&Url>) -> Option<String> {
    if let Some(u) = usable_url(raw) {
        return Some(u);
    }
    let joined = base?.join(raw.trim()).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Parse a feed document. Malformed XML fails the whole body; individual
/// entries without a title or link are skipped.
pub fn parse(
    body: &str,
    base: Option<&Url>,
    limits: &ParseLimits,
    now: DateTime<Utc>,
) -> Result<Vec<RawRecord>> {
    let mut reader = Reader::from_str(body);
    let mut out = Vec::new();
    let mut entry: Option<EntryDraft> = None;
    // open field inside the current entry + nesting depth within it
    let mut field: Option<(Field, usize)> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("feed xml at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                if let Some((f, depth)) = field.as_mut() {
                    // nested markup (xhtml content): keep words apart
                    *depth += 1;
                    let f = *f;
                    if let Some(d) = entry.as_mut() {
                        d.push(f, " ");
                    }
                    continue;
                }
                let name = e.name();
                let qname = name.as_ref();
                if is_entry(qname) {
                    entry = Some(EntryDraft::default());
                    continue;
                }
                if let Some(d) = entry.as_mut() {
                    if is_link(qname) {
                        d.offer_href(&e);
                    }
                    if let Some(f) = Field::from_name(qname) {
                        field = Some((d.open(f), 1));
                    }
                }
            }
            Event::Empty(e) => {
                if field.is_none() && is_link(e.name().as_ref()) {
                    if let Some(d) = entry.as_mut() {
                        d.offer_href(&e);
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(d), Some((f, _))) = (entry.as_mut(), field) {
                    // XML escapes only; HTML entities are decoded once, in `normalize_text`.
                    // Undeclared entities (`&nbsp;`) fail here, so keep the raw text.
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    d.push(f, &text);
                }
            }
            Event::CData(t) => {
                if let (Some(d), Some((f, _))) = (entry.as_mut(), field) {
                    d.push(f, &String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => {
                if let Some((f, depth)) = field.as_mut() {
                    *depth -= 1;
                    if *depth == 0 {
                        field = None;
                    } else {
                        let f = *f;
                        if let Some(d) = entry.as_mut() {
                            d.push(f, " ");
                        }
                    }
                    continue;
                }
                if is_entry(e.name().as_ref()) {
                    if let Some(rec) = entry.take().and_then(|d| d.finish(base, limits, now)) {
                        out.push(rec);
                        if out.len() >= limits.max_records {
                            break;
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn rss_item_with_escaped_html_description() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Chan</title>
<item>
  <title>AT&amp;T &amp; friends</title>
  <link>https://example.com/a</link>
  <pubDate>Tue, 10 Jun 2025 04:00:00 +0000</pubDate>
  <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
</item>
</channel></rss>"#;
        let out = parse(xml, None, &ParseLimits::default(), now()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "AT&T & friends");
        assert_eq!(out[0].url, "https://example.com/a");
        assert_eq!(out[0].summary, "Hello world");
        assert_eq!(out[0].published_at.to_rfc3339(), "2025-06-10T04:00:00+00:00");
    }

    #[test]
    fn escaped_markup_in_title_is_literal_text() {
        let xml = r#"<rss><channel><item>
<title>The &amp;lt;blink&amp;gt; tag returns</title>
<link>https://example.com/blink</link>
</item></channel></rss>"#;
        let out = parse(xml, None, &ParseLimits::default(), now()).unwrap();
        assert_eq!(out[0].title, "The <blink> tag returns");
    }

    #[test]
    fn atom_entry_uses_alternate_href_and_content() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
<title>Feed title</title>
<link href="https://example.com/" rel="alternate"/>
<entry>
  <title type="html">Post</title>
  <link rel="replies" href="https://example.com/p/1#comments"/>
  <link href="https://example.com/p/1"/>
  <updated>2025-02-01T10:00:00Z</updated>
  <published>2025-01-31T10:00:00Z</published>
  <summary>short</summary>
  <content type="xhtml"><div><p>Long</p><p>body</p></div></content>
</entry>
</feed>"#;
        let out = parse(xml, None, &ParseLimits::default(), now()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://example.com/p/1");
        assert_eq!(out[0].summary, "Long body");
        assert_eq!(out[0].published_at.to_rfc3339(), "2025-01-31T10:00:00+00:00");
    }

    #[test]
    fn bad_date_falls_back_to_now_and_relative_link_resolves() {
        let xml = r#"<rss><channel><item>
<title>T</title><link>/story/9</link><pubDate>someday</pubDate>
</item></channel></rss>"#;
        let base = Url::parse("https://news.example.org/rss").unwrap();
        let out = parse(xml, Some(&base), &ParseLimits::default(), now()).unwrap();
        assert_eq!(out[0].url, "https://news.example.org/story/9");
        assert_eq!(out[0].published_at, now());
    }

    #[test]
    fn entries_without_title_or_link_are_dropped() {
        let xml = r#"<rss><channel>
<item><title>No link</title></item>
<item><link>https://example.com/x</link></item>
<item><title>Ok</title><link>https://example.com/ok</link></item>
</channel></rss>"#;
        let out = parse(xml, None, &ParseLimits::default(), now()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Ok");
    }

    #[test]
    fn caps_records_and_summary_length() {
        let mut xml = String::from("<rss><channel>");
        for i in 0..20 {
            xml.push_str(&format!(
                "<item><title>t{i}</title><link>https://e.com/{i}</link><description>{}</description></item>",
                "x".repeat(400)
            ));
        }
        xml.push_str("</channel></rss>");
        let out = parse(&xml, None, &ParseLimits::default(), now()).unwrap();
        assert_eq!(out.len(), 15);
        assert!(out.iter().all(|r| r.summary.chars().count() == 300));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let xml = "<rss><channel><item><title>x</titl></item></channel></rss>";
        assert!(parse(xml, None, &ParseLimits::default(), now()).is_err());
    }

    #[test]
    fn dublin_core_date_is_used_when_others_missing() {
        let xml = r#"<rdf:RDF xmlns:dc="http://purl.org/dc/elements/1.1/">
<item><title>R</title><link>https://e.com/r</link><dc:date>2024-12-24T08:30:00+01:00</dc:date></item>
</rdf:RDF>"#;
        let out = parse(xml, None, &ParseLimits::default(), now()).unwrap();
        assert_eq!(out[0].published_at.to_rfc3339(), "2024-12-24T07:30:00+00:00");
    }
}

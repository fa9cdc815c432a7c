use std::borrow::Cow;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::Result;

/// The parts of an RSS 2.0 `<channel>` the aggregator keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `<pubDate>` text; interpreted at ingestion time.
    pub pub_date: String,
}

enum Scope {
    Channel,
    Item,
}

/// Decode an RSS 2.0 document.
///
/// Only direct children of `<channel>` and of `<channel>/<item>` are read;
/// namespaced siblings such as `atom:link` do not match and are ignored.
/// Titles and descriptions are HTML-unescaped after XML decoding, since
/// feeds routinely double-encode entities.
pub fn parse_feed(xml: &[u8]) -> Result<RssFeed> {
    let mut reader = Reader::from_reader(xml);

    let mut feed = RssFeed::default();
    let mut has_channel = false;
    let mut current_item: Option<RssItem> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match (path.len(), name.as_slice()) {
                    (1, b"channel") => has_channel = true,
                    (2, b"item") if path[1] == b"channel" => {
                        current_item = Some(RssItem::default());
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::End(_) => {
                let closed = path.pop();
                let is_item = closed.as_deref() == Some(&b"item"[..]);
                if is_item && path.len() == 2 && path[1] == b"channel" {
                    if let Some(item) = current_item.take() {
                        feed.items.push(item);
                    }
                }
            }
            Event::Text(e) => {
                // Entities XML does not know (`&nbsp;`) are left for the HTML pass.
                let text = e
                    .unescape()
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                append_text(&mut feed, &mut current_item, &path, &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append_text(&mut feed, &mut current_item, &path, &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(anyhow::anyhow!(
            "unexpected end of document inside <{}>",
            String::from_utf8_lossy(&path[path.len() - 1])
        )
        .into());
    }
    if !has_channel {
        return Err(anyhow::anyhow!("document has no <channel> element").into());
    }

    finish_fields(&mut feed);
    Ok(feed)
}

fn scope(path: &[Vec<u8>]) -> Option<(Scope, &[u8])> {
    match path {
        [_, channel, field] if channel == b"channel" => Some((Scope::Channel, field.as_slice())),
        [_, channel, item, field] if channel == b"channel" && item == b"item" => {
            Some((Scope::Item, field.as_slice()))
        }
        _ => None,
    }
}

fn append_text(
    feed: &mut RssFeed,
    current_item: &mut Option<RssItem>,
    path: &[Vec<u8>],
    text: &str,
) {
    let slot = match scope(path) {
        Some((Scope::Channel, field)) => match field {
            b"title" => &mut feed.title,
            b"link" => &mut feed.link,
            b"description" => &mut feed.description,
            _ => return,
        },
        Some((Scope::Item, field)) => {
            let Some(item) = current_item.as_mut() else {
                return;
            };
            match field {
                b"title" => &mut item.title,
                b"link" => &mut item.link,
                b"description" => &mut item.description,
                b"pubDate" => &mut item.pub_date,
                _ => return,
            }
        }
        None => return,
    };
    slot.push_str(text);
}

/// HTML-unescape titles and descriptions, then trim every field.
fn finish_fields(feed: &mut RssFeed) {
    decode_in_place(&mut feed.title);
    decode_in_place(&mut feed.description);
    trim_in_place(&mut feed.title);
    trim_in_place(&mut feed.link);
    trim_in_place(&mut feed.description);
    for item in &mut feed.items {
        decode_in_place(&mut item.title);
        decode_in_place(&mut item.description);
        trim_in_place(&mut item.title);
        trim_in_place(&mut item.link);
        trim_in_place(&mut item.description);
        trim_in_place(&mut item.pub_date);
    }
}

fn trim_in_place(text: &mut String) {
    let trimmed = text.trim();
    if trimmed.len() != text.len() {
        *text = trimmed.to_string();
    }
}

fn decode_in_place(text: &mut String) {
    if let Cow::Owned(decoded) = html_escape::decode_html_entities(text.as_str()) {
        *text = decoded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::test_helpers::rss_document;

    #[test]
    fn parses_channel_and_items() {
        let xml = rss_document(
            "Example",
            &[
                ("First", "https://example.com/1", "Mon, 02 Jan 2006 15:04:05 -0700"),
                ("Second", "https://example.com/2", "not a date"),
            ],
        );

        let feed = parse_feed(xml.as_bytes()).unwrap();

        assert_eq!(feed.title, "Example");
        assert_eq!(feed.link, "https://example.com/");
        assert_eq!(feed.description, "Test feed");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(
            feed.items[0],
            RssItem {
                title: "First".to_string(),
                link: "https://example.com/1".to_string(),
                description: "About First".to_string(),
                pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".to_string(),
            }
        );
        assert_eq!(feed.items[1].pub_date, "not a date");
    }

    #[test]
    fn decodes_double_encoded_entities() {
        let xml = r#"<rss version="2.0"><channel>
            <title>Tom &amp;amp; Jerry</title>
            <description>&amp;lt;b&amp;gt;cartoons&amp;lt;/b&amp;gt;</description>
            <item>
                <title>Caf&amp;eacute; &amp;quot;open&amp;quot;</title>
                <link>https://example.com/cafe?a=1&amp;b=2</link>
                <description>Fish &amp;amp; chips&amp;nbsp;today</description>
            </item>
        </channel></rss>"#;

        let feed = parse_feed(xml.as_bytes()).unwrap();

        assert_eq!(feed.title, "Tom & Jerry");
        assert_eq!(feed.description, "<b>cartoons</b>");
        assert_eq!(feed.items[0].title, "Café \"open\"");
        assert_eq!(feed.items[0].description, "Fish & chips\u{a0}today");
        assert_eq!(feed.items[0].link, "https://example.com/cafe?a=1&b=2");
    }

    #[test]
    fn reads_cdata_descriptions() {
        let xml = r#"<rss><channel><title>T</title>
            <item><title>With CDATA</title>
            <description><![CDATA[<p>Hello &amp; welcome</p>]]></description></item>
        </channel></rss>"#;

        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].description, "<p>Hello & welcome</p>");
    }

    #[test]
    fn keeps_spacing_between_text_and_cdata() {
        let xml = r#"<rss><channel><title>T</title>
            <item>
                <title>
                    Tom <![CDATA[&]]> Jerry
                </title>
                <link>
                    https://example.com/tom-and-jerry
                </link>
                <pubDate> Mon, 02 Jan 2006 15:04:05 -0700 </pubDate>
            </item>
        </channel></rss>"#;

        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.items[0].title, "Tom & Jerry");
        assert_eq!(feed.items[0].link, "https://example.com/tom-and-jerry");
        assert_eq!(feed.items[0].pub_date, "Mon, 02 Jan 2006 15:04:05 -0700");
    }

    #[test]
    fn ignores_namespaced_and_nested_elements() {
        let xml = r#"<rss xmlns:atom="http://www.w3.org/2005/Atom"><channel>
            <title>T</title>
            <atom:link href="https://example.com/rss" rel="self"/>
            <atom:link>https://wrong.example/</atom:link>
            <link>https://example.com/</link>
            <image><title>Logo</title><link>https://example.com/logo.png</link></image>
            <item><title>Only</title><source><title>Elsewhere</title></source></item>
        </channel></rss>"#;

        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.title, "T");
        assert_eq!(feed.link, "https://example.com/");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title, "Only");
    }

    #[test]
    fn channel_without_items_is_valid() {
        let feed = parse_feed(b"<rss><channel><title>Empty</title></channel></rss>").unwrap();
        assert_eq!(feed.title, "Empty");
        assert!(feed.items.is_empty());
    }

    #[test]
    fn rejects_mismatched_tags() {
        let err = parse_feed(b"<rss><channel><title>Broken</channel></rss>").unwrap_err();
        assert!(matches!(err, AppError::Xml(_)));
    }

    #[test]
    fn rejects_truncated_documents() {
        assert!(parse_feed(b"<rss><channel><item><title>Cut off").is_err());
    }

    #[test]
    fn rejects_documents_without_channel() {
        let err = parse_feed(b"<html><body>Not a feed</body></html>").unwrap_err();
        assert!(err.to_string().contains("<channel>"));
    }
}

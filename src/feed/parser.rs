use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth accepted inside a feed.
const MAX_FEED_DEPTH: usize = 64;

/// Errors that make a feed document unusable as a whole.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The document parsed as XML but lacks the `<rss><channel>` structure.
    #[error("Malformed feed: {0}")]
    Malformed(String),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    Xml(String),
}

/// `<enclosure>` attributes of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: Option<String>,
    /// Byte length as written in the feed (not validated).
    pub length: Option<String>,
    pub mime_type: Option<String>,
}

/// One `<item>` as found in the feed, before any validation or cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub enclosure: Option<Enclosure>,
    /// `<itunes:duration>` hint
    pub duration: Option<String>,
}

/// Which child of `<item>` the current text belongs to.
#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
    Duration,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            b"itunes:duration" => Some(Field::Duration),
            _ => None,
        }
    }

    fn slot(self, item: &mut RawItem) -> &mut Option<String> {
        match self {
            Field::Title => &mut item.title,
            Field::Link => &mut item.link,
            Field::Description => &mut item.description,
            Field::PubDate => &mut item.pub_date,
            Field::Duration => &mut item.duration,
        }
    }
}

/// Parses RSS 2.0 markup into raw items in document order.
///
/// Only direct children of `<item>` are read; nested elements such as
/// `<itunes:image>` are skipped. Text and CDATA content of the same element
/// are concatenated. A channel with no items yields an empty vector.
///
/// # Errors
///
/// - [`FeedError::Malformed`] if the root element is not `<rss>` or it has no
///   `<channel>` child
/// - [`FeedError::Xml`] for broken markup, undecodable text, or nesting
///   deeper than the safety limit
///
/// # Security
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations; custom entities
/// surface as an unescape error instead of being resolved.
pub fn parse_feed(content: &str) -> Result<Vec<RawItem>, FeedError> {
    // Text is kept untrimmed so pieces split by CDATA or inline markup keep
    // their spaces; each field is trimmed once when its item closes.
    let mut reader = Reader::from_str(content);

    let mut items = Vec::new();
    let mut buf = Vec::new();

    let mut depth: usize = 0;
    let mut saw_root = false;
    let mut saw_channel = false;

    // Depth at which the open <item> lives, and the item being built
    let mut item_depth: Option<usize> = None;
    let mut current = RawItem::default();
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth > MAX_FEED_DEPTH {
                    return Err(FeedError::Xml(format!(
                        "nesting depth exceeds maximum of {MAX_FEED_DEPTH} levels"
                    )));
                }
                let name = e.name();
                match (depth, name.as_ref()) {
                    (1, b"rss") => saw_root = true,
                    (1, other) => {
                        return Err(FeedError::Malformed(format!(
                            "expected <rss> root, found <{}>",
                            String::from_utf8_lossy(other)
                        )));
                    }
                    (2, b"channel") => saw_channel = true,
                    (3, b"item") if saw_channel => {
                        item_depth = Some(depth);
                        current = RawItem::default();
                    }
                    _ => {
                        if item_depth.is_some_and(|d| depth == d + 1) {
                            field = Field::from_name(name.as_ref());
                            if name.as_ref() == b"enclosure" {
                                current.enclosure = Some(read_enclosure(&e, &reader)?);
                            }
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if depth == 0 {
                    return Err(FeedError::Malformed(format!(
                        "expected <rss> root, found empty <{}/>",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                if depth == 1 && e.name().as_ref() == b"channel" {
                    saw_channel = true;
                }
                if item_depth.is_some_and(|d| depth == d) && e.name().as_ref() == b"enclosure" {
                    current.enclosure = Some(read_enclosure(&e, &reader)?);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(f) = field {
                    let text = t.unescape().map_err(|e| FeedError::Xml(e.to_string()))?;
                    append(f.slot(&mut current), &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(f) = field {
                    let text = String::from_utf8_lossy(&c);
                    append(f.slot(&mut current), &text);
                }
            }
            Ok(Event::End(_)) => {
                if item_depth == Some(depth) {
                    items.push(finish_item(std::mem::take(&mut current)));
                    item_depth = None;
                }
                if item_depth.is_some_and(|d| depth == d + 1) {
                    field = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(FeedError::Malformed("missing <rss> root element".into()));
    }
    if !saw_channel {
        return Err(FeedError::Malformed("missing <channel> element".into()));
    }

    tracing::debug!(items = items.len(), "Parsed feed");
    Ok(items)
}

/// Trims every text field; fields that end up blank become `None`.
fn finish_item(mut item: RawItem) -> RawItem {
    for slot in [
        &mut item.title,
        &mut item.link,
        &mut item.description,
        &mut item.pub_date,
        &mut item.duration,
    ] {
        *slot = slot
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }
    item
}

fn append(slot: &mut Option<String>, text: &str) {
    match slot {
        Some(existing) => existing.push_str(text),
        None => *slot = Some(text.to_string()),
    }
}

fn read_enclosure(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Enclosure, FeedError> {
    let mut enclosure = Enclosure::default();
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed enclosure attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| FeedError::Xml(e.to_string()))?
            .to_string();
        match attr.key.as_ref() {
            b"url" => enclosure.url = Some(value),
            b"length" => enclosure.length = Some(value),
            b"type" => enclosure.mime_type = Some(value),
            _ => {}
        }
    }

    Ok(enclosure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Show</title>
    <link>https://stand.fm/channels/abc</link>
    <item>
      <title>First &amp; best</title>
      <link>https://stand.fm/episodes/64a1f0c2</link>
      <description><![CDATA[<p>Hello <b>world</b></p>]]></description>
      <pubDate>Mon, 06 May 2024 09:00:00 +0900</pubDate>
      <enclosure url="https://cdn.stand.fm/audios/1.m4a" length="5242880" type="audio/mp4"/>
      <itunes:duration>12:34</itunes:duration>
      <itunes:image href="https://cdn.stand.fm/img.jpg"/>
    </item>
    <item>
      <title>Second</title>
      <link>https://stand.fm/episodes/64a1f0c3</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_multiple_items_in_order() {
        let items = parse_feed(TWO_ITEMS).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title.as_deref(), Some("First & best"));
        assert_eq!(
            first.link.as_deref(),
            Some("https://stand.fm/episodes/64a1f0c2")
        );
        assert_eq!(
            first.description.as_deref(),
            Some("<p>Hello <b>world</b></p>")
        );
        assert_eq!(
            first.pub_date.as_deref(),
            Some("Mon, 06 May 2024 09:00:00 +0900")
        );
        assert_eq!(first.duration.as_deref(), Some("12:34"));
        assert_eq!(
            first.enclosure,
            Some(Enclosure {
                url: Some("https://cdn.stand.fm/audios/1.m4a".into()),
                length: Some("5242880".into()),
                mime_type: Some("audio/mp4".into()),
            })
        );

        assert_eq!(items[1].title.as_deref(), Some("Second"));
        assert_eq!(items[1].description, None);
        assert_eq!(items[1].enclosure, None);
    }

    #[test]
    fn test_parse_single_item() {
        let xml = r#"<rss><channel><item><title>Only</title><link>https://e.com/1</link></item></channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Only"));
    }

    #[test]
    fn test_channel_title_not_leaking_into_items() {
        let items = parse_feed(TWO_ITEMS).unwrap();
        assert!(items.iter().all(|i| i.title.as_deref() != Some("Show")));
    }

    #[test]
    fn test_empty_channel_yields_no_items() {
        let items = parse_feed(r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#)
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_self_closing_channel_accepted() {
        let items = parse_feed("<rss><channel/></rss>").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_missing_channel_is_malformed() {
        let err = parse_feed(r#"<rss version="2.0"></rss>"#).unwrap_err();
        assert!(matches!(err, FeedError::Malformed(_)));
    }

    #[test]
    fn test_atom_root_is_malformed() {
        let err = parse_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#).unwrap_err();
        match err {
            FeedError::Malformed(msg) => assert!(msg.contains("feed")),
            e => panic!("Expected Malformed, got {:?}", e),
        }
    }

    #[test]
    fn test_empty_document_is_malformed() {
        assert!(matches!(parse_feed(""), Err(FeedError::Malformed(_))));
    }

    #[test]
    fn test_broken_markup_is_xml_error() {
        let err = parse_feed("<rss><channel><item><title>x</item></channel></rss>").unwrap_err();
        assert!(matches!(err, FeedError::Xml(_)));
    }

    #[test]
    fn test_custom_entity_rejected() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE rss [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<rss><channel><item><title>&xxe;</title></item></channel></rss>"#;
        assert!(matches!(parse_feed(xml), Err(FeedError::Xml(_))));
    }

    #[test]
    fn test_mixed_text_and_cdata_concatenated() {
        let xml = r#"<rss><channel><item><title>Part<![CDATA[ two]]></title></item></channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items[0].title.as_deref(), Some("Part two"));
    }

    #[test]
    fn test_spaces_kept_across_cdata_and_entities() {
        let xml = r#"<rss><channel><item>
  <title>
    Tom &amp; <![CDATA[Jerry]]> show
  </title>
</item></channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items[0].title.as_deref(), Some("Tom & Jerry show"));
    }

    #[test]
    fn test_inline_markup_keeps_surrounding_spaces() {
        let xml = r#"<rss><channel><item><description>Hello <b>world</b> again</description></item></channel></rss>"#;
        let items = parse_feed(xml).unwrap();
        assert_eq!(items[0].description.as_deref(), Some("Hello world again"));
    }

    #[test]
    fn test_whitespace_only_field_is_none() {
        let xml = "<rss><channel><item><title>T</title><link>\n   \n</link></item></channel></rss>";
        let items = parse_feed(xml).unwrap();
        assert_eq!(items[0].link, None);
    }

    #[test]
    fn test_nesting_beyond_limit_rejected() {
        let depth = MAX_FEED_DEPTH + 1;
        let xml = format!(
            "<rss><channel><item>{}{}</item></channel></rss>",
            "<x>".repeat(depth),
            "</x>".repeat(depth)
        );
        match parse_feed(&xml) {
            Err(FeedError::Xml(msg)) => assert!(msg.contains("nesting depth")),
            other => panic!("Expected depth error, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_at_limit_accepted() {
        // rss + channel + item occupy the first three levels
        let extra = MAX_FEED_DEPTH - 3;
        let xml = format!(
            "<rss><channel><item><title>T</title>{}{}</item></channel></rss>",
            "<x>".repeat(extra),
            "</x>".repeat(extra)
        );
        let items = parse_feed(&xml).unwrap();
        assert_eq!(items[0].title.as_deref(), Some("T"));
    }
}

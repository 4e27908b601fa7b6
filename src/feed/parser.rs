use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Maximum element nesting accepted before the document is rejected.
/// RSS needs four levels; anything near this is hostile or broken.
const MAX_DEPTH: usize = 64;

/// Errors that abandon a feed document. There is no partial result.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The markup is not well-formed XML
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    /// Well-formed XML without an `rss/channel` element
    #[error("Not an RSS document: no <channel> element")]
    MissingChannel,
    /// The document ended with elements still open
    #[error("Unexpected end of document inside <{0}>")]
    Truncated(String),
    /// Elements nested deeper than [`MAX_DEPTH`]
    #[error("Element nesting exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// An RSS `<channel>` and its items, with text fields decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<RssItem>,
}

/// One `<item>` of a channel. Lives only for the cycle that fetched it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Raw `pubDate` text; see [`crate::feed::normalize_pub_date`]
    pub pub_date: String,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Parses an RSS 2.0 document.
///
/// Reads `rss/channel/{title,link,description}` and every
/// `rss/channel/item/{title,link,description,pubDate}`, in document order.
/// Other elements are skipped, including namespaced ones such as
/// `<atom:link>` that share a local name with a field.
///
/// After XML decoding, HTML entities in titles and descriptions are decoded
/// as well (feeds routinely double-escape `&amp;amp;`), and links are
/// decoded and trimmed.
///
/// # Errors
///
/// Any XML error, a truncated document, or a document with no channel is a
/// [`ParseError`]; nothing parsed so far is returned.
pub fn parse_feed(bytes: &[u8]) -> Result<RssFeed, ParseError> {
    // quick-xml (0.37) never expands <!ENTITY> declarations: unknown entity
    // references fail in unescape() instead of being resolved.
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut feed = RssFeed::default();
    let mut channel_seen = false;
    let mut current_item: Option<RssItem> = None;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| ParseError::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if is_channel(&stack, &name) {
                    channel_seen = true;
                }
                if is_item(&stack, &name) {
                    current_item = Some(RssItem::default());
                }
                stack.push(name);
                if stack.len() > MAX_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                if is_channel(&stack, name.as_ref()) {
                    channel_seen = true;
                }
            }
            Event::End(_) => {
                // Mismatched end tags are rejected by the reader itself
                if let Some(name) = stack.pop() {
                    if is_item(&stack, &name) {
                        if let Some(item) = current_item.take() {
                            feed.items.push(item);
                        }
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| ParseError::Xml {
                    position: reader.buffer_position() as u64,
                    message: err.to_string(),
                })?;
                append_text(&stack, &mut feed, current_item.as_mut(), &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e);
                append_text(&stack, &mut feed, current_item.as_mut(), &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Truncated(
            String::from_utf8_lossy(open).into_owned(),
        ));
    }
    if !channel_seen {
        return Err(ParseError::MissingChannel);
    }

    Ok(decode_entities(feed))
}

/// `<channel>` directly under the root element
fn is_channel(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.len() == 1 && name == b"channel"
}

/// `<item>` directly under `root/channel`
fn is_item(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.len() == 2 && stack[1] == b"channel" && name == b"item"
}

/// Routes character data to the field whose element is innermost on `stack`.
fn append_text(stack: &[Vec<u8>], feed: &mut RssFeed, item: Option<&mut RssItem>, text: &str) {
    match stack {
        [_, channel, field] if channel == b"channel" => match Field::from_name(field) {
            Some(Field::Title) => feed.title.push_str(text),
            Some(Field::Link) => feed.link.push_str(text),
            Some(Field::Description) => feed.description.push_str(text),
            Some(Field::PubDate) | None => {}
        },
        [_, channel, item_tag, field] if channel == b"channel" && item_tag == b"item" => {
            let Some(item) = item else { return };
            match Field::from_name(field) {
                Some(Field::Title) => item.title.push_str(text),
                Some(Field::Link) => item.link.push_str(text),
                Some(Field::Description) => item.description.push_str(text),
                Some(Field::PubDate) => item.pub_date.push_str(text),
                None => {}
            }
        }
        _ => {}
    }
}

fn decode_entities(feed: RssFeed) -> RssFeed {
    RssFeed {
        title: unescape_html(&feed.title),
        link: unescape_html(&feed.link),
        description: unescape_html(&feed.description),
        items: feed
            .items
            .into_iter()
            .map(|item| RssItem {
                title: unescape_html(&item.title),
                link: unescape_html(&item.link),
                description: unescape_html(&item.description),
                pub_date: item.pub_date.trim().to_string(),
            })
            .collect(),
    }
}

/// Decodes HTML entities (`&amp;`, `&rsquo;`, `&#8217;`) and trims.
pub fn unescape_html(text: &str) -> String {
    html_escape::decode_html_entities(text.trim()).into_owned()
}

use crate::types::{FeedChannel, FeedItem, SourceDescriptor};
use chrono::DateTime;
use tracing::warn;

/// Target summary length in characters.
pub const SUMMARY_TARGET: usize = 200;
/// Hard ceiling for the summary, excluding the ellipsis marker.
pub const SUMMARY_MAX: usize = 250;

const ELLIPSIS: &str = "...";

/// Full-width sentence boundaries considered good truncation points.
const SENTENCE_MARKS: [char; 4] = ['。', '？', '！', '，'];

/// Read the channel-level metadata shared by all items of one feed.
///
/// The Atom-namespaced `link` element is optional; its `href` attribute is
/// taken when present and the field stays absent otherwise.
pub fn parse_channel(channel: &rss::Channel) -> FeedChannel {
    let atom_link = channel
        .extensions()
        .get("atom")
        .and_then(|ns| ns.get("link"))
        .and_then(|links| links.iter().find_map(|link| link.attrs().get("href")))
        .cloned();

    FeedChannel {
        title: non_empty(channel.title()),
        link: non_empty(channel.link()),
        atom_link,
        description: non_empty(channel.description()),
        language: channel.language().map(str::to_string),
    }
}

/// Normalize one feed item, merging in the channel fields.
///
/// Returns `None` for items without a link: the link is the natural key, so
/// such items can neither be deduplicated nor upserted.
pub fn parse_item(
    item: &rss::Item,
    source: &SourceDescriptor,
    channel: &FeedChannel,
) -> Option<FeedItem> {
    let link = item.link()?.to_string();

    let content = item.description().unwrap_or_default().to_string();
    let summary = smart_truncate(&extract_text(&content), SUMMARY_TARGET, SUMMARY_MAX);

    // Plain author element first, Dublin Core creator as the fallback.
    let author = item
        .author()
        .map(str::to_string)
        .or_else(|| item.dublin_core_ext().and_then(|dc| dc.creators().first().cloned()));

    Some(FeedItem {
        source: source.kind.label().to_string(),
        title: item.title().map(str::to_string),
        description: if summary.is_empty() { None } else { Some(summary) },
        link,
        guid: item.guid().map(|guid| guid.value().to_string()),
        pub_date: item.pub_date().and_then(normalize_pub_date),
        author,
        category: item.categories().first().map(|c| c.name().to_string()),
        content,
        image_url: item.enclosure().map(|e| e.url().to_string()),
        language: channel.language.clone(),
        channel_title: channel.title.clone(),
        channel_link: channel.link.clone(),
        channel_atom_link: channel.atom_link.clone(),
        channel_description: channel.description.clone(),
    })
}

/// Parse an RFC-2822 feed date into the stored `YYYY-MM-DD HH:MM:SS` form.
/// An unparseable date is logged and stored as absent, never an error.
fn normalize_pub_date(raw: &str) -> Option<String> {
    match DateTime::parse_from_rfc2822(raw) {
        Ok(date) => Some(date.format("%Y-%m-%d %H:%M:%S").to_string()),
        Err(e) => {
            warn!("unparseable pubDate \"{}\": {}", raw, e);
            None
        }
    }
}

/// Reduce an HTML fragment to plain text: drop everything between tag
/// delimiters, decode HTML entities, collapse runs of whitespace.
pub fn extract_text(html: &str) -> String {
    let stripped = html
        .chars()
        .fold((String::new(), false), |(mut text, in_tag), c| match c {
            '<' => (text, true),
            '>' => (text, false),
            _ if !in_tag => {
                text.push(c);
                (text, in_tag)
            }
            _ => (text, in_tag),
        })
        .0;

    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate `text` to roughly `target` characters, preferring to cut at a
/// sentence boundary and never splitting a word or exceeding `max`
/// characters before the ellipsis marker.
///
/// Counts characters, not bytes, so the result is stable across scripts.
pub fn smart_truncate(text: &str, target: usize, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= target {
        return text.to_string();
    }

    // A full-width sentence mark close enough to the target wins; the mark
    // itself is kept.
    let prefix = &chars[..chars.len().min(max)];
    if let Some(pos) = prefix.iter().rposition(|c| SENTENCE_MARKS.contains(c)) {
        if pos > target.saturating_sub(50) {
            return finish(&chars[..=pos]);
        }
    }

    // Otherwise scan backward for a spot that does not split anything: right
    // after a CJK ideograph, or just before the word an alphabetic run
    // belongs to.
    let scan_from = chars.len().min(max).saturating_sub(1);
    for i in (target..=scan_from).rev() {
        let c = chars[i];
        if ('\u{4e00}'..='\u{9fff}').contains(&c) {
            return finish(&chars[..=i]);
        }
        if c.is_alphabetic() {
            let mut start = i;
            while start > 0 && chars[start - 1].is_alphabetic() {
                start -= 1;
            }
            return finish(&chars[..start]);
        }
    }

    finish(&chars[..target])
}

fn finish(kept: &[char]) -> String {
    let text: String = kept.iter().collect();
    format!("{}{}", text.trim(), ELLIPSIS)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceDescriptor, SourceKind};

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn short_text_is_returned_unchanged() {
        let text = "短".repeat(SUMMARY_TARGET);
        assert_eq!(smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX), text);

        let ascii = "a".repeat(120);
        assert_eq!(smart_truncate(&ascii, SUMMARY_TARGET, SUMMARY_MAX), ascii);
    }

    #[test]
    fn truncates_at_late_sentence_mark_inclusive() {
        // 230 ideographs with a full stop at position 210: 210 > 200 - 50,
        // so the cut lands right after the mark.
        let text: String = (0..230).map(|i| if i == 210 { '。' } else { '一' }).collect();
        let result = smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX);
        assert!(result.ends_with("。..."));
        assert_eq!(char_len(&result), 211 + 3);
    }

    #[test]
    fn early_sentence_mark_is_ignored() {
        // The only mark sits at position 60, well before target - 50, so the
        // backward CJK scan decides instead.
        let text: String = (0..300).map(|i| if i == 60 { '，' } else { '二' }).collect();
        let result = smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX);
        assert!(result.ends_with("二..."));
        assert!(char_len(&result) - 3 <= SUMMARY_MAX);
    }

    #[test]
    fn cuts_after_a_cjk_ideograph() {
        let text = "汉".repeat(300);
        let result = smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX);
        assert!(result.ends_with("汉..."));
        assert_eq!(char_len(&result), SUMMARY_MAX + 3);
    }

    #[test]
    fn does_not_split_a_word() {
        let text = "hello ".repeat(50); // 300 chars
        let result = smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX);
        assert!(result.ends_with("hello..."));
        assert!(!result.contains("hell..."));
        assert!(char_len(&result) - 3 <= SUMMARY_MAX);
    }

    #[test]
    fn hard_cut_when_no_boundary_exists() {
        let text = "7".repeat(300);
        let result = smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX);
        assert_eq!(char_len(&result), SUMMARY_TARGET + 3);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn truncation_stays_within_bound() {
        let samples = [
            "长".repeat(1000),
            "word ".repeat(200),
            format!("{}。{}", "三".repeat(240), "三".repeat(500)),
            "9".repeat(500),
        ];
        for text in samples {
            let result = smart_truncate(&text, SUMMARY_TARGET, SUMMARY_MAX);
            assert!(
                char_len(&result) <= SUMMARY_MAX + 3,
                "result too long for input of {} chars",
                char_len(&text)
            );
        }
    }

    #[test]
    fn extract_text_strips_tags_and_entities() {
        let html = "<p>Hello &amp; <b>world</b></p>\n   <div>again</div>";
        assert_eq!(extract_text(html), "Hello & world again");
    }

    #[test]
    fn extract_text_collapses_whitespace() {
        assert_eq!(extract_text("  a\n\t b   c  "), "a b c");
        assert_eq!(extract_text(""), "");
    }

    #[test]
    fn pub_date_normalizes_rfc2822() {
        assert_eq!(
            normalize_pub_date("Tue, 01 Oct 2024 06:30:05 +0800"),
            Some("2024-10-01 06:30:05".to_string())
        );
    }

    #[test]
    fn bad_pub_date_becomes_absent() {
        assert_eq!(normalize_pub_date("三天前"), None);
        assert_eq!(normalize_pub_date(""), None);
    }

    const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>示例博客</title>
    <link>https://blog.example.com</link>
    <atom:link href="https://blog.example.com/feed.xml" rel="self" type="application/rss+xml"/>
    <description>A sample channel</description>
    <language>zh-cn</language>
    <item>
      <title>First post</title>
      <link>https://blog.example.com/posts/1</link>
      <guid>post-1</guid>
      <pubDate>Tue, 01 Oct 2024 06:30:05 +0800</pubDate>
      <dc:creator>博主</dc:creator>
      <category>tech</category>
      <description><![CDATA[<p>正文 &amp; 摘要</p>]]></description>
      <enclosure url="https://blog.example.com/cover.png" length="0" type="image/png"/>
    </item>
    <item>
      <title>No link here</title>
      <description>orphan</description>
    </item>
    <item>
      <title>Bad date</title>
      <link>https://blog.example.com/posts/2</link>
      <author>editor@example.com</author>
      <pubDate>yesterday</pubDate>
    </item>
  </channel>
</rss>"#;

    fn sample_source() -> SourceDescriptor {
        SourceDescriptor {
            url: "https://blog.example.com".to_string(),
            kind: SourceKind::Rss,
        }
    }

    #[test]
    fn channel_fields_are_extracted() {
        let channel = rss::Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let parsed = parse_channel(&channel);
        assert_eq!(parsed.title.as_deref(), Some("示例博客"));
        assert_eq!(parsed.link.as_deref(), Some("https://blog.example.com"));
        assert_eq!(
            parsed.atom_link.as_deref(),
            Some("https://blog.example.com/feed.xml")
        );
        assert_eq!(parsed.language.as_deref(), Some("zh-cn"));
    }

    #[test]
    fn item_fields_are_normalized_and_channel_merged() {
        let channel = rss::Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let parsed_channel = parse_channel(&channel);
        let item = parse_item(&channel.items()[0], &sample_source(), &parsed_channel).unwrap();

        assert_eq!(item.source, "rss");
        assert_eq!(item.link, "https://blog.example.com/posts/1");
        assert_eq!(item.guid.as_deref(), Some("post-1"));
        assert_eq!(item.pub_date.as_deref(), Some("2024-10-01 06:30:05"));
        assert_eq!(item.author.as_deref(), Some("博主"));
        assert_eq!(item.category.as_deref(), Some("tech"));
        assert_eq!(item.image_url.as_deref(), Some("https://blog.example.com/cover.png"));
        assert_eq!(item.description.as_deref(), Some("正文 & 摘要"));
        assert_eq!(item.content, "<p>正文 &amp; 摘要</p>");
        assert_eq!(item.channel_title.as_deref(), Some("示例博客"));
        assert_eq!(item.language.as_deref(), Some("zh-cn"));
    }

    #[test]
    fn linkless_item_is_dropped() {
        let channel = rss::Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let parsed_channel = parse_channel(&channel);
        assert!(parse_item(&channel.items()[1], &sample_source(), &parsed_channel).is_none());
    }

    #[test]
    fn plain_author_wins_and_bad_date_is_absent() {
        let channel = rss::Channel::read_from(FEED_XML.as_bytes()).unwrap();
        let parsed_channel = parse_channel(&channel);
        let item = parse_item(&channel.items()[2], &sample_source(), &parsed_channel).unwrap();
        assert_eq!(item.author.as_deref(), Some("editor@example.com"));
        assert_eq!(item.pub_date, None);
        assert_eq!(item.content, "");
        assert_eq!(item.description, None);
    }
}

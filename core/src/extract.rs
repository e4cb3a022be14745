//! Lexical HTML scanning: links, forms, text, meta refresh and frames.
//!
//! # Design
//! These are best-effort regex passes, not an HTML parser. Each function takes
//! the document as text and returns plain values, so the agent only depends on
//! this narrow surface and a real parser could replace it wholesale.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

#[allow(clippy::expect_used)]
static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<\s*a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("anchor regex is valid")
});

#[allow(clippy::expect_used)]
static FORM_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)</?(?:form|input|select|textarea)\b[^<>]*>|</?option\b[^<>]*>[^<]*")
        .expect("form regex is valid")
});

#[allow(clippy::expect_used)]
static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta\s*http-equiv[^>]*?content\s*=\s*["']?\d+;\s*URL\s*=\s*([^"']*?)["']?\s*/?>"#,
    )
    .expect("meta refresh regex is valid")
});

#[allow(clippy::expect_used)]
static FRAME_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<frame\s[^>]*?src\s*=\s*['"]?([^'"\s>]+)"#).expect("frame regex is valid")
});

#[allow(clippy::expect_used)]
static TEXT_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?is)<script[^>]*?>.*?</script>", ""),
        (r"(?s)<[/!]*?[^<>]*?>", ""),
        (r"([\r\n])\s+", "$1"),
        (r"(?i)&(quot|#34|#034|#x22);", "\""),
        (r"(?i)&(amp|#38|#038|#x26);", "&"),
        (r"(?i)&(lt|#60|#060|#x3c);", "<"),
        (r"(?i)&(gt|#62|#062|#x3e);", ">"),
        (r"(?i)&(nbsp|#160|#xa0);", " "),
        (r"(?i)&(iexcl|#161);", "¡"),
        (r"(?i)&(cent|#162);", "¢"),
        (r"(?i)&(pound|#163);", "£"),
        (r"(?i)&(copy|#169);", "©"),
        (r"(?i)&(reg|#174);", "®"),
        (r"(?i)&(deg|#176);", "°"),
        (r"&(#39|#039|#x27);", "'"),
        (r"(?i)&(euro|#8364);", "€"),
        (r"&a(uml|UML);", "ä"),
        (r"&o(uml|UML);", "ö"),
        (r"&u(uml|UML);", "ü"),
        (r"&A(uml|UML);", "Ä"),
        (r"&O(uml|UML);", "Ö"),
        (r"&U(uml|UML);", "Ü"),
        (r"(?i)&szlig;", "ß"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("text regex is valid"), replacement))
    .collect()
});

/// `href` values of anchor tags, in document order. Empty values are dropped.
pub fn strip_links(document: &str) -> Vec<String> {
    ANCHOR_HREF
        .captures_iter(document)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .filter(|href| !href.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Raw markup of `form`, `input`, `select`, `textarea` and `option` tags
/// (options keep their text), joined with CRLF.
pub fn strip_form(document: &str) -> String {
    FORM_MARKUP
        .find_iter(document)
        .map(|m| m.as_str().trim_end())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// The document with scripts and tags removed, whitespace after line breaks
/// collapsed and common entities decoded.
pub fn strip_text(document: &str) -> String {
    TEXT_RULES
        .iter()
        .fold(document.to_string(), |text, (pattern, replacement)| {
            pattern.replace_all(&text, *replacement).into_owned()
        })
}

/// Target of a `<meta http-equiv="refresh" content="N; URL=...">` tag.
pub fn meta_refresh(document: &str) -> Option<&str> {
    META_REFRESH
        .captures(document)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|url| !url.is_empty())
}

/// `src` of every `<frame>` tag, in document order.
pub fn frame_sources(document: &str) -> Vec<&str> {
    FRAME_SRC
        .captures_iter(document)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Resolve one link against `base`. Links that do not resolve are returned
/// unchanged.
pub fn expand_link(link: &str, base: &Url) -> String {
    match base.join(link.trim()) {
        Ok(url) => url.into(),
        Err(err) => {
            trace!(link, error = %err, "link left unexpanded");
            link.to_string()
        }
    }
}

/// Resolve every link against `base`. When `base` itself is not a valid
/// URI the links come back untouched.
pub fn expand_links(links: &[String], base: &str) -> Vec<String> {
    match Url::parse(base) {
        Ok(base) => links.iter().map(|link| expand_link(link, &base)).collect(),
        Err(_) => links.to_vec(),
    }
}

//! Cleanup of provider news text before it is scored.

use regex::{Captures, Regex};
use sentiment_core::TextCleaner;

/// Strips markup, HTML entities, links and redundant whitespace from news text.
pub struct NewsTextCleaner {
    tag_regex: Regex,
    entity_regex: Regex,
    url_regex: Regex,
    whitespace_regex: Regex,
}

impl Default for NewsTextCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl NewsTextCleaner {
    pub fn new() -> Self {
        Self {
            tag_regex: Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^>]*>").expect("static tag regex"),
            entity_regex: Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
                .expect("static entity regex"),
            url_regex: Regex::new(r"https?://\S+").expect("static url regex"),
            whitespace_regex: Regex::new(r"\s+").expect("static whitespace regex"),
        }
    }

    /// Steps, in order:
    /// 1. Drop HTML tags and comments
    /// 2. Unescape HTML entities
    /// 3. Remove http(s) URLs
    /// 4. Collapse whitespace and trim
    pub fn preprocess(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let no_tags = self.tag_regex.replace_all(text, " ");
        let unescaped = self.entity_regex.replace_all(&no_tags, |caps: &Captures| {
            decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        });
        let no_urls = self.url_regex.replace_all(&unescaped, "");
        let clean = self.whitespace_regex.replace_all(&no_urls, " ");

        clean.trim().to_string()
    }
}

impl TextCleaner for NewsTextCleaner {
    fn clean(&self, text: &str) -> String {
        self.preprocess(text)
    }
}

fn decode_entity(entity: &str) -> Option<String> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }

    let decoded = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "euro" => "\u{20ac}",
        "pound" => "\u{a3}",
        "yen" => "\u{a5}",
        "cent" => "\u{a2}",
        _ => return None,
    };
    Some(decoded.to_string())
}

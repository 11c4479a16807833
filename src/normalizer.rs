// 🧹 Text Normalizer
// Raw scraped text or HTML → one canonical line for pattern matching

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::sync::LazyLock;

/// A `<tag ...>` style pair. Stray `<` / `>` characters do not count as markup.
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z!/][^<>]*>").expect("valid markup regex"));

static LOCAL_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n,.\-]").expect("valid punctuation regex"));

/// Elements whose boundaries separate words in rendered text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "br", "dd", "div", "dl", "dt", "footer", "h1", "h2", "h3", "h4",
    "h5", "h6", "header", "hr", "li", "main", "ol", "p", "section", "table", "td", "th",
    "time", "tr", "ul",
];

/// Elements whose text is never user-visible.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Headings keep their level in the text as `[h4: Daily Herald]`, so rules can
/// target a heading by level.
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

// ============================================================================
// PUBLIC API
// ============================================================================

/// Normalize raw scraped content.
///
/// Markup is parsed (entities decoded, tags dropped, inner text kept) before
/// whitespace runs are collapsed to single spaces. Case and punctuation are
/// left alone. Empty or garbage input yields an empty string.
pub fn normalize(raw: &str) -> String {
    if looks_like_markup(raw) {
        collapse_whitespace(&markup_to_text(raw))
    } else {
        collapse_whitespace(raw)
    }
}

/// True when the input contains at least one `<...>` tag pair.
pub fn looks_like_markup(raw: &str) -> bool {
    MARKUP.is_match(raw)
}

/// Collapse every whitespace run (newlines included) to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Matcher-local cleanup: commas, periods, hyphens and newlines become spaces.
pub fn strip_punctuation(s: &str) -> String {
    collapse_whitespace(&LOCAL_PUNCTUATION.replace_all(s, " "))
}

// ============================================================================
// MARKUP
// ============================================================================

fn markup_to_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut out = String::with_capacity(raw.len());

    for node in fragment.tree.root().descendants() {
        match node.value() {
            Node::Element(el) => {
                if is_block(el.name()) {
                    out.push(' ');
                }
                if HEADING_TAGS.contains(&el.name()) {
                    if let Some(heading) = ElementRef::wrap(node) {
                        out.push_str(&heading_marker(el.name(), heading));
                    }
                }
                // Machine-readable dates go ahead of the human-readable text
                if el.name() == "time" {
                    if let Some(datetime) = el.attr("datetime") {
                        out.push_str(datetime.trim());
                        out.push(' ');
                    }
                }
            }
            Node::Text(text) => {
                let hidden = node.ancestors().any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|e| {
                            SKIPPED_TAGS.contains(&e.name()) || HEADING_TAGS.contains(&e.name())
                        })
                });
                if hidden {
                    continue;
                }

                let after_block = node
                    .prev_sibling()
                    .and_then(|s| s.value().as_element().map(|e| is_block(e.name())))
                    .unwrap_or(false);
                if after_block {
                    out.push(' ');
                }

                out.push_str(&**text);
            }
            _ => {}
        }
    }

    out
}

/// `[h4: Daily Herald] `, or nothing for an empty heading
fn heading_marker(level: &str, heading: ElementRef<'_>) -> String {
    let text = collapse_whitespace(&heading.text().collect::<String>());
    if text.is_empty() {
        return String::new();
    }
    format!("[{}: {}] ", level, text.replace(']', ")"))
}

fn is_block(name: &str) -> bool {
    BLOCK_TAGS.contains(&name)
}

// ============================================================================
// TESTS
// ============================================================================

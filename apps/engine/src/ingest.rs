//! Markup ingestion — converts pasted rich content into prompt-ready plain text.
//!
//! Pure and total: markup in, best-effort structured text out. No I/O, no
//! network, no failure path. Unparseable markup degrades to plain text
//! instead of erroring.

use serde::{Deserialize, Serialize};

/// Rich content as delivered by the shell's paste handling. A paste may carry
/// a markup representation alongside the plain-text fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastedContent {
    pub html: Option<String>,
    pub plain_text: String,
}

/// Converts pasted content into normalized plain text for prompt material.
///
/// When a markup representation is present it wins: headings, lists, and
/// emphasis collapse to lightweight text markers, links reduce to their text,
/// and the result is trimmed. Otherwise the plain-text fallback passes
/// through unchanged.
pub fn ingest(content: &PastedContent) -> String {
    match content.html.as_deref() {
        Some(html) => html_to_text(html).trim().to_string(),
        None => content.plain_text.clone(),
    }
}

/// Converts an HTML fragment to structured plain text.
///
/// Single forward scan, no tree building. Block tags break lines, headings
/// gain `#` markers, list items gain `- ` markers, inline tags collapse to
/// their text, `script`/`style` subtrees are dropped, entities are decoded
/// best effort.
fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut pending_space = false;
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];

        if let Some(after_open) = rest.strip_prefix("<!--") {
            // comment: skip past the terminator, or to the end when unterminated
            i += 4 + after_open.find("-->").map(|p| p + 3).unwrap_or(after_open.len());
            continue;
        }

        if rest.starts_with('<') {
            match parse_tag(rest) {
                Some(tag) => {
                    i += tag.consumed;
                    if !tag.closing && (tag.name == "script" || tag.name == "style") {
                        i += skip_subtree(&html[i..], &tag.name);
                        pending_space = false;
                    } else {
                        apply_tag(&tag, &mut out, &mut pending_space);
                    }
                }
                // stray '<' that opens no tag stays literal
                None => {
                    emit_char(&mut out, '<', &mut pending_space);
                    i += 1;
                }
            }
            continue;
        }

        if rest.starts_with('&') {
            let (decoded, consumed) = decode_entity(rest);
            match decoded {
                Some(c) if c.is_whitespace() => pending_space = true,
                Some(c) => emit_char(&mut out, c, &mut pending_space),
                None => emit_char(&mut out, '&', &mut pending_space),
            }
            i += consumed;
            continue;
        }

        if let Some(c) = rest.chars().next() {
            if c.is_whitespace() {
                pending_space = true;
            } else {
                emit_char(&mut out, c, &mut pending_space);
            }
            i += c.len_utf8();
        }
    }

    out
}

struct Tag {
    name: String,
    closing: bool,
    consumed: usize,
}

/// Parses `<name ...>` or `</name ...>` at the start of `rest`.
/// Returns `None` when the text does not form a tag.
fn parse_tag(rest: &str) -> Option<Tag> {
    let body = rest.strip_prefix('<')?;
    let (closing, body) = match body.strip_prefix('/') {
        Some(after_slash) => (true, after_slash),
        None => (false, body),
    };
    let first = body.chars().next()?;

    // declarations and processing instructions carry no text of interest
    if !closing && (first == '!' || first == '?') {
        let end = rest.find('>')?;
        return Some(Tag {
            name: String::new(),
            closing: false,
            consumed: end + 1,
        });
    }

    if !first.is_ascii_alphabetic() {
        return None;
    }
    let end = rest.find('>')?;
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    Some(Tag {
        name,
        closing,
        consumed: end + 1,
    })
}

/// Returns how many bytes of `rest` belong to a `script`/`style` subtree,
/// including its closing tag. Unterminated subtrees swallow the remainder.
fn skip_subtree(rest: &str, name: &str) -> usize {
    let close = format!("</{name}");
    match find_ignore_case(rest, &close) {
        Some(pos) => {
            let tail = &rest[pos..];
            pos + tail.find('>').map(|p| p + 1).unwrap_or(tail.len())
        }
        None => rest.len(),
    }
}

fn apply_tag(tag: &Tag, out: &mut String, pending_space: &mut bool) {
    match tag.name.as_str() {
        "br" => {
            line_break(out);
            *pending_space = false;
        }
        "p" | "blockquote" => {
            paragraph_break(out);
            *pending_space = false;
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            paragraph_break(out);
            *pending_space = false;
            if !tag.closing {
                let level = tag.name[1..].parse::<usize>().unwrap_or(1);
                for _ in 0..level {
                    out.push('#');
                }
                out.push(' ');
            }
        }
        "li" => {
            line_break(out);
            *pending_space = false;
            if !tag.closing {
                out.push_str("- ");
            }
        }
        "ul" | "ol" | "div" | "table" | "tr" => {
            line_break(out);
            *pending_space = false;
        }
        "td" | "th" if tag.closing => *pending_space = true,
        // inline markup (a, b, i, em, strong, span, code, ...) collapses to its text
        _ => {}
    }
}

fn emit_char(out: &mut String, c: char, pending_space: &mut bool) {
    if *pending_space && !out.is_empty() && !out.ends_with('\n') && !out.ends_with(' ') {
        out.push(' ');
    }
    *pending_space = false;
    out.push(c);
}

fn line_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// At most one blank line between blocks.
fn paragraph_break(out: &mut String) {
    line_break(out);
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
}

/// Decodes a character entity at the start of `rest` (which begins with `&`).
/// Returns the decoded character (`None` when the run is not a recognizable
/// entity) and the number of bytes consumed.
fn decode_entity(rest: &str) -> (Option<char>, usize) {
    // entity names are short; a distant semicolon means a bare ampersand
    let semi = match rest[1..].find(';') {
        Some(pos) if pos > 0 && pos <= 10 => pos,
        _ => return (None, 1),
    };
    let entity = &rest[1..1 + semi];
    let decoded = match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => entity.strip_prefix('#').and_then(parse_numeric_entity),
    };
    match decoded {
        Some(c) => (Some(c), semi + 2),
        None => (None, 1),
    }
}

fn parse_numeric_entity(digits: &str) -> Option<char> {
    let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

/// ASCII-only case-insensitive substring search. Returned offsets are char
/// boundaries because the needle starts with an ASCII byte.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&idx| h[idx..idx + n.len()].eq_ignore_ascii_case(n))
}

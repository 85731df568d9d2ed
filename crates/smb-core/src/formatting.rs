//! Formatting utilities (lightweight Markdown → Telegram HTML, message splitting).

use std::sync::OnceLock;

use regex::Regex;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn link_regex() -> &'static Regex {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    LINK_RE.get_or_init(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid regex"))
}

/// Convert the small Markdown subset used in replies to Telegram-compatible HTML.
///
/// Supported: `**bold**`, `*bold*`, `__bold__`, `_italic_`, `` `code` `` and
/// `[text](url)`. Link targets and inline code are protected from emphasis.
pub fn convert_markdown_to_html(input: &str) -> String {
    let (text, links) = extract_links(input);
    let (text, inline_codes) = extract_inline_codes(&text);

    let escaped = escape_html(&text);

    // Line-oriented transforms (avoid cross-line emphasis bugs).
    let mut out = escaped
        .split('\n')
        .map(|line| {
            let mut l = replace_delimited(line, "**", "<b>", "</b>");
            l = replace_delimited(&l, "__", "<b>", "</b>");
            l = replace_single_delim(&l, '_', "<i>", "</i>");
            replace_single_delim(&l, '*', "<b>", "</b>")
        })
        .collect::<Vec<_>>()
        .join("\n");

    for (i, (label, url)) in links.iter().enumerate() {
        out = out.replace(
            &format!("\0LINK{i}\0"),
            &format!(r#"<a href="{}">{}</a>"#, escape_html(url), escape_html(label)),
        );
    }

    for (i, code) in inline_codes.iter().enumerate() {
        out = out.replace(
            &format!("\0INLINECODE{i}\0"),
            &format!("<code>{}</code>", escape_html(code)),
        );
    }

    out
}

fn extract_links(input: &str) -> (String, Vec<(String, String)>) {
    let mut links = Vec::new();
    let out = link_regex().replace_all(input, |caps: &regex::Captures<'_>| {
        let idx = links.len();
        links.push((caps[1].to_string(), caps[2].to_string()));
        format!("\0LINK{idx}\0")
    });
    (out.into_owned(), links)
}

fn extract_inline_codes(input: &str) -> (String, Vec<String>) {
    let mut codes = Vec::new();
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find('`') {
        let start = i + rel;
        out.push_str(&input[i..start]);

        let content_start = start + 1;
        if let Some(end_rel) = input[content_start..].find('`') {
            let end = content_start + end_rel;
            let idx = codes.len();
            codes.push(input[content_start..end].to_string());
            out.push_str(&format!("\0INLINECODE{idx}\0"));
            i = end + 1;
            continue;
        }

        // Unclosed: append the rest and stop.
        out.push_str(&input[start..]);
        return (out, codes);
    }

    out.push_str(&input[i..]);
    (out, codes)
}

fn replace_delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while let Some(rel) = text[i..].find(delim) {
        let start = i + rel;
        out.push_str(&text[i..start]);
        let content_start = start + delim.len();
        if let Some(end_rel) = text[content_start..].find(delim) {
            let end = content_start + end_rel;
            out.push_str(open);
            out.push_str(&text[content_start..end]);
            out.push_str(close);
            i = end + delim.len();
            continue;
        }
        out.push_str(&text[start..]);
        return out;
    }
    out.push_str(&text[i..]);
    out
}

fn replace_single_delim(text: &str, delim: char, open: &str, close: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_single = |i: usize| {
        chars[i] == delim
            && !(i > 0 && chars[i - 1] == delim)
            && !(i + 1 < chars.len() && chars[i + 1] == delim)
    };

    let mut out = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        if !is_single(i) {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        match (i + 1..chars.len()).find(|&j| is_single(j)) {
            Some(j) if j > i + 1 => {
                out.push_str(open);
                out.extend(&chars[i + 1..j]);
                out.push_str(close);
                i = j + 1;
            }
            _ => {
                out.push(delim);
                i += 1;
            }
        }
    }

    out
}

/// Split plain text into chunks whose HTML-escaped length fits `limit` bytes.
///
/// Chunks break on line boundaries where possible; a single overlong line is
/// broken at a character boundary. Each chunk is returned unescaped.
pub fn split_plain_text(text: &str, limit: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let limit = limit.max(16);
    if escaped_len(text) <= limit {
        return vec![text.to_string()];
    }

    let mut out: Vec<String> = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = escaped_len(line);
        if chunk_len + line_len <= limit {
            chunk.push_str(line);
            chunk_len += line_len;
            continue;
        }

        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
            chunk_len = 0;
        }

        if line_len <= limit {
            chunk.push_str(line);
            chunk_len = line_len;
            continue;
        }

        for c in line.chars() {
            let c_len = escaped_char_len(c);
            if chunk_len + c_len > limit {
                out.push(std::mem::take(&mut chunk));
                chunk_len = 0;
            }
            chunk.push(c);
            chunk_len += c_len;
        }
    }

    if !chunk.trim().is_empty() {
        out.push(chunk);
    }
    out.retain(|c| !c.trim().is_empty());
    out
}

fn escaped_len(text: &str) -> usize {
    text.chars().map(escaped_char_len).sum()
}

fn escaped_char_len(c: char) -> usize {
    match c {
        '&' => 5,
        '<' | '>' => 4,
        '"' => 6,
        other => other.len_utf8(),
    }
}

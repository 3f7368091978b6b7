use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::models::{GeneratedArticle, PostMetadata};

/// Domains the model uses as stand-ins for real links
const PLACEHOLDER_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "placeholder.com",
    "yoursite.com",
    "website.com",
    "domain.com",
    "site.com",
    "yourblogname.com",
    "ai-generated.com",
    "yourcryptoblog.com",
];

static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]*)\]\(([^)\s]+)[^)]*\)").expect("valid regex"));
static RAW_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)\]>]+").expect("valid regex"));
static PLACEHOLDER_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(insert|add|mention|link to|placeholder|your|todo)\b[^\]\n]*\](?:[^(]|$)")
        .expect("valid regex")
});
static STRAY_AT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)@(https?://|www\.)\S*").expect("valid regex"));
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static INSTRUCTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*[(*_]*(?:(?:note to (?:the )?editor|editor'?s note|note|important)\s*:|remember to\b)[^\n]*$",
    )
    .expect("valid regex")
});
static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("valid regex"));

fn is_placeholder_url(url: &str) -> bool {
    let host = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    PLACEHOLDER_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
}

/// Remove the usual generation leftovers from a markdown body.
pub fn clean_ai_artifacts(content: &str) -> String {
    let content = content.replace("\r\n", "\n").replace('\r', "\n");

    let content = HTML_COMMENT.replace_all(&content, "");

    // Placeholder links keep their text, raw placeholder URLs vanish
    let content = MD_LINK.replace_all(&content, |caps: &Captures| {
        if is_placeholder_url(&caps[2]) {
            caps[1].to_string()
        } else {
            caps[0].to_string()
        }
    });
    let content = RAW_URL.replace_all(&content, |caps: &Captures| {
        if is_placeholder_url(&caps[0]) {
            String::new()
        } else {
            caps[0].to_string()
        }
    });

    let content = PLACEHOLDER_BRACKET.replace_all(&content, |caps: &Captures| {
        // Keep the character that ended the match
        caps[0]
            .chars()
            .last()
            .filter(|c| *c != ']')
            .map(String::from)
            .unwrap_or_default()
    });
    let content = STRAY_AT.replace_all(&content, "$1");
    let content = INSTRUCTION_LINE.replace_all(&content, "");

    let content = content
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let content = BLANK_RUNS.replace_all(&content, "\n\n");

    content.trim().to_string()
}

/// Split a generated reply into its metadata block and markdown body.
///
/// The block is the run of leading `key: value` lines up to the first blank line.
/// A leading `# ` heading is removed from the body and used as title when the
/// block has none.
pub fn parse_generated(reply: &str) -> GeneratedArticle {
    let mut metadata = PostMetadata::default();
    let lines: Vec<&str> = reply.lines().collect();
    let mut body_start = 0;

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        body_start = i + 1;

        if trimmed == "---" {
            continue;
        }
        if trimmed.is_empty() {
            // Blank lines before any key do not end the block
            if metadata == PostMetadata::default() {
                continue;
            }
            break;
        }

        match metadata_line(trimmed) {
            Some((key, value)) => apply_metadata(&mut metadata, &key, value),
            None => {
                body_start = i;
                break;
            }
        }
    }

    let mut body = lines[body_start.min(lines.len())..].join("\n");
    body = body.trim().to_string();

    if let Some(rest) = body.strip_prefix("# ") {
        let (heading, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
        let heading = heading.trim().to_string();
        if metadata.title.is_none() && !heading.is_empty() {
            metadata.title = Some(heading);
        }
        body = remainder.trim().to_string();
    }

    GeneratedArticle {
        metadata,
        body_markdown: body,
    }
}

fn metadata_line(line: &str) -> Option<(String, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let known = matches!(
        key.to_ascii_lowercase().as_str(),
        "title" | "description" | "date" | "categories" | "tags" | "featuredimage"
    );
    known.then(|| (key.to_ascii_lowercase(), value.trim()))
}

fn apply_metadata(metadata: &mut PostMetadata, key: &str, value: &str) {
    let text = || {
        let v = value.trim_matches('"').trim();
        (!v.is_empty() && v != "None").then(|| v.to_string())
    };

    match key {
        "title" => metadata.title = text(),
        "description" => metadata.description = text(),
        "date" => metadata.date = text(),
        "categories" => metadata.categories = parse_list(value),
        "tags" => metadata.tags = parse_list(value),
        "featuredimage" => metadata.featured_image = text(),
        _ => {}
    }
}

/// `[a, b, c]` or `a, b, c`
fn parse_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

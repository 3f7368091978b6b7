use pulldown_cmark::{html, CowStr, Event, HeadingLevel, Options, Parser, Tag};
use serde_json::json;

const AUTHOR: &str = "AI Crypto Insights";
const PUBLISHER: &str = "Crypto Insights Blog";

/// Everything the page template needs
pub struct PageInput<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub keywords: &'a [String],
    pub image_data_uri: &'a str,
    pub body_markdown: &'a str,
    pub category: &'a str,
    pub source_url: &'a str,
    /// `YYYY-MM-DD`
    pub published_date: &'a str,
}

pub struct HtmlAssembler;

impl HtmlAssembler {
    /// Full standalone page for one post
    pub fn assemble(input: &PageInput<'_>) -> String {
        let title = escape_html(input.title);
        let description = escape_html(input.description);
        let keywords = escape_html(&input.keywords.join(", "));
        let source_url = escape_html(input.source_url);
        let body = markdown_to_html(input.body_markdown);

        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("  <meta charset=\"UTF-8\">\n");
        html.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        html.push_str(&format!("  <title>{}</title>\n", title));
        html.push_str(&format!("  <meta name=\"description\" content=\"{}\">\n", description));
        html.push_str(&format!("  <meta name=\"keywords\" content=\"{}\">\n", keywords));
        html.push_str("  <meta name=\"robots\" content=\"index, follow\">\n");
        html.push_str(&format!("  <meta name=\"author\" content=\"{}\">\n", AUTHOR));

        // Open Graph; the image is embedded inline so there is no public URL to offer
        html.push_str("  <meta property=\"og:type\" content=\"article\">\n");
        html.push_str(&format!("  <meta property=\"og:url\" content=\"{}\">\n", source_url));
        html.push_str(&format!("  <meta property=\"og:title\" content=\"{}\">\n", title));
        html.push_str(&format!(
            "  <meta property=\"og:description\" content=\"{}\">\n",
            description
        ));
        html.push_str("  <meta property=\"og:image\" content=\"\">\n");

        html.push_str("  <meta name=\"twitter:card\" content=\"summary_large_image\">\n");
        html.push_str(&format!("  <meta name=\"twitter:url\" content=\"{}\">\n", source_url));
        html.push_str(&format!("  <meta name=\"twitter:title\" content=\"{}\">\n", title));
        html.push_str(&format!(
            "  <meta name=\"twitter:description\" content=\"{}\">\n",
            description
        ));
        html.push_str("  <meta name=\"twitter:image\" content=\"\">\n");

        html.push_str("  <script type=\"application/ld+json\">\n");
        html.push_str(&structured_data(input));
        html.push_str("\n  </script>\n");

        html.push_str("  <style>\n");
        html.push_str("    :root { --primary-color: #F7931A; --secondary-color: #1A222C; --text-color: #333; --light-bg: #F5F7FA; --border-color: #e0e0e0; }\n");
        html.push_str("    body { font-family: 'Segoe UI', 'Helvetica Neue', Arial, sans-serif; line-height: 1.7; color: var(--text-color); background: var(--light-bg); margin: 0; padding: 0; }\n");
        html.push_str("    .container { max-width: 850px; margin: 30px auto; padding: 25px; background: #fff; border-radius: 12px; box-shadow: 0 4px 15px rgba(0,0,0,0.08); }\n");
        html.push_str("    .article-header { text-align: center; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 1px solid var(--border-color); }\n");
        html.push_str("    .category-tag { display: inline-block; background: var(--primary-color); color: white; padding: 8px 18px; border-radius: 20px; font-size: 0.85em; font-weight: 600; letter-spacing: 0.8px; margin-bottom: 15px; text-transform: uppercase; }\n");
        html.push_str("    h1 { font-size: 2.2em; color: var(--secondary-color); margin-bottom: 15px; line-height: 1.3; }\n");
        html.push_str("    h2 { font-size: 1.7em; color: var(--secondary-color); margin-top: 30px; margin-bottom: 15px; padding-bottom: 5px; border-bottom: 1px dashed var(--border-color); }\n");
        html.push_str("    h3 { font-size: 1.3em; color: var(--secondary-color); margin-top: 25px; margin-bottom: 10px; }\n");
        html.push_str("    p { margin-bottom: 1.2em; }\n");
        html.push_str("    .featured-image { width: 100%; height: auto; object-fit: cover; border-radius: 8px; margin: 25px 0 30px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }\n");
        html.push_str("    a { color: var(--primary-color); text-decoration: none; }\n");
        html.push_str("    a:hover { color: #C27600; text-decoration: underline; }\n");
        html.push_str("    ul, ol { margin-left: 25px; margin-bottom: 1.5em; }\n");
        html.push_str("    li { margin-bottom: 0.6em; }\n");
        html.push_str("    .source-link { margin-top: 40px; padding-top: 20px; border-top: 1px solid var(--border-color); font-size: 0.95em; text-align: center; color: #666; }\n");
        html.push_str("    @media (max-width: 768px) { .container { margin: 15px; padding: 15px; } h1 { font-size: 1.8em; } h2 { font-size: 1.5em; } }\n");
        html.push_str("  </style>\n");
        html.push_str("</head>\n<body>\n");

        html.push_str("<div class=\"container\">\n");
        html.push_str("  <div class=\"article-header\">\n");
        html.push_str(&format!(
            "    <span class=\"category-tag\">{}</span>\n",
            escape_html(&input.category.to_uppercase())
        ));
        html.push_str(&format!("    <h1>{}</h1>\n", title));
        html.push_str(&format!(
            "    <img src=\"{}\" alt=\"{}\" class=\"featured-image\">\n",
            escape_html(input.image_data_uri),
            title
        ));
        html.push_str("  </div>\n");

        html.push_str("  <div class=\"article-content\">\n");
        html.push_str(&body);
        html.push_str("  </div>\n");

        html.push_str("  <div class=\"source-link\">\n");
        html.push_str(
            "    <p><strong>Disclaimer:</strong> This article was produced by an automated content system \
            that synthesizes information from multiple sources. It may contain inaccuracies and \
            illustrative external links.</p>\n",
        );
        if !input.source_url.is_empty() {
            html.push_str(&format!(
                "    <p>A primary source for this article: <a href=\"{0}\" target=\"_blank\" rel=\"noopener noreferrer\">{0}</a></p>\n",
                source_url
            ));
        }
        html.push_str("  </div>\n");
        html.push_str("</div>\n");
        html.push_str("</body>\n</html>\n");

        html
    }
}

fn structured_data(input: &PageInput<'_>) -> String {
    let published = format!("{}T00:00:00Z", input.published_date);
    let data = json!({
        "@context": "https://schema.org",
        "@type": "NewsArticle",
        "headline": input.title,
        "image": [],
        "datePublished": published,
        "dateModified": published,
        "articleSection": capitalize(input.category),
        "keywords": input.keywords.join(", "),
        "author": { "@type": "Organization", "name": AUTHOR },
        "publisher": { "@type": "Organization", "name": PUBLISHER },
        "mainEntityOfPage": { "@type": "WebPage", "@id": input.source_url },
        "description": input.description,
    });

    // A literal "</" would end the script element early
    serde_json::to_string_pretty(&data)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render the article body.
///
/// Headings start at level 2 since the page owns the only `<h1>`. Images are
/// dropped, raw HTML is shown as text and links open in a new tab.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut image_depth = 0usize;

    let events = Parser::new_ext(markdown, options).filter_map(|event| {
        match event {
            Event::Start(Tag::Image(..)) => {
                image_depth += 1;
                return None;
            }
            Event::End(Tag::Image(..)) => {
                image_depth = image_depth.saturating_sub(1);
                return None;
            }
            _ if image_depth > 0 => return None,
            _ => {}
        }

        Some(match event {
            Event::Start(Tag::Heading(HeadingLevel::H1, id, classes)) => {
                Event::Start(Tag::Heading(HeadingLevel::H2, id, classes))
            }
            Event::End(Tag::Heading(HeadingLevel::H1, id, classes)) => {
                Event::End(Tag::Heading(HeadingLevel::H2, id, classes))
            }
            Event::Html(raw) => Event::Text(raw),
            Event::Start(Tag::Link(_, dest, title)) => Event::Html(CowStr::from(open_link(&dest, &title))),
            Event::End(Tag::Link(..)) => Event::Html(CowStr::Borrowed("</a>")),
            other => other,
        })
    });

    let mut out = String::new();
    html::push_html(&mut out, events);
    out
}

fn open_link(dest: &str, title: &str) -> String {
    let mut tag = format!("<a href=\"{}\"", escape_html(dest));
    if !title.is_empty() {
        tag.push_str(&format!(" title=\"{}\"", escape_html(title)));
    }
    tag.push_str(" target=\"_blank\" rel=\"noopener noreferrer\">");
    tag
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

use serde_json::Value;

use crate::error::{Error, Result};
use crate::llm::{json_span, strip_code_fence, Generation, TextModel};
use crate::models::{Article, Topic};

/// Articles rendered into the topic prompt, to stay inside the context window
const MAX_PROMPT_ARTICLES: usize = 50;

/// Default number of articles kept for the drafting stage
pub const RELEVANT_ARTICLE_LIMIT: usize = 10;

pub struct TopicExtractor<'a> {
    model: &'a dyn TextModel,
}

impl<'a> TopicExtractor<'a> {
    pub fn new(model: &'a dyn TextModel) -> Self {
        Self { model }
    }

    /// Ask the model for the single most trending topic across `articles`.
    ///
    /// An empty or unparsable reply gets one retry with a stricter prompt.
    pub async fn extract(&self, articles: &[Article]) -> Result<Topic> {
        let headlines = render_headlines(articles);
        if headlines.is_empty() {
            return Err(Error::Validation(
                "No usable article text for topic extraction".to_string(),
            ));
        }

        match self
            .model
            .generate(&topic_prompt(&headlines), Generation::RESEARCH)
            .await
        {
            Ok(reply) => {
                if let Some(topic) = parse_topic(&reply) {
                    tracing::info!(topic = %topic, "Extracted trending topic");
                    return Ok(topic);
                }
                tracing::warn!(reply = %reply.chars().take(200).collect::<String>(), "Unusable topic reply, retrying with stricter prompt");
            }
            Err(Error::EmptyResponse { service }) => {
                tracing::warn!(service, "Empty topic reply, retrying with stricter prompt");
            }
            Err(e) => return Err(e),
        }

        let reply = self
            .model
            .generate(&strict_topic_prompt(&headlines), Generation::RESEARCH)
            .await?;

        match parse_topic(&reply) {
            Some(topic) => {
                tracing::info!(topic = %topic, "Extracted trending topic on retry");
                Ok(topic)
            }
            None => Err(Error::Validation(format!(
                "Model did not return a usable topic: {:?}",
                reply.chars().take(200).collect::<String>()
            ))),
        }
    }

    /// Articles most relevant to `topic`, ranked by the model.
    ///
    /// Falls back to the first `limit` articles on any failure.
    pub async fn select_relevant(
        &self,
        articles: &[Article],
        topic: &Topic,
        limit: usize,
    ) -> Vec<Article> {
        let fallback = || articles.iter().take(limit).cloned().collect::<Vec<_>>();

        let listing = articles
            .iter()
            .enumerate()
            .map(|(idx, a)| format!("{}. {}", idx, a.title))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Given the topic '{}', analyze these articles and return a JSON array of indices \
            of the most relevant articles (0-based), sorted by relevance. Return ONLY the array.\n\n\
            Articles:\n{}",
            topic, listing
        );

        let reply = match self.model.generate(&prompt, Generation::RESEARCH).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Relevance ranking failed, using first {} articles", limit);
                return fallback();
            }
        };

        let selected: Vec<Article> = parse_indices(&reply, articles.len())
            .into_iter()
            .take(limit)
            .map(|idx| articles[idx].clone())
            .collect();

        if selected.is_empty() {
            tracing::warn!("Relevance ranking returned no usable indices, using first {} articles", limit);
            return fallback();
        }

        tracing::info!(selected = selected.len(), "Selected relevant articles");
        selected
    }
}

fn render_headlines(articles: &[Article]) -> String {
    let mut text = String::new();
    for article in articles.iter().take(MAX_PROMPT_ARTICLES) {
        if !article.title.is_empty() {
            text.push_str(&format!("Title: {}\n", article.title));
        }
        if !article.summary.is_empty() {
            text.push_str(&format!("Description: {}\n\n", article.summary));
        }
    }
    text.trim().to_string()
}

fn topic_prompt(headlines: &str) -> String {
    format!(
        r#"You are an expert crypto analyst. Given the following news headlines and summaries from recent cryptocurrency news, identify the single most trending topic or theme. The topic should be specific enough for a blog post but broad enough to be trending. Return ONLY a JSON string containing the topic.

Example format: "Bitcoin Halving Impact"

News Articles:
{}

Topic:"#,
        headlines
    )
}

fn strict_topic_prompt(headlines: &str) -> String {
    format!(
        r#"Read the cryptocurrency headlines below and reply with ONE short topic title (3 to 10 words) describing the most discussed theme.
Reply with the topic only, on a single line, without quotes, numbering or explanation.

Headlines:
{}"#,
        headlines
    )
}

/// Lenient parse: JSON string, JSON array, quoted text, or first meaningful line
fn parse_topic(reply: &str) -> Option<Topic> {
    let text = strip_code_fence(reply);

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        let candidate = match value {
            Value::String(s) => Some(s),
            Value::Array(items) => items.into_iter().find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            }),
            Value::Object(map) => map.get("topic").and_then(|v| v.as_str()).map(String::from),
            _ => None,
        };
        return candidate.and_then(|c| Topic::parse(&clean_line(&c)));
    }

    let line = text
        .lines()
        .map(clean_line)
        .find(|l| !l.is_empty() && !l.eq_ignore_ascii_case("topic:"))?;
    Topic::parse(&line)
}

fn clean_line(line: &str) -> String {
    let mut line = line.trim();
    for prefix in ["Topic:", "topic:", "TOPIC:", "- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest.trim();
        }
    }
    // List numbering like "1. " or "2) ", but not a leading year
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            line = stripped;
        }
    }
    line.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim_end_matches('.')
        .trim()
        .to_string()
}

fn parse_indices(reply: &str, len: usize) -> Vec<usize> {
    let text = strip_code_fence(reply);
    let Some(span) = json_span(text, '[', ']') else {
        return Vec::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<Value>>(span) else {
        return Vec::new();
    };

    let mut seen = Vec::new();
    for idx in values.iter().filter_map(Value::as_u64).map(|i| i as usize) {
        if idx < len && !seen.contains(&idx) {
            seen.push(idx);
        }
    }
    seen
}

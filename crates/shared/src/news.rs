use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::{check_status, Error, Result};
use crate::models::Article;
use crate::retry::RetryPolicy;

const SERVICE: &str = "NewsAPI";
const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";
const REMOVED: &str = "[Removed]";

/// Longest combined description handed to the drafting prompt
const MAX_DESCRIPTION_CHARS: usize = 300;

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Articles for `query` in provider order. Never returns an empty list.
    async fn fetch_articles(&self, query: &str, count: u32) -> Result<Vec<Article>>;
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    source: Option<NewsApiSource>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

pub struct NewsApiClient {
    client: Client,
    api_key: String,
    language: String,
    retry: RetryPolicy,
}

impl NewsApiClient {
    pub fn new(api_key: String, language: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(Error::transport(SERVICE))?;

        Ok(Self {
            client,
            api_key,
            language,
            retry: RetryPolicy::http(),
        })
    }

    async fn try_fetch(&self, query: &str, page_size: u32) -> Result<Vec<Article>> {
        let page_size = page_size.to_string();
        let response = self
            .client
            .get(NEWSAPI_URL)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query),
                ("language", self.language.as_str()),
                ("sortBy", "relevancy"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(Error::transport(SERVICE))?;

        let response = check_status(SERVICE, response).await?;
        let body = response.text().await.map_err(Error::transport(SERVICE))?;
        parse_response(&body)
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    async fn fetch_articles(&self, query: &str, count: u32) -> Result<Vec<Article>> {
        let page_size = count.clamp(1, 100);
        tracing::info!(query, page_size, "Fetching articles from NewsAPI");

        let articles = self
            .retry
            .run("newsapi.everything", |_| self.try_fetch(query, page_size))
            .await?;

        if articles.is_empty() {
            return Err(Error::Validation(format!(
                "NewsAPI returned no usable articles for '{}'",
                query
            )));
        }

        tracing::info!(count = articles.len(), "Fetched articles");
        Ok(articles)
    }
}

fn parse_response(body: &str) -> Result<Vec<Article>> {
    let parsed: NewsApiResponse =
        serde_json::from_str(body).map_err(|e| Error::malformed(SERVICE, e))?;

    if parsed.status != "ok" {
        return Err(Error::Api {
            service: SERVICE,
            status: 200,
            body: parsed.message.unwrap_or(parsed.status),
        });
    }

    Ok(parsed.articles.into_iter().filter_map(into_article).collect())
}

fn into_article(raw: NewsApiArticle) -> Option<Article> {
    let usable = |s: Option<String>| {
        s.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != REMOVED)
    };

    let title = usable(raw.title)?;
    Some(Article {
        title,
        summary: usable(raw.description).unwrap_or_default(),
        url: usable(raw.url).unwrap_or_default(),
        source_name: raw.source.and_then(|s| s.name).unwrap_or_default(),
        content: usable(raw.content).unwrap_or_default(),
    })
}

/// Aggregated view of the articles that feed the drafting prompt
#[derive(Debug, Clone, Default)]
pub struct SourceDigest {
    pub combined_content: String,
    pub combined_description: String,
    pub primary_source_url: String,
    pub source_domains: Vec<String>,
}

impl SourceDigest {
    pub fn from_articles(articles: &[Article], category: &str) -> Self {
        let mut sections = Vec::new();
        let mut descriptions = Vec::new();
        let mut domains = BTreeSet::new();

        for article in articles {
            let mut section = format!("### Source: {}\n\n", article.title);
            if !article.summary.is_empty() {
                section.push_str(&article.summary);
                section.push('\n');
                descriptions.push(article.summary.as_str());
            }
            if article.content.chars().count() > 50 {
                section.push_str(&article.content);
                section.push('\n');
            }
            sections.push(section);

            if let Some(domain) = article.domain() {
                domains.insert(domain.to_string());
            }
        }

        let combined_content = if sections.is_empty() {
            "No substantial content found from sources.".to_string()
        } else {
            sections.join("\n\n---\n\n")
        };

        let combined_description = if descriptions.is_empty() {
            format!("A deep dive into recent developments in {}.", category)
        } else {
            truncate_chars(&descriptions.join(" "), MAX_DESCRIPTION_CHARS)
                .trim()
                .to_string()
        };

        let primary_source_url = articles
            .iter()
            .map(|a| a.url.as_str())
            .find(|u| !u.is_empty())
            .unwrap_or_default()
            .to_string();

        Self {
            combined_content,
            combined_description,
            primary_source_url,
            source_domains: domains.into_iter().collect(),
        }
    }

    /// Combined content cut for prompt use, marking the cut
    pub fn content_for_prompt(&self, max_chars: usize) -> String {
        if self.combined_content.chars().count() <= max_chars {
            return self.combined_content.clone();
        }
        format!(
            "{}\n\n[...Content truncated for prompt brevity...]",
            truncate_chars(&self.combined_content, max_chars)
        )
    }
}

/// Truncate to at most `max` characters, respecting UTF-8 boundaries
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Longest topic we accept from the model, in characters.
pub const MAX_TOPIC_CHARS: usize = 120;

/// A news article as returned by the search provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub source_name: String,
    /// Often truncated by the provider
    pub content: String,
}

impl Article {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            url: url.into(),
            source_name: String::new(),
            content: String::new(),
        }
    }

    pub fn domain(&self) -> Option<&str> {
        let rest = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))?;
        rest.split('/').next().filter(|d| !d.is_empty())
    }
}

/// The single trending subject of one run. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Trims the candidate and cuts it at a word boundary if it is too long.
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.chars().count() <= MAX_TOPIC_CHARS {
            return Some(Self(trimmed.to_string()));
        }

        let mut cut = String::new();
        for word in trimmed.split_whitespace() {
            let next_len = cut.chars().count() + word.chars().count() + usize::from(!cut.is_empty());
            if next_len > MAX_TOPIC_CHARS {
                break;
            }
            if !cut.is_empty() {
                cut.push(' ');
            }
            cut.push_str(word);
        }

        // A single oversized word: hard cut on a char boundary
        if cut.is_empty() {
            cut = trimmed.chars().take(MAX_TOPIC_CHARS).collect();
        }

        Some(Self(cut))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SEO research produced before drafting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchBrief {
    #[serde(rename = "suggested_blog_title", default)]
    pub suggested_title: String,
    #[serde(default)]
    pub primary_keywords: Vec<String>,
    #[serde(default)]
    pub secondary_keywords: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub competitor_insights: String,
    #[serde(rename = "blog_outline", default)]
    pub outline: String,
}

impl ResearchBrief {
    pub fn secondary_flat(&self) -> Vec<String> {
        self.secondary_keywords.values().flatten().cloned().collect()
    }
}

/// Metadata block at the top of a generated article
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
}

impl PostMetadata {
    /// Blog labels: tags then categories, lowercased and de-duplicated.
    /// Falls back to title words when no tags exist. Always carries `category`.
    pub fn labels(&self, title: &str, category: &str) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();

        for label in self.tags.iter().chain(self.categories.iter()) {
            push_label(&mut labels, label);
        }

        if labels.is_empty() {
            for word in title
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.chars().count() > 3)
                .take(5)
            {
                push_label(&mut labels, word);
            }
        }

        push_label(&mut labels, category);
        labels
    }
}

fn push_label(labels: &mut Vec<String>, label: &str) {
    let label = label.trim().to_lowercase();
    if !label.is_empty() && !labels.contains(&label) {
        labels.push(label);
    }
}

/// A drafted article split into metadata and markdown body
#[derive(Debug, Clone)]
pub struct GeneratedArticle {
    pub metadata: PostMetadata,
    pub body_markdown: String,
}

impl GeneratedArticle {
    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or_default()
    }
}

/// Featured image after transformation
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub jpeg: Vec<u8>,
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// Final post ready for the blog API
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub title: String,
    pub html: String,
    pub labels: Vec<String>,
}

/// Blog API response for a created post
#[derive(Debug, Clone, Deserialize)]
pub struct PublishedPost {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

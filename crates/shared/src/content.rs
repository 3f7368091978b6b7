use crate::error::{Error, Result};
use crate::llm::{strip_code_fence, Generation, TextModel};
use crate::markup::{clean_ai_artifacts, parse_generated};
use crate::models::{GeneratedArticle, ResearchBrief, Topic};
use crate::news::{truncate_chars, SourceDigest};

/// Source text handed to the drafting prompt
pub const PROMPT_CONTENT_CHARS: usize = 4000;
const MAX_DESCRIPTION_CHARS: usize = 155;
const MIN_WORDS: u32 = 2000;
const MAX_WORDS: u32 = 3000;

/// Everything the drafting stage needs for one post
pub struct DraftRequest<'a> {
    pub topic: &'a Topic,
    pub digest: &'a SourceDigest,
    pub brief: &'a ResearchBrief,
    pub image_file_name: Option<&'a str>,
    pub category: &'a str,
}

impl DraftRequest<'_> {
    fn title(&self) -> &str {
        let suggested = self.brief.suggested_title.trim();
        if suggested.is_empty() {
            self.topic.as_str()
        } else {
            suggested
        }
    }

    fn description(&self) -> String {
        let flat: String = self
            .digest
            .combined_description
            .replace('"', "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        truncate_chars(&flat, MAX_DESCRIPTION_CHARS).trim().to_string()
    }

    fn categories(&self) -> Vec<String> {
        std::iter::once(self.category.to_string())
            .chain(self.brief.primary_keywords.iter().take(2).cloned())
            .collect()
    }

    fn tags(&self) -> Vec<String> {
        self.brief
            .primary_keywords
            .iter()
            .cloned()
            .chain(self.brief.secondary_flat().into_iter().take(5))
            .collect()
    }
}

pub struct ContentGenerator<'a> {
    model: &'a dyn TextModel,
}

impl<'a> ContentGenerator<'a> {
    pub fn new(model: &'a dyn TextModel) -> Self {
        Self { model }
    }

    /// Draft the article. An empty reply or one without a detectable title is
    /// regenerated exactly once with a corrective prompt.
    pub async fn generate(&self, request: &DraftRequest<'_>) -> Result<GeneratedArticle> {
        tracing::info!(title = %request.title(), "Generating blog content");
        let prompt = drafting_prompt(request);

        let first = match self.draft(&prompt).await {
            Ok(article) => Some(article),
            Err(Error::EmptyResponse { service }) => {
                tracing::warn!(service, "Empty draft reply");
                None
            }
            Err(e) => return Err(e),
        };
        let mut article = match first {
            Some(article) if article.metadata.title.is_some() => article,
            _ => {
                tracing::warn!("Draft has no title, regenerating once");
                self.draft(&corrective_prompt(&prompt, request.title())).await?
            }
        };

        if article.metadata.title.is_none() {
            return Err(Error::Validation(
                "Generated article has no title after regeneration".to_string(),
            ));
        }
        if article.body_markdown.trim().is_empty() {
            return Err(Error::Validation("Generated article has an empty body".to_string()));
        }

        fill_defaults(&mut article, request);
        tracing::info!(
            title = %article.title(),
            body_chars = article.body_markdown.len(),
            words = article.body_markdown.split_whitespace().count(),
            "Blog content generated"
        );
        Ok(article)
    }

    async fn draft(&self, prompt: &str) -> Result<GeneratedArticle> {
        let reply = self.model.generate(prompt, Generation::DRAFT).await?;
        tracing::debug!(chars = reply.len(), "Raw draft received");

        let mut article = parse_generated(strip_code_fence(&reply));
        article.body_markdown = clean_ai_artifacts(&article.body_markdown);
        Ok(article)
    }
}

fn fill_defaults(article: &mut GeneratedArticle, request: &DraftRequest<'_>) {
    let meta = &mut article.metadata;
    if meta.description.is_none() {
        meta.description = Some(request.description());
    }
    if meta.date.is_none() {
        meta.date = Some(chrono::Utc::now().format("%Y-%m-%d").to_string());
    }
    if meta.categories.is_empty() {
        meta.categories = request.categories();
    }
    if meta.tags.is_empty() {
        meta.tags = request.tags();
    }
    if meta.featured_image.is_none() {
        meta.featured_image = request.image_file_name.map(String::from);
    }
}

fn drafting_prompt(request: &DraftRequest<'_>) -> String {
    let title = request.title();
    let brief = request.brief;
    let primary = brief.primary_keywords.join(", ");
    let secondary = brief.secondary_flat().join(", ");
    let image = request.image_file_name.unwrap_or("None");
    let today = chrono::Utc::now().format("%Y-%m-%d");

    let mut prompt = String::new();
    prompt.push_str(
        "You are a specialized Crypto Blog Writing Agent that turns SEO research and aggregated \
        news coverage into comprehensive, publication-ready, SEO-optimized blog posts for the \
        cryptocurrency and blockchain industry.\n\n",
    );

    prompt.push_str("## Inputs\n\n");
    prompt.push_str(&format!("Trending topic: {}\n", request.topic));
    prompt.push_str(&format!("Primary source: {}\n\n", request.digest.primary_source_url));
    prompt.push_str("### Aggregated source content\n\n");
    prompt.push_str(&request.digest.content_for_prompt(PROMPT_CONTENT_CHARS));
    prompt.push_str("\n\n### Research brief\n\n");
    prompt.push_str(&format!("Suggested title: {}\n", title));
    prompt.push_str(&format!("Primary keywords: {}\n", primary));
    prompt.push_str(&format!("Secondary keywords: {}\n", secondary));
    if !brief.competitor_insights.is_empty() {
        prompt.push_str(&format!("Competitor insights: {}\n", brief.competitor_insights));
    }
    if !brief.outline.is_empty() {
        prompt.push_str(&format!("\nOutline:\n{}\n", brief.outline));
    }
    prompt.push_str(&format!(
        "\nFeatured image file: '{}' (handled by the page template, never embed it)\n\n",
        image
    ));

    prompt.push_str("## Content Specifications\n\n");
    prompt.push_str(&format!(
        "- Word count: {}-{} words. Synthesize and expand on the source content, never copy it.\n",
        MIN_WORDS, MAX_WORDS
    ));
    prompt.push_str(
        "- Headings: follow the outline, using `##` and `###` only below the H1 title.\n\
        - Style: professional yet conversational for a broad crypto audience. Never mention being an AI.\n",
    );
    prompt.push_str(&format!(
        "- Keywords: weave in the primary keywords ({}) and secondary keywords ({}) naturally, without stuffing.\n",
        primary, secondary
    ));
    prompt.push_str(
        "- Links: only plausible URLs on reputable crypto domains (cointelegraph.com, decrypt.co, \
        ethereum.org, bitcoin.org). No `@` before links and no placeholder domains such as example.com.\n\
        - Images: do NOT include any markdown image syntax.\n\n",
    );

    prompt.push_str("## Output Structure\n\n");
    prompt.push_str(
        "Start with this metadata block (exact key: value lines, no --- delimiters), then a blank line, then the article.\n\n",
    );
    prompt.push_str(&format!("title: {}\n", title));
    prompt.push_str(&format!("description: {}\n", request.description()));
    prompt.push_str(&format!("date: {}\n", today));
    prompt.push_str(&format!("categories: [{}]\n", request.categories().join(", ")));
    prompt.push_str(&format!("tags: [{}]\n", request.tags().join(", ")));
    prompt.push_str(&format!("featuredImage: {}\n\n", image));

    prompt.push_str(&format!(
        "Article:\n\
        1. Main title as an H1: `# {}`.\n\
        2. Introduction of 2-3 paragraphs.\n\
        3. Main sections following the outline.\n\
        4. An FAQ section with 5-7 questions.\n\
        5. A conclusion with key takeaways and a call to action.\n\n\
        The {} category is the focus of this blog. Do NOT add remarks outside the article, \
        bracketed instructions, placeholders or comments addressed to the editor.",
        title, request.category
    ));
    prompt
}

fn corrective_prompt(original: &str, title: &str) -> String {
    format!(
        "{}\n\nIMPORTANT: your previous answer had no title. The very first line of your answer \
        MUST be `title: {}` followed by the rest of the metadata block, and the article MUST \
        start with `# {}`.",
        original, title, title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_articles, ScriptedModel};
    use std::collections::BTreeMap;

    fn brief() -> ResearchBrief {
        ResearchBrief {
            suggested_title: "Bitcoin ETFs Reshape Crypto Markets".into(),
            primary_keywords: vec!["bitcoin etf".into(), "spot etf".into(), "btc".into()],
            secondary_keywords: BTreeMap::from([(
                "flows".to_string(),
                vec!["etf inflows".to_string(), "etf outflows".to_string()],
            )]),
            competitor_insights: "Competitors skip the history.".into(),
            outline: "## Introduction\n\n## Flows\n\n## Conclusion".into(),
        }
    }

    const DRAFT: &str = "title: Bitcoin ETFs Reshape Crypto Markets\n\
        description: Spot ETFs changed everything\n\
        \n\
        # Bitcoin ETFs Reshape Crypto Markets\n\
        \n\
        ## Introduction\n\
        \n\
        Spot ETFs [Insert stat here] arrived. Read [more](https://example.com/x).\n\
        \n\
        Note: double-check the figures.\n";

    #[tokio::test]
    async fn test_generate_parses_and_cleans() {
        let topic = Topic::parse("Bitcoin ETFs").unwrap();
        let digest = SourceDigest::from_articles(&sample_articles(3), "crypto");
        let brief = brief();
        let request = DraftRequest {
            topic: &topic,
            digest: &digest,
            brief: &brief,
            image_file_name: Some("bitcoin_etfs_1700000000.jpg"),
            category: "crypto",
        };
        let model = ScriptedModel::new([format!("```markdown\n{}```", DRAFT)]);

        let article = ContentGenerator::new(&model).generate(&request).await.unwrap();

        assert_eq!(article.title(), "Bitcoin ETFs Reshape Crypto Markets");
        assert_eq!(article.metadata.description.as_deref(), Some("Spot ETFs changed everything"));
        assert!(article.body_markdown.starts_with("## Introduction"));
        assert!(article.body_markdown.contains("Read more."));
        assert!(!article.body_markdown.contains("Insert stat"));
        assert!(!article.body_markdown.contains("double-check"));

        // Defaults come from the brief and category
        assert_eq!(article.metadata.categories, vec!["crypto", "bitcoin etf", "spot etf"]);
        assert_eq!(
            article.metadata.tags,
            vec!["bitcoin etf", "spot etf", "btc", "etf inflows", "etf outflows"]
        );
        assert_eq!(
            article.metadata.featured_image.as_deref(),
            Some("bitcoin_etfs_1700000000.jpg")
        );
        assert!(article.metadata.date.is_some());
        assert_eq!(model.calls(), 1);

        let prompt = model.prompt(0);
        assert!(prompt.contains("2000-3000 words"));
        assert!(prompt.contains("title: Bitcoin ETFs Reshape Crypto Markets"));
        assert!(prompt.contains("### Source: Bitcoin rallies as ETF demand grows (0)"));
        assert!(prompt.contains("featuredImage: bitcoin_etfs_1700000000.jpg"));
    }

    #[tokio::test]
    async fn test_missing_title_regenerates_exactly_once() {
        let topic = Topic::parse("Solana").unwrap();
        let digest = SourceDigest::default();
        let brief = ResearchBrief::default();
        let request = DraftRequest {
            topic: &topic,
            digest: &digest,
            brief: &brief,
            image_file_name: None,
            category: "crypto",
        };
        let model = ScriptedModel::new([
            "Just prose with no title.",
            "Still no title anywhere.",
            "title: Never reached\n\nBody",
        ]);

        let err = ContentGenerator::new(&model).generate(&request).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(model.calls(), 2);
        assert!(model.prompt(1).contains("your previous answer had no title"));
        assert!(model.prompt(1).contains("title: Solana"));
    }

    #[tokio::test]
    async fn test_regeneration_recovers_title() {
        let topic = Topic::parse("Solana").unwrap();
        let digest = SourceDigest::from_articles(&sample_articles(1), "crypto");
        let brief = ResearchBrief::default();
        let request = DraftRequest {
            topic: &topic,
            digest: &digest,
            brief: &brief,
            image_file_name: None,
            category: "crypto",
        };
        let model = ScriptedModel::new(["No title here.", "# Solana Rebounds\n\nSolid body."]);

        let article = ContentGenerator::new(&model).generate(&request).await.unwrap();

        assert_eq!(article.title(), "Solana Rebounds");
        assert_eq!(model.calls(), 2);
        assert_eq!(
            article.metadata.description.as_deref(),
            Some("Analysts point to institutional flows into Bitcoin.")
        );
        assert_eq!(article.metadata.categories, vec!["crypto"]);
    }

    #[tokio::test]
    async fn test_empty_reply_gets_one_corrective_regeneration() {
        let topic = Topic::parse("Solana").unwrap();
        let digest = SourceDigest::from_articles(&sample_articles(1), "crypto");
        let brief = ResearchBrief::default();
        let request = DraftRequest {
            topic: &topic,
            digest: &digest,
            brief: &brief,
            image_file_name: None,
            category: "crypto",
        };
        let model = ScriptedModel::default();
        model.push_error(Error::EmptyResponse { service: "Gemini" });
        model.push_reply("# Solana Rebounds\n\nSolid body.");

        let article = ContentGenerator::new(&model).generate(&request).await.unwrap();

        assert_eq!(article.title(), "Solana Rebounds");
        assert_eq!(model.calls(), 2);
        assert!(model.prompt(1).contains("title: Solana"));

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(article.metadata.date.as_deref(), Some(today.as_str()));
        assert!(model.prompt(1).contains(&today));
    }

    #[test]
    fn test_description_is_flattened_and_capped() {
        let topic = Topic::parse("t").unwrap();
        let digest = SourceDigest {
            combined_description: format!("\"Quoted\"\nline {}", "x".repeat(300)),
            ..Default::default()
        };
        let brief = ResearchBrief::default();
        let request = DraftRequest {
            topic: &topic,
            digest: &digest,
            brief: &brief,
            image_file_name: None,
            category: "crypto",
        };
        let description = request.description();
        assert!(description.starts_with("Quoted line x"));
        assert_eq!(description.chars().count(), MAX_DESCRIPTION_CHARS);
    }
}

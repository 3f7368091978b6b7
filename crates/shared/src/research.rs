use crate::error::{Error, Result};
use crate::llm::{json_span, strip_code_fence, Generation, TextModel};
use crate::models::{ResearchBrief, Topic};

/// Well-known outlets always offered to the model as competitors
pub const GLOBAL_COMPETITORS: &[&str] = &[
    "cointelegraph.com",
    "coindesk.com",
    "decrypt.co",
    "theblockcrypto.com",
    "binance.com/blog",
    "ethereum.org",
    "bitcoin.org",
    "forbes.com/crypto",
    "bloomberg.com/crypto",
    "cryptoslate.com",
    "blockworks.co",
    "investopedia.com/cryptocurrency",
];

pub struct ResearchAgent<'a> {
    model: &'a dyn TextModel,
}

impl<'a> ResearchAgent<'a> {
    pub fn new(model: &'a dyn TextModel) -> Self {
        Self { model }
    }

    /// SEO keyword research and outline for `topic`.
    pub async fn research(&self, topic: &Topic, competitors: &[String]) -> Result<ResearchBrief> {
        tracing::info!(topic = %topic, "Generating SEO research brief");

        let reply = self
            .model
            .generate(&research_prompt(topic, competitors), Generation::RESEARCH)
            .await?;

        let mut brief = parse_brief(&reply)?;
        if brief.suggested_title.trim().is_empty() {
            brief.suggested_title = topic.to_string();
        }

        tracing::info!(
            title = %brief.suggested_title,
            primary_keywords = ?brief.primary_keywords,
            "Research brief ready"
        );
        Ok(brief)
    }
}

/// Our own competitor list merged with the domains seen in the sources
pub fn merge_competitors(source_domains: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = GLOBAL_COMPETITORS.iter().map(|s| s.to_string()).collect();
    for domain in source_domains {
        let bare = domain.trim_start_matches("www.");
        if !merged.iter().any(|c| c == bare) {
            merged.push(bare.to_string());
        }
    }
    merged
}

fn research_prompt(topic: &Topic, competitors: &[String]) -> String {
    let competitor_list = competitors
        .iter()
        .take(5)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r###"You are an expert SEO Keyword Research Agent specializing in crypto market analysis and content strategy. Perform comprehensive SEO keyword research and outline generation for the trending crypto topic: '{topic}'.

Analyze content from top crypto competitors (e.g., {competitor_list}) to identify relevant SEO keywords, content gaps, and structural insights for the cryptocurrency, blockchain, DeFi, NFT, and Web3 space.

Generate a unique, catchy, and SEO-optimized blog post title (H1), distinct from the source headlines.

## Process
1. Keyword discovery: primary (high volume, high relevance) and secondary (long-tail) keyword clusters for different user intents.
2. Competitive analysis: 2-3 key insights into competitor strategies and content gaps.
3. Outline creation: a hierarchical outline using markdown headings (## and ###) with at least 8 headings, including FAQ and data-point sections where appropriate.

## Output
Return a single JSON object inside a ```json block with exactly this structure:
{{
  "suggested_blog_title": "Title under 70 characters",
  "primary_keywords": ["keyword1", "keyword2", "keyword3"],
  "secondary_keywords": {{"sub_topic1": ["long-tail A", "long-tail B"]}},
  "competitor_insights": "Summary of competitor strategies and gaps.",
  "blog_outline": "## Introduction\n\n### ...\n\n## Conclusion\n"
}}
Exclude branded competitor terms. Do NOT include any remarks outside the JSON block."###
    )
}

fn parse_brief(reply: &str) -> Result<ResearchBrief> {
    let text = strip_code_fence(reply);
    let json = json_span(text, '{', '}').unwrap_or(text);

    serde_json::from_str::<ResearchBrief>(json).map_err(|e| {
        Error::malformed(
            "Gemini",
            format!(
                "research brief is not valid JSON ({}): {}",
                e,
                reply.chars().take(300).collect::<String>()
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    const BRIEF: &str = r###"```json
{
  "suggested_blog_title": "Bitcoin ETFs: The Flood of Institutional Money",
  "primary_keywords": ["bitcoin etf", "institutional crypto"],
  "secondary_keywords": {"flows": ["etf inflows 2025"], "risk": ["etf outflows"]},
  "competitor_insights": "Most outlets only report numbers.",
  "blog_outline": "## Introduction\n\n## Why Flows Matter\n\n## Conclusion"
}
```"###;

    #[tokio::test]
    async fn test_research_parses_fenced_json() {
        let model = ScriptedModel::new([BRIEF]);
        let topic = Topic::parse("Bitcoin ETF Inflows").unwrap();

        let brief = ResearchAgent::new(&model)
            .research(&topic, &merge_competitors(&[]))
            .await
            .unwrap();

        assert_eq!(brief.suggested_title, "Bitcoin ETFs: The Flood of Institutional Money");
        assert_eq!(brief.primary_keywords, vec!["bitcoin etf", "institutional crypto"]);
        assert_eq!(brief.secondary_flat(), vec!["etf inflows 2025", "etf outflows"]);
        assert!(brief.outline.contains("## Why Flows Matter"));
        assert!(model.prompt(0).contains("cointelegraph.com, coindesk.com"));
    }

    #[test]
    fn test_prompt_carries_whole_json_template() {
        let topic = Topic::parse("Bitcoin ETF Inflows").unwrap();
        let prompt = research_prompt(&topic, &["coindesk.com".to_string()]);

        assert!(prompt.contains("trending crypto topic: 'Bitcoin ETF Inflows'"));
        assert!(prompt.contains("(e.g., coindesk.com)"));
        assert!(prompt.contains(r###"  "competitor_insights": "Summary of competitor strategies and gaps.","###));
        assert!(prompt.contains(r###"  "blog_outline": "## Introduction\n\n### ...\n\n## Conclusion\n""###));
        assert!(prompt.contains(r#"  "secondary_keywords": {"sub_topic1": ["long-tail A", "long-tail B"]},"#));
        assert!(prompt.ends_with("Do NOT include any remarks outside the JSON block."));
    }

    #[tokio::test]
    async fn test_missing_title_defaults_to_topic() {
        let model = ScriptedModel::new([r#"{"primary_keywords": ["defi"]}"#]);
        let topic = Topic::parse("DeFi Yields").unwrap();

        let brief = ResearchAgent::new(&model).research(&topic, &[]).await.unwrap();
        assert_eq!(brief.suggested_title, "DeFi Yields");
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let model = ScriptedModel::new(["I'm sorry, I can't help with that."]);
        let topic = Topic::parse("DeFi").unwrap();

        let err = ResearchAgent::new(&model).research(&topic, &[]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
    }

    #[test]
    fn test_merge_competitors_dedups_sources() {
        let merged = merge_competitors(&["www.coindesk.com".into(), "theblock.co".into()]);
        assert_eq!(merged.len(), GLOBAL_COMPETITORS.len() + 1);
        assert_eq!(merged.last().map(String::as_str), Some("theblock.co"));
    }
}

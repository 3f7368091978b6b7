use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;

use crate::content::{ContentGenerator, DraftRequest};
use crate::html::{HtmlAssembler, PageInput};
use crate::image_gen::{image_prompt, ImageModel};
use crate::imaging::ImageTransformer;
use crate::llm::TextModel;
use crate::models::{Post, PublishedPost, Topic};
use crate::news::{NewsSource, SourceDigest};
use crate::output::ArtifactWriter;
use crate::publisher::Publisher;
use crate::research::{merge_competitors, ResearchAgent};
use crate::topics::{TopicExtractor, RELEVANT_ARTICLE_LIMIT};

/// Per-run knobs, usually from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub query: String,
    pub article_count: u32,
    pub category: String,
    /// Publish as a draft instead of a live post
    pub draft: bool,
}

/// What one run produced
#[derive(Debug)]
pub struct RunReport {
    pub topic: Topic,
    pub title: String,
    pub labels: Vec<String>,
    pub image_path: PathBuf,
    pub html_path: PathBuf,
    pub published: Option<PublishedPost>,
}

/// One strictly sequential run from news search to published post.
pub struct Pipeline<'a> {
    pub news: &'a dyn NewsSource,
    pub text: &'a dyn TextModel,
    pub images: &'a dyn ImageModel,
    pub transformer: &'a ImageTransformer,
    pub artifacts: ArtifactWriter,
    /// `None` writes drafts to disk only
    pub publisher: Option<Publisher<'a>>,
}

impl<'a> Pipeline<'a> {
    pub async fn run(mut self, options: &RunOptions) -> Result<RunReport> {
        // Fail on bad credentials before spending any model calls
        if let Some(publisher) = self.publisher.as_mut() {
            publisher
                .ensure_valid_credential()
                .await
                .context("Blogger credential is not usable")?;
        }

        let articles = self
            .news
            .fetch_articles(&options.query, options.article_count)
            .await
            .context("Failed to fetch news articles")?;

        let extractor = TopicExtractor::new(self.text);
        let topic = extractor
            .extract(&articles)
            .await
            .context("Failed to extract a trending topic")?;
        tracing::info!(topic = %topic, "Selected trending topic");

        let relevant = extractor
            .select_relevant(&articles, &topic, RELEVANT_ARTICLE_LIMIT)
            .await;
        let digest = SourceDigest::from_articles(&relevant, &options.category);

        let brief = ResearchAgent::new(self.text)
            .research(&topic, &merge_competitors(&digest.source_domains))
            .await
            .context("SEO research failed")?;

        let raw_image = self
            .images
            .generate_image(&image_prompt(&topic))
            .await
            .context("Image generation failed")?;
        let image = self
            .transformer
            .transform(&raw_image, &brief.suggested_title)
            .context("Image transformation failed")?;
        let image_name = ArtifactWriter::image_file_name(&brief.suggested_title, Utc::now().timestamp());
        let image_path = self.artifacts.save_image(&image_name, &image.jpeg)?;

        let article = ContentGenerator::new(self.text)
            .generate(&DraftRequest {
                topic: &topic,
                digest: &digest,
                brief: &brief,
                image_file_name: Some(&image_name),
                category: &options.category,
            })
            .await
            .context("Content generation failed")?;

        let title = article.title().to_string();
        let meta = &article.metadata;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let html = HtmlAssembler::assemble(&PageInput {
            title: &title,
            description: meta.description.as_deref().unwrap_or_default(),
            keywords: &meta.tags,
            image_data_uri: &image.data_uri,
            body_markdown: &article.body_markdown,
            category: &options.category,
            source_url: &digest.primary_source_url,
            published_date: meta.date.as_deref().unwrap_or(&today),
        });
        let html_path = self.artifacts.save_html(&title, &html)?;
        let labels = meta.labels(&title, &options.category);

        let published = match self.publisher.as_mut() {
            Some(publisher) => {
                let post = Post {
                    title: title.clone(),
                    html,
                    labels: labels.clone(),
                };
                Some(
                    publisher
                        .publish(&post, options.draft)
                        .await
                        .context("Failed to publish to Blogger")?,
                )
            }
            None => {
                tracing::info!(path = %html_path.display(), "Publishing disabled, draft kept on disk");
                None
            }
        };

        Ok(RunReport {
            topic,
            title,
            labels,
            image_path,
            html_path,
            published,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{Credential, CredentialStore};
    use crate::testing::{sample_articles, sample_png, FakeBlogger, FixedImage, FixedNews, ScriptedModel};

    const BRIEF: &str = r###"{"suggested_blog_title": "Bitcoin ETF Flows Explained",
        "primary_keywords": ["bitcoin etf", "etf flows"],
        "secondary_keywords": {"risk": ["etf outflows"]},
        "competitor_insights": "", "blog_outline": "## Intro\n\n## Flows"}"###;

    const DRAFT: &str = "title: Bitcoin ETF Flows Explained\n\
        description: Where the money went\n\
        tags: [Bitcoin ETF, ETF Flows]\n\
        \n\
        # Bitcoin ETF Flows Explained\n\
        \n\
        ## Intro\n\
        \n\
        Money moved. ![chart](https://x.io/c.png)\n";

    fn model() -> ScriptedModel {
        ScriptedModel::new(["\"Bitcoin ETF Flows\"", "[2, 0]", BRIEF, DRAFT])
    }

    fn options() -> RunOptions {
        RunOptions {
            query: "cryptocurrency".into(),
            article_count: 100,
            category: "crypto".into(),
            draft: true,
        }
    }

    #[tokio::test]
    async fn test_run_writes_artifacts_without_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let news = FixedNews(sample_articles(5));
        let text = model();
        let images = FixedImage(sample_png(1024, 576));
        let transformer = ImageTransformer::new(None, None).unwrap();

        let report = Pipeline {
            news: &news,
            text: &text,
            images: &images,
            transformer: &transformer,
            artifacts: ArtifactWriter::new(&dir.path().join("img"), &dir.path().join("html"), "crypto"),
            publisher: None,
        }
        .run(&options())
        .await
        .unwrap();

        assert_eq!(report.topic.as_str(), "Bitcoin ETF Flows");
        assert_eq!(report.title, "Bitcoin ETF Flows Explained");
        assert_eq!(report.labels, vec!["bitcoin etf", "etf flows", "crypto"]);
        assert!(report.published.is_none());
        assert_eq!(text.calls(), 4);

        // Research and drafting see only the ranked articles
        assert!(text.prompt(3).contains("(2)"));
        assert!(!text.prompt(3).contains("(4)"));

        let html = std::fs::read_to_string(&report.html_path).unwrap();
        assert_eq!(html.matches("<img").count(), 1);
        assert_eq!(html.matches("<h1>").count(), 1);
        assert!(html.contains("https://news2.example.org/solana"));

        let jpeg = std::fs::read(&report.image_path).unwrap();
        let img = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (1200, 675));
        assert!(report.image_path.starts_with(dir.path().join("img/crypto")));
    }

    #[tokio::test]
    async fn test_run_publishes_with_refreshed_token() {
        let dir = tempfile::tempdir().unwrap();
        let news = FixedNews(sample_articles(5));
        let text = model();
        let images = FixedImage(sample_png(800, 800));
        let transformer = ImageTransformer::new(None, None).unwrap();
        let blogger = FakeBlogger::default();
        let store = CredentialStore::new(dir.path().join("token.json"));
        let expired = Credential::from_json(
            r#"{"token":"old","refresh_token":"r","expiry":"2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let report = Pipeline {
            news: &news,
            text: &text,
            images: &images,
            transformer: &transformer,
            artifacts: ArtifactWriter::new(&dir.path().join("img"), &dir.path().join("html"), "crypto"),
            publisher: Some(Publisher::new(&blogger, store.clone(), Some(expired), "blog-1")),
        }
        .run(&options())
        .await
        .unwrap();

        assert_eq!(report.published.unwrap().id, "42");
        assert_eq!(*blogger.refreshes.lock().unwrap(), 1);
        assert_eq!(*blogger.tokens_used.lock().unwrap(), vec!["fresh-token"]);

        let posts = blogger.posts.lock().unwrap();
        let (post, draft) = &posts[0];
        assert!(*draft);
        assert_eq!(post.title, "Bitcoin ETF Flows Explained");
        assert!(post.html.contains("data:image/jpeg;base64,"));
        assert_eq!(
            store.load(None).unwrap().unwrap().token.as_deref(),
            Some("fresh-token")
        );
    }

    #[tokio::test]
    async fn test_unusable_credential_aborts_before_any_model_call() {
        let dir = tempfile::tempdir().unwrap();
        let news = FixedNews(sample_articles(5));
        let text = model();
        let images = FixedImage(sample_png(64, 64));
        let transformer = ImageTransformer::new(None, None).unwrap();
        let blogger = FakeBlogger::default();

        let err = Pipeline {
            news: &news,
            text: &text,
            images: &images,
            transformer: &transformer,
            artifacts: ArtifactWriter::new(&dir.path().join("img"), &dir.path().join("html"), "crypto"),
            publisher: Some(Publisher::new(
                &blogger,
                CredentialStore::new(dir.path().join("token.json")),
                None,
                "blog-1",
            )),
        }
        .run(&options())
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Blogger credential"));
        assert_eq!(text.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_news_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let news = FixedNews(Vec::new());
        let text = model();
        let images = FixedImage(Vec::new());
        let transformer = ImageTransformer::new(None, None).unwrap();

        let err = Pipeline {
            news: &news,
            text: &text,
            images: &images,
            transformer: &transformer,
            artifacts: ArtifactWriter::new(&dir.path().join("img"), &dir.path().join("html"), "crypto"),
            publisher: None,
        }
        .run(&options())
        .await
        .unwrap_err();

        assert!(err.to_string().contains("fetch news"));
        assert_eq!(text.calls(), 0);
    }
}

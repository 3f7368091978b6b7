// Public modules
pub mod config;
pub mod content;
pub mod error;
pub mod html;
pub mod image_gen;
pub mod imaging;
pub mod llm;
pub mod markup;
pub mod models;
pub mod news;
pub mod oauth;
pub mod output;
pub mod pipeline;
pub mod publisher;
pub mod research;
pub mod retry;
pub mod topics;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use content::{ContentGenerator, DraftRequest};
pub use error::{Error, Result};
pub use html::{HtmlAssembler, PageInput};
pub use image_gen::{ImageModel, TogetherClient};
pub use imaging::ImageTransformer;
pub use llm::{GeminiClient, Generation, TextModel};
pub use models::{Article, GeneratedArticle, Post, PublishedPost, ResearchBrief, Topic};
pub use news::{NewsApiClient, NewsSource, SourceDigest};
pub use oauth::{ClientSecrets, InstalledAppFlow};
pub use output::ArtifactWriter;
pub use pipeline::{Pipeline, RunOptions, RunReport};
pub use publisher::{Authorizer, BloggerApi, BloggerClient, Credential, CredentialStore, Publisher};
pub use research::ResearchAgent;
pub use retry::RetryPolicy;
pub use topics::TopicExtractor;

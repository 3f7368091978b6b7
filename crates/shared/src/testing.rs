//! Scripted fakes of the service traits for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::image_gen::ImageModel;
use crate::llm::{Generation, TextModel};
use crate::models::{Article, Post, PublishedPost};
use crate::news::NewsSource;
use crate::publisher::{BloggerApi, Credential, TokenGrant, BLOGGER_SCOPE};

/// Replies with queued responses in order and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: Error) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _params: Generation) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(Error::EmptyResponse { service: "scripted" }))
    }
}

pub struct FixedNews(pub Vec<Article>);

#[async_trait]
impl NewsSource for FixedNews {
    async fn fetch_articles(&self, _query: &str, count: u32) -> Result<Vec<Article>> {
        if self.0.is_empty() {
            return Err(Error::Validation("no articles".into()));
        }
        Ok(self.0.iter().take(count as usize).cloned().collect())
    }
}

pub struct FixedImage(pub Vec<u8>);

#[async_trait]
impl ImageModel for FixedImage {
    async fn generate_image(&self, _prompt: &str) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Blog API that hands out `fresh-token` on refresh and rejects listed tokens.
#[derive(Default)]
pub struct FakeBlogger {
    pub refreshes: Mutex<u32>,
    pub tokens_used: Mutex<Vec<String>>,
    pub posts: Mutex<Vec<(Post, bool)>>,
    pub reject: Mutex<Vec<String>>,
    pub refresh_fails: bool,
}

#[async_trait]
impl BloggerApi for FakeBlogger {
    async fn refresh(&self, _credential: &Credential) -> Result<TokenGrant> {
        *self.refreshes.lock().unwrap() += 1;
        if self.refresh_fails {
            return Err(Error::Api {
                service: "Google OAuth",
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(TokenGrant {
            access_token: "fresh-token".into(),
            expires_in: Some(3599),
            refresh_token: None,
            scope: Some(BLOGGER_SCOPE.into()),
        })
    }

    async fn insert_post(
        &self,
        _blog_id: &str,
        access_token: &str,
        post: &Post,
        draft: bool,
    ) -> Result<PublishedPost> {
        self.tokens_used.lock().unwrap().push(access_token.to_string());
        if self.reject.lock().unwrap().iter().any(|t| t == access_token) {
            return Err(Error::Auth {
                service: "Blogger",
                status: 401,
                body: "Invalid Credentials".into(),
            });
        }
        self.posts.lock().unwrap().push((post.clone(), draft));
        Ok(PublishedPost {
            id: "42".into(),
            url: Some("https://cryptoinsights.blogspot.com/42".into()),
            labels: post.labels.clone(),
        })
    }
}

pub fn sample_articles(n: usize) -> Vec<Article> {
    let coins = ["Bitcoin", "Ethereum", "Solana", "XRP", "Cardano", "Dogecoin"];
    (0..n)
        .map(|i| {
            let coin = coins[i % coins.len()];
            let mut article = Article::new(
                format!("{} rallies as ETF demand grows ({})", coin, i),
                format!("Analysts point to institutional flows into {}.", coin),
                format!("https://news{}.example.org/{}", i, coin.to_lowercase()),
            );
            article.source_name = format!("Source {}", i);
            article
        })
        .collect()
}

/// A PNG of the given size with a diagonal gradient
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{check_status, Error, Result};
use crate::models::{Post, PublishedPost};
use crate::retry::RetryPolicy;

const BLOGGER: &str = "Blogger";
const OAUTH: &str = "Google OAuth";
const BLOGGER_API_URL: &str = "https://www.googleapis.com/blogger/v3/blogs";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const BLOGGER_SCOPE: &str = "https://www.googleapis.com/auth/blogger";

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// OAuth2 user credential in the authorized-user JSON layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "access_token", default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Credential(format!("invalid credential JSON: {}", e)))
    }

    /// Missing access token, or one expiring within the skew window.
    /// A token without a recorded expiry is assumed valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().is_none_or(str::is_empty) {
            return true;
        }
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn apply_grant(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.token = Some(grant.access_token);
        self.expiry = grant.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = grant.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = grant.scope {
            self.scopes = scope.split_whitespace().map(String::from).collect();
        }
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// JSON credential file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credential from `env_json` when given, else from the file if it exists
    pub fn load(&self, env_json: Option<&str>) -> Result<Option<Credential>> {
        if let Some(json) = env_json {
            tracing::info!("Using Blogger credential from environment");
            return Credential::from_json(json).map(Some);
        }
        if !self.path.exists() {
            return Ok(None);
        }
        tracing::info!(path = %self.path.display(), "Loading Blogger credential");
        let json = fs::read_to_string(&self.path)?;
        Credential::from_json(&json).map(Some)
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_string_pretty(credential)?)?;
        fs::rename(&tmp, &self.path)?;
        tracing::info!(path = %self.path.display(), "Saved Blogger credential");
        Ok(())
    }
}

#[async_trait]
pub trait BloggerApi: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant>;

    async fn insert_post(
        &self,
        blog_id: &str,
        access_token: &str,
        post: &Post,
        draft: bool,
    ) -> Result<PublishedPost>;
}

/// Obtains a brand-new credential from the user
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<Credential>;
}

pub struct BloggerClient {
    client: Client,
}

impl BloggerClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(Error::transport(BLOGGER))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BloggerApi for BloggerClient {
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant> {
        let refresh_token = credential.refresh_token.as_deref().unwrap_or_default();
        let response = self
            .client
            .post(&credential.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(Error::transport(OAUTH))?;

        let response = check_status(OAUTH, response).await?;
        response.json().await.map_err(|e| Error::malformed(OAUTH, e))
    }

    async fn insert_post(
        &self,
        blog_id: &str,
        access_token: &str,
        post: &Post,
        draft: bool,
    ) -> Result<PublishedPost> {
        let body = json!({
            "kind": "blogger#post",
            "title": post.title,
            "content": post.html,
            "labels": post.labels,
        });

        let response = self
            .client
            .post(format!("{}/{}/posts/", BLOGGER_API_URL, blog_id))
            .query(&[("isDraft", draft)])
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(Error::transport(BLOGGER))?;

        let response = check_status(BLOGGER, response).await?;
        response.json().await.map_err(|e| Error::malformed(BLOGGER, e))
    }
}

/// Publishes posts with a credential that is refreshed at most once per run.
pub struct Publisher<'a> {
    api: &'a dyn BloggerApi,
    store: CredentialStore,
    credential: Option<Credential>,
    authorizer: Option<&'a dyn Authorizer>,
    blog_id: String,
    retry: RetryPolicy,
    refreshed: bool,
}

impl<'a> Publisher<'a> {
    pub fn new(
        api: &'a dyn BloggerApi,
        store: CredentialStore,
        credential: Option<Credential>,
        blog_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            credential,
            authorizer: None,
            blog_id: blog_id.into(),
            retry: RetryPolicy::http(),
            refreshed: false,
        }
    }

    /// Allow falling back to an interactive authorization
    pub fn with_authorizer(mut self, authorizer: &'a dyn Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Make sure a usable access token is held, refreshing or authorizing as needed.
    pub async fn ensure_valid_credential(&mut self) -> Result<&Credential> {
        let now = Utc::now();
        let needs_work = self.credential.as_ref().is_none_or(|c| c.is_expired(now));

        if needs_work {
            let can_refresh = self.credential.as_ref().is_some_and(Credential::can_refresh);
            if can_refresh && !self.refreshed {
                if let Err(e) = self.refresh().await {
                    if self.authorizer.is_none() {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, "Token refresh failed, starting interactive authorization");
                    self.authorize().await?;
                }
            } else if self.authorizer.is_some() {
                self.authorize().await?;
            } else {
                return Err(Error::Credential(
                    "Blogger credential is missing or expired and cannot be refreshed. \
                    Run authorize-blogger to create a new token file."
                        .to_string(),
                ));
            }
        }

        self.credential
            .as_ref()
            .ok_or_else(|| Error::Credential("no Blogger credential available".to_string()))
    }

    async fn refresh(&mut self) -> Result<()> {
        let Some(credential) = self.credential.as_mut() else {
            return Err(Error::Credential("no credential to refresh".to_string()));
        };

        tracing::info!("Refreshing Blogger access token");
        self.refreshed = true;
        let grant = self.api.refresh(credential).await?;
        credential.apply_grant(grant, Utc::now());
        self.store.save(credential)?;
        Ok(())
    }

    async fn authorize(&mut self) -> Result<()> {
        let Some(authorizer) = self.authorizer else {
            return Err(Error::Credential("interactive authorization unavailable".to_string()));
        };
        let credential = authorizer.authorize().await?;
        self.store.save(&credential)?;
        self.credential = Some(credential);
        Ok(())
    }

    /// Insert `post` as a live post, or as a draft when `draft` is set.
    pub async fn publish(&mut self, post: &Post, draft: bool) -> Result<PublishedPost> {
        self.ensure_valid_credential().await?;

        let can_refresh = self.credential.as_ref().is_some_and(Credential::can_refresh);
        match self.send(post, draft).await {
            Err(e) if e.is_auth() && can_refresh && !self.refreshed => {
                tracing::warn!(error = %e, "Blogger rejected the access token, refreshing once");
                self.refresh().await?;
                self.send(post, draft).await
            }
            result => result,
        }
    }

    async fn send(&self, post: &Post, draft: bool) -> Result<PublishedPost> {
        let token = self
            .credential
            .as_ref()
            .and_then(|c| c.token.as_deref())
            .ok_or_else(|| Error::Credential("no access token".to_string()))?;

        tracing::info!(
            title = %post.title,
            labels = ?post.labels,
            draft,
            "Publishing to Blogger"
        );
        let published = self
            .retry
            .run("blogger.insert", |_| {
                self.api.insert_post(&self.blog_id, token, post, draft)
            })
            .await?;

        tracing::info!(
            id = %published.id,
            url = published.url.as_deref().unwrap_or("unknown"),
            "Post published"
        );
        Ok(published)
    }
}

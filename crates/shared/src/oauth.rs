use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use crate::error::{check_status, Error, Result};
use crate::publisher::{Authorizer, Credential, TokenGrant, BLOGGER_SCOPE, GOOGLE_TOKEN_URI};

const SERVICE: &str = "Google OAuth";
const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// OAuth client registration downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(json)
            .map_err(|e| Error::Credential(format!("invalid client secrets JSON: {}", e)))?;
        file.installed.or(file.web).ok_or_else(|| {
            Error::Credential("client secrets have neither an 'installed' nor a 'web' section".to_string())
        })
    }

    /// Secrets from `env_json` when given, else from `path`
    pub fn resolve(env_json: Option<&str>, path: &Path) -> Result<Self> {
        if let Some(json) = env_json {
            return Self::from_json(json);
        }
        if !path.exists() {
            return Err(Error::Credential(format!(
                "No client secrets found: set GOOGLE_CLIENT_SECRETS_JSON or create {}",
                path.display()
            )));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }

    /// Consent page URL requesting offline Blogger access
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent",
            self.auth_uri,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.redirect_uri()),
            urlencoding::encode(BLOGGER_SCOPE),
        )
    }
}

/// Authorization code from what the user pasted: the full redirected URL or the bare code
pub fn parse_authorization_response(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Credential("no authorization code entered".to_string()));
    }

    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Ok(input.to_string());
    }

    let url = Url::parse(input)
        .map_err(|e| Error::Credential(format!("cannot parse redirected URL: {}", e)))?;
    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => {
                return Err(Error::Credential(format!("authorization denied: {}", value)));
            }
            _ => {}
        }
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Credential("redirected URL has no 'code' parameter".to_string()))
}

/// Manual installed-app flow: print the consent URL, read the redirect back from stdin
pub struct InstalledAppFlow {
    secrets: ClientSecrets,
    client: Client,
}

impl InstalledAppFlow {
    pub fn new(secrets: ClientSecrets) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(Error::transport(SERVICE))?;
        Ok(Self { secrets, client })
    }

    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("redirect_uri", self.secrets.redirect_uri()),
            ])
            .send()
            .await
            .map_err(Error::transport(SERVICE))?;

        let response = check_status(SERVICE, response).await?;
        let grant: TokenGrant = response.json().await.map_err(|e| Error::malformed(SERVICE, e))?;
        if grant.refresh_token.is_none() {
            tracing::warn!("Token endpoint returned no refresh token; the credential will expire within an hour");
        }

        let mut credential = Credential {
            token: None,
            refresh_token: None,
            token_uri: self.secrets.token_uri.clone(),
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            scopes: vec![BLOGGER_SCOPE.to_string()],
            expiry: None,
        };
        credential.apply_grant(grant, chrono::Utc::now());
        Ok(credential)
    }
}

#[async_trait]
impl Authorizer for InstalledAppFlow {
    async fn authorize(&self) -> Result<Credential> {
        eprintln!("\nAuthorize this application to access your Blogger account:\n");
        eprintln!("  {}\n", self.secrets.authorization_url());
        eprintln!(
            "After approving, your browser is redirected to {} (the page may fail to load).",
            self.secrets.redirect_uri()
        );
        eprint!("Paste the full redirected URL or the code here: ");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        let code = parse_authorization_response(&line)?;

        tracing::info!("Exchanging authorization code for Blogger tokens");
        self.exchange_code(&code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLED: &str = r#"{"installed":{"client_id":"123.apps.googleusercontent.com",
        "client_secret":"shh","auth_uri":"https://accounts.google.com/o/oauth2/auth",
        "token_uri":"https://oauth2.googleapis.com/token","redirect_uris":["http://localhost"]}}"#;

    #[test]
    fn test_client_secrets_sections() {
        let secrets = ClientSecrets::from_json(INSTALLED).unwrap();
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");

        let web = ClientSecrets::from_json(r#"{"web":{"client_id":"w","client_secret":"s"}}"#).unwrap();
        assert_eq!(web.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(web.redirect_uri(), DEFAULT_REDIRECT_URI);

        assert!(ClientSecrets::from_json(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn test_resolve_prefers_env_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("client_secrets.json");
        assert!(ClientSecrets::resolve(Some(INSTALLED), &missing).is_ok());
        let err = ClientSecrets::resolve(None, &missing).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_CLIENT_SECRETS_JSON"));
    }

    #[test]
    fn test_authorization_url_is_encoded() {
        let url = ClientSecrets::from_json(INSTALLED).unwrap().authorization_url();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fblogger"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn test_parse_authorization_response() {
        assert_eq!(
            parse_authorization_response("http://localhost/?code=4%2F0Abc&scope=blogger\n").unwrap(),
            "4/0Abc"
        );
        assert_eq!(parse_authorization_response("  4/0Xyz ").unwrap(), "4/0Xyz");
        assert!(parse_authorization_response("http://localhost/?error=access_denied").is_err());
        assert!(parse_authorization_response("http://localhost/?state=x").is_err());
        assert!(parse_authorization_response("").is_err());
    }
}

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::output::sanitize_filename;

const CONFIG_DIR_NAME: &str = "crypto-blog";

#[derive(Debug, Clone)]
pub struct Config {
    pub newsapi_api_key: String,
    pub gemini_api_key: String,
    pub together_api_key: String,
    /// Required only when publishing
    pub blog_id: Option<String>,

    pub gemini_model: String,
    pub image_model: String,

    pub query: String,
    pub article_count: u32,
    pub language: String,
    pub category: String,

    pub branding_logo_path: Option<PathBuf>,
    pub title_font_path: Option<PathBuf>,
    pub image_output_dir: PathBuf,
    pub blog_output_dir: PathBuf,

    pub token_file: PathBuf,
    pub client_secrets_file: PathBuf,
    pub oauth_token_json: Option<String>,
    pub client_secrets_json: Option<String>,

    /// Set when running under CI; disables the interactive OAuth flow
    pub non_interactive: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        let newsapi_api_key = required("NEWSAPI_API_KEY", "https://newsapi.org/account")?;
        let gemini_api_key = required("GEMINI_API_KEY", "https://aistudio.google.com/app/apikey")?;
        let together_api_key =
            required("TOGETHER_API_KEY", "https://api.together.ai/settings/api-keys")?;

        Ok(Self {
            newsapi_api_key,
            gemini_api_key,
            together_api_key,
            blog_id: optional("BLOGGER_BLOG_ID").filter(|id| id != "YOUR_BLOG_ID_HERE"),
            gemini_model: optional("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            image_model: optional("TOGETHER_IMAGE_MODEL")
                .unwrap_or_else(|| "black-forest-labs/FLUX.1-schnell-Free".to_string()),
            query: "cryptocurrency".to_string(),
            article_count: 100,
            language: "en".to_string(),
            category: "crypto".to_string(),
            branding_logo_path: optional("BRANDING_LOGO_PATH").map(PathBuf::from),
            title_font_path: optional("TITLE_FONT_PATH").map(PathBuf::from),
            image_output_dir: optional("IMAGE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("transformed_images")),
            blog_output_dir: optional("BLOG_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("blog_drafts")),
            token_file: optional("BLOGGER_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("token_blogger.json")),
            client_secrets_file: optional("CLIENT_SECRETS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("client_secrets.json")),
            oauth_token_json: optional("GOOGLE_OAUTH_TOKEN_JSON"),
            client_secrets_json: optional("GOOGLE_CLIENT_SECRETS_JSON"),
            non_interactive: is_truthy(optional("CI").as_deref()),
        })
    }

    pub fn require_blog_id(&self) -> Result<&str> {
        self.blog_id.as_deref().context(
            "BLOGGER_BLOG_ID not set.\n\n\
            Add it to ~/.config/crypto-blog/.env or pass --no-publish to only write drafts.",
        )
    }

    /// Ensure the per-category output folders exist
    pub fn ensure_output_dirs(&self) -> Result<()> {
        for dir in [&self.image_output_dir, &self.blog_output_dir] {
            let path = dir.join(sanitize_filename(&self.category));
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create output directory {}", path.display()))?;
        }
        Ok(())
    }

    pub fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/crypto-blog/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(CONFIG_DIR_NAME).join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}

fn required(name: &str, where_to_get: &str) -> Result<String> {
    optional(name).with_context(|| {
        format!(
            "{name} not found.\n\n\
            To fix this, create ~/.config/{CONFIG_DIR_NAME}/.env with:\n  \
            {name}=your_key_here\n\n\
            Get a key from: {where_to_get}"
        )
    })
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn is_truthy(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "" | "0" | "false" | "no"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ci_flag_values() {
        assert!(is_truthy(Some("true")));
        assert!(is_truthy(Some("1")));
        assert!(!is_truthy(Some("false")));
        assert!(!is_truthy(Some("0")));
        assert!(!is_truthy(None));
    }
}

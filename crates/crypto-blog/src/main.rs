use anyhow::{Context, Result};
use clap::Parser;
use shared::{
    ArtifactWriter, BloggerClient, ClientSecrets, Config, CredentialStore, GeminiClient,
    ImageTransformer, InstalledAppFlow, NewsApiClient, Pipeline, Publisher, RunOptions,
    TogetherClient,
};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crypto-blog")]
#[command(about = "Write and publish one blog post about today's trending crypto topic")]
struct Args {
    /// News search query
    #[arg(short, long)]
    query: Option<String>,

    /// Number of articles to fetch (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=100))]
    articles: Option<u32>,

    /// Blog category, used for labels and output folders
    #[arg(short, long)]
    category: Option<String>,

    /// News language code
    #[arg(short, long)]
    language: Option<String>,

    /// Publish as a draft instead of a live post
    #[arg(long)]
    draft: bool,

    /// Only write the image and HTML to disk
    #[arg(long)]
    no_publish: bool,

    /// Log file (appended)
    #[arg(long, default_value = "blog_creation.log")]
    log_file: String,
}

fn init_logging(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(Path::new(&args.log_file))?;

    if let Err(e) = run(args).await {
        tracing::error!(error = %format!("{:#}", e), "Blog run failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(query) = args.query {
        config.query = query;
    }
    if let Some(count) = args.articles {
        config.article_count = count;
    }
    if let Some(category) = args.category {
        config.category = category;
    }
    if let Some(language) = args.language {
        config.language = language;
    }
    config.ensure_output_dirs()?;

    tracing::info!(
        query = %config.query,
        articles = config.article_count,
        category = %config.category,
        publish = !args.no_publish,
        draft = args.draft,
        "Starting blog run"
    );

    let news = NewsApiClient::new(config.newsapi_api_key.clone(), config.language.clone())?;
    let text = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    let images = TogetherClient::new(config.together_api_key.clone(), config.image_model.clone())?;
    let transformer = ImageTransformer::new(
        config.branding_logo_path.as_deref(),
        config.title_font_path.as_deref(),
    )
    .context("Failed to load branding assets")?;
    let blogger = BloggerClient::new()?;

    // Interactive authorization is only offered outside CI and when client secrets exist
    let flow = if args.no_publish || config.non_interactive {
        None
    } else {
        match ClientSecrets::resolve(
            config.client_secrets_json.as_deref(),
            &config.client_secrets_file,
        ) {
            Ok(secrets) => Some(InstalledAppFlow::new(secrets)?),
            Err(e) => {
                tracing::warn!(error = %e, "Interactive authorization unavailable");
                None
            }
        }
    };

    let publisher = if args.no_publish {
        None
    } else {
        let blog_id = config.require_blog_id()?;
        let store = CredentialStore::new(&config.token_file);
        let credential = store
            .load(config.oauth_token_json.as_deref())
            .context("Failed to load Blogger credential")?;

        let mut publisher = Publisher::new(&blogger, store, credential, blog_id);
        if let Some(flow) = &flow {
            publisher = publisher.with_authorizer(flow);
        }
        Some(publisher)
    };

    let pipeline = Pipeline {
        news: &news,
        text: &text,
        images: &images,
        transformer: &transformer,
        artifacts: ArtifactWriter::new(
            &config.image_output_dir,
            &config.blog_output_dir,
            &config.category,
        ),
        publisher,
    };

    let report = pipeline
        .run(&RunOptions {
            query: config.query.clone(),
            article_count: config.article_count,
            category: config.category.clone(),
            draft: args.draft,
        })
        .await?;

    println!("\n✓ Topic: {}", report.topic);
    println!("✓ Title: {}", report.title);
    println!("✓ Labels: {}", report.labels.join(", "));
    println!("✓ Image saved to: {}", report.image_path.display());
    println!("✓ Draft saved to: {}", report.html_path.display());
    match report.published {
        Some(post) => println!(
            "✓ Published post {}{}",
            post.id,
            post.url.map(|u| format!(" at {}", u)).unwrap_or_default()
        ),
        None => println!("  Publishing skipped (--no-publish)"),
    }

    Ok(())
}

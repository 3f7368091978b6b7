use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

const MAX_FILENAME_CHARS: usize = 100;

/// Lowercase slug of `name` safe for any filesystem
pub fn sanitize_filename(name: &str) -> String {
    let mut slug = String::new();
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }

    let slug: String = slug.trim_matches('_').chars().take(MAX_FILENAME_CHARS).collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

/// Writes run artifacts under `<root>/<category>/`
pub struct ArtifactWriter {
    image_dir: PathBuf,
    html_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(image_root: &Path, html_root: &Path, category: &str) -> Self {
        let category = sanitize_filename(category);
        Self {
            image_dir: image_root.join(&category),
            html_dir: html_root.join(&category),
        }
    }

    /// File name used for the featured image of `title` at `timestamp`
    pub fn image_file_name(title: &str, timestamp: i64) -> String {
        format!("{}_{}.jpg", sanitize_filename(title), timestamp)
    }

    pub fn save_image(&self, file_name: &str, jpeg: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.image_dir)?;
        let path = self.image_dir.join(file_name);
        fs::write(&path, jpeg)?;
        tracing::info!(path = %path.display(), bytes = jpeg.len(), "Saved featured image");
        Ok(path)
    }

    pub fn save_html(&self, title: &str, html: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.html_dir)?;
        let path = self.html_dir.join(format!("{}.html", sanitize_filename(title)));
        fs::write(&path, html)?;
        tracing::info!(path = %path.display(), "Saved blog draft");
        Ok(path)
    }
}

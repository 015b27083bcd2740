//! Product and hero image generation.
//!
//! Each entry of `image-prompts.jsonl` becomes
//! `products/<family>/images/<id>.png`. Existing files are never
//! regenerated, so an interrupted run can simply be started again.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::jsonl;
use crate::models::ImagePrompt;
use crate::openai::OpenAiClient;
use crate::retry::{Pacer, RetryPolicy};

/// Landing-page banner prompt.
pub const HERO_PROMPT: &str = "A vibrant and dynamic panoramic scene showcasing the essence of Kinetic Constructs toys. \
Feature a sleek, slightly futuristic workshop or play area bathed in bright, optimistic lighting. \
In the foreground, show parts of different product types: a robotic arm from ConstructoBots assembling something small, \
glowing logic blocks from LogicLeaps connected, a miniature stylized futuristic city section from ImagiWorlds, \
and intricate gears from KinetiKits meshing together. The overall style should be modern, clean, slightly stylized \
(not photorealistic), tech-focused but undeniably playful, emphasizing creativity and STEAM learning. \
Avoid showing specific human figures, focus on the creations. Aspect ratio suitable for a website hero banner (like 16:9).";

/// Result of a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub revised_prompt: Option<String>,
}

/// Text-to-image backend.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Request one image of `size` (e.g. `1024x1024`) and return where it can be fetched.
    async fn generate(&self, prompt: &str, size: &str) -> Result<GeneratedImage>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Keep `[a-zA-Z0-9_-]` and lower-case the result.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_lowercase()
}

/// `products_dir/<family>/images/<id>.png`, both segments sanitized.
pub fn image_path(products_dir: &Path, prompt: &ImagePrompt) -> PathBuf {
    products_dir
        .join(sanitize_filename(&prompt.family))
        .join("images")
        .join(format!("{}.png", sanitize_filename(&prompt.id)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReport {
    pub generated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ImageReport {
    pub fn total(&self) -> usize {
        self.generated + self.skipped + self.errors
    }
}

/// Generates images through an [`ImageGenerator`] with retries and pacing.
pub struct ImageRenderer<'a> {
    generator: &'a dyn ImageGenerator,
    retry: RetryPolicy,
    pacer: Pacer,
}

impl<'a> ImageRenderer<'a> {
    pub fn new(generator: &'a dyn ImageGenerator, retry: RetryPolicy, pacer: Pacer) -> Self {
        Self {
            generator,
            retry,
            pacer,
        }
    }

    /// Generate `prompt` at `size` and write it to `path`.
    pub async fn render(&self, prompt: &str, size: &str, path: &Path) -> Result<()> {
        let image = self
            .retry
            .run("image generation", || self.generator.generate(prompt, size))
            .await?;
        let bytes = self
            .retry
            .run("image download", || self.generator.download(&image.url))
            .await?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        jsonl::write_atomic(path, &bytes)?;
        info!("Successfully downloaded image to {}", path.display());
        Ok(())
    }

    /// Render every prompt line whose image does not exist yet.
    pub async fn render_all(&self, lines: Vec<jsonl::JsonlLine>, products_dir: &Path, size: &str) -> ImageReport {
        let mut report = ImageReport::default();
        let total = lines.len();

        for (idx, line) in lines.into_iter().enumerate() {
            info!("--- Processing prompt {}/{} ---", idx + 1, total);
            let prompt = match line.parsed.and_then(parse_prompt) {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!("Skipping invalid prompt entry (line {}): {}: {}", line.number, e, line.raw);
                    report.errors += 1;
                    continue;
                }
            };

            let path = image_path(products_dir, &prompt);
            if path.exists() {
                info!("Image already exists at {}, skipping generation.", path.display());
                report.skipped += 1;
                continue;
            }

            info!("Generating image for ID: {}, Family: {}", prompt.id, prompt.family);
            match self.render(&prompt.prompt, size, &path).await {
                Ok(()) => report.generated += 1,
                Err(e) => {
                    log_generation_failure(&prompt.id, &e);
                    report.errors += 1;
                }
            }

            if idx + 1 < total {
                info!("Waiting {:?} before next prompt...", self.pacer.delay());
                self.pacer.pause().await;
            }
        }
        report
    }
}

fn parse_prompt(record: crate::models::Record) -> Result<ImagePrompt> {
    let prompt: ImagePrompt = serde_json::from_value(serde_json::Value::Object(record))
        .map_err(|e| CatalogError::Schema(e.to_string()))?;
    if prompt.id.is_empty() || prompt.prompt.is_empty() || prompt.family.is_empty() {
        return Err(CatalogError::Schema(
            "missing id, prompt, or family".to_string(),
        ));
    }
    Ok(prompt)
}

fn log_generation_failure(id: &str, e: &CatalogError) {
    match e {
        CatalogError::ContentPolicy(_) => {
            error!("Prompt for {} was rejected by the content policy; revise it: {}", id, e)
        }
        CatalogError::RateLimitOrQuota(_) => {
            error!("Image generation for {} stopped by billing or quota: {}", id, e)
        }
        _ => error!("Failed to generate image for {}: {}", id, e),
    }
}

/// `catalog images`.
pub async fn run_images(config: &Config) -> anyhow::Result<()> {
    let settings = config.require_openai()?;
    let prompts_path = config.prompts_path();
    if !prompts_path.exists() {
        anyhow::bail!("Prompts file not found at {}", prompts_path.display());
    }
    let lines = jsonl::read_file(&prompts_path)
        .with_context(|| format!("Failed to read {}", prompts_path.display()))?;
    info!("Found {} prompts in {}", lines.len(), prompts_path.display());

    let client = OpenAiClient::new(&settings, &config.openai)?;
    let renderer = ImageRenderer::new(
        &client,
        config.pacing.retry_policy(),
        config.pacing.image_pacer(),
    );
    let report = renderer
        .render_all(lines, &config.products_dir(), &config.openai.image_size)
        .await;

    println!("images {}", prompts_path.display());
    println!("  generated: {}", report.generated);
    println!("  skipped (already existing): {}", report.skipped);
    println!("  errors: {}", report.errors);
    println!("  total prompts: {}", report.total());
    println!("ok");
    Ok(())
}

/// `catalog hero`.
pub async fn run_hero(config: &Config) -> anyhow::Result<()> {
    let path = config.hero_image_path();
    if path.exists() {
        println!("hero {}", path.display());
        println!("  already exists, skipped");
        println!("ok");
        return Ok(());
    }

    let settings = config.require_openai()?;
    let client = OpenAiClient::new(&settings, &config.openai)?;
    let renderer = ImageRenderer::new(&client, config.pacing.retry_policy(), Pacer::none());
    info!("Generating hero image at {}", config.openai.hero_size);
    if let Err(e) = renderer
        .render(HERO_PROMPT, &config.openai.hero_size, &path)
        .await
    {
        log_generation_failure("hero image", &e);
        return Err(e).context("Failed to generate the hero image");
    }

    println!("hero {}", path.display());
    println!("  generated: 1");
    println!("ok");
    Ok(())
}

use crate::session::{GenerationRequest, ImageSource};
use crate::types::GenerateResponse;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::{
    multipart::{Form, Part},
    Url,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SAMPLE_FILE_NAME: &str = "sample_image.png";
pub const DOWNLOAD_FILE_NAME: &str = "generated-image.png";

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    sample_dir: PathBuf,
}

impl Client {
    pub fn new(base_url: &str, sample_dir: PathBuf) -> Result<Self> {
        let url = Url::parse(base_url).context("invalid generation service base URL")?;
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url: url, sample_dir })
    }

    /// Service base without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Posts the image and prompt to `/generate` and returns the cache-busted
    /// URL of the generated image.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let part = self.image_part(&request.source).await?;
        let form = Form::new().part("product_image", part).text("prompt", request.prompt.clone());

        let endpoint = format!("{}/generate", self.base_url());
        info!("submitting generation request to {endpoint}");
        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("generation request failed ({endpoint})"))?;
        if !response.status().is_success() {
            bail!("generation service responded with status {}", response.status());
        }

        let body: GenerateResponse =
            response.json().await.context("failed to decode generation response")?;
        debug!("generation service response: {body:?}");
        let url = display_url(self.base_url(), &body.url, Utc::now().timestamp_millis());
        debug!("display URL: {url}");
        Ok(url)
    }

    /// Loads the bytes behind a bundled sample reference.
    ///
    /// Absolute http(s) references are fetched; anything else is read from the
    /// sample directory.
    pub async fn resolve_sample(&self, reference: &str) -> Result<Vec<u8>> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let response = self
                .http
                .get(reference)
                .send()
                .await
                .with_context(|| format!("failed to fetch sample {reference}"))?;
            if !response.status().is_success() {
                bail!("sample {reference} responded with status {}", response.status());
            }
            let bytes = response.bytes().await.context("failed to read sample body")?;
            return Ok(bytes.to_vec());
        }

        let path = self.sample_dir.join(reference.trim_start_matches('/'));
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read sample image {}", path.display()))
    }

    /// Saves the generated image under the fixed download name in `dir`.
    pub async fn download(&self, display_url: &str, dir: &Path) -> Result<PathBuf> {
        let response = self
            .http
            .get(display_url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {display_url}"))?;
        if !response.status().is_success() {
            bail!("download responded with status {}", response.status());
        }
        let bytes = response.bytes().await.context("failed to read generated image")?;

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create download dir {}", dir.display()))?;
        let target = dir.join(DOWNLOAD_FILE_NAME);
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        info!("saved generated image to {}", target.display());
        Ok(target)
    }

    async fn image_part(&self, source: &ImageSource) -> Result<Part> {
        let (bytes, file_name) = match source {
            ImageSource::File(file) => {
                let bytes = tokio::fs::read(&file.path)
                    .await
                    .with_context(|| format!("failed to read {}", file.path.display()))?;
                (bytes, file.file_name.clone())
            }
            ImageSource::Sample(reference) => {
                (self.resolve_sample(reference).await?, SAMPLE_FILE_NAME.to_string())
            }
        };
        let mime = match source {
            ImageSource::File(_) => mime_for(&file_name),
            ImageSource::Sample(reference) => mime_for(reference),
        };
        Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .context("invalid image content type")
    }
}

/// Joins the service base and the returned path with exactly one slash and
/// appends the `t` cache-busting parameter.
pub fn display_url(base: &str, path: &str, timestamp: i64) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}?t={timestamp}")
    } else {
        format!("{base}/{path}?t={timestamp}")
    }
}

fn mime_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

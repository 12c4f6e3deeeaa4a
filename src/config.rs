use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;
use time::{macros::format_description, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub image_backend: ImageBackend,
    pub s3: Option<S3Config>,
    pub analysis: AnalysisConfig,
    pub utc_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let image_backend = parse_backend(&env_or("IMAGE_BACKEND", "local"))?;
        let s3 = match image_backend {
            ImageBackend::S3 => Some(S3Config {
                endpoint: std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT")?,
                bucket: std::env::var("MINIO_BUCKET").context("MINIO_BUCKET")?,
                access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY")?,
                secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY")?,
                region: env_or("MINIO_REGION", "us-east-1"),
            }),
            ImageBackend::Local => None,
        };
        let analysis = AnalysisConfig {
            api_key: std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY")?,
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("OPENAI_MODEL", "gpt-4o"),
            timeout_secs: std::env::var("ANALYSIS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        };
        let utc_offset = parse_utc_offset(&env_or("DIARY_UTC_OFFSET", "+00:00"))?;

        Ok(Self {
            data_dir: env_or("DATA_DIR", "./data").into(),
            upload_dir: env_or("UPLOAD_DIR", "./uploads").into(),
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:8080"),
            image_backend,
            s3,
            analysis,
            utc_offset,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_backend(v: &str) -> anyhow::Result<ImageBackend> {
    match v.trim().to_ascii_lowercase().as_str() {
        "local" => Ok(ImageBackend::Local),
        "s3" | "minio" => Ok(ImageBackend::S3),
        other => anyhow::bail!("unknown IMAGE_BACKEND {other:?}"),
    }
}

/// Accepts `+08:00`, `-05:30` or `Z`.
pub fn parse_utc_offset(v: &str) -> anyhow::Result<UtcOffset> {
    let v = v.trim();
    if v.eq_ignore_ascii_case("z") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(
        v,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .with_context(|| format!("invalid DIARY_UTC_OFFSET {v:?}"))
}

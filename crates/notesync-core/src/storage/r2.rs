//! Cloudflare R2 image storage: configuration, object keys, and public URLs.

use std::env;
use std::path::PathBuf;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::CloudFileStorage;
use crate::{Error, Result};

const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const ENV_BUCKET: &str = "R2_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "R2_PUBLIC_BASE_URL";

/// Cloudflare R2 configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct R2Config {
    /// Cloudflare account identifier.
    pub account_id: String,
    /// R2 bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Public URL base; note bodies embed `<base>/<object key>`.
    pub public_base_url: String,
}

impl R2Config {
    /// Load R2 configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no R2 variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Cloudflare R2 S3-compatible endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

/// R2-backed cloud image storage.
#[derive(Clone, Debug)]
pub struct R2Storage {
    config: R2Config,
    client: Client,
}

impl R2Storage {
    #[must_use]
    pub fn new(config: R2Config) -> Self {
        let client = build_s3_client(&config);
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &R2Config {
        &self.config
    }

    /// Upload object bytes to the configured bucket.
    pub async fn upload_bytes(
        &self,
        object_key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let object_key = normalize_object_key(object_key)?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = normalize_content_type(content_type) {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|error| {
            storage_error("put_object", &self.config.bucket, Some(&object_key), error)
        })?;

        Ok(())
    }

    /// Delete an object from the configured bucket.
    pub async fn delete_object(&self, object_key: &str) -> Result<()> {
        let object_key = normalize_object_key(object_key)?;

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|error| {
                storage_error(
                    "delete_object",
                    &self.config.bucket,
                    Some(&object_key),
                    error,
                )
            })?;

        Ok(())
    }

    /// Public URL for an object key.
    #[must_use]
    pub fn public_object_url(&self, object_key: &str) -> Option<String> {
        let key = object_key.trim().trim_matches('/');
        if key.is_empty() {
            return None;
        }

        Some(format!("{}/{key}", self.config.public_base_url))
    }

    /// Object key behind one of this bucket's public URLs.
    #[must_use]
    pub fn object_key_for_url(&self, url: &str) -> Option<String> {
        let prefix = format!("{}/", self.config.public_base_url);
        let key = url.trim().strip_prefix(&prefix)?;
        let key = key.split(['?', '#']).next().unwrap_or(key);
        let key = urlencoding::decode(key).ok()?.into_owned();
        normalize_object_key(&key).ok()
    }
}

#[async_trait]
impl CloudFileStorage for R2Storage {
    async fn upload_multiple_files(&self, files: &[(String, PathBuf)]) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(files.len());
        for (destination, path) in files {
            let object_key = normalize_object_key(destination)?;
            let bytes = tokio::fs::read(path).await?;
            let content_type = mime_guess::from_path(path).first_raw();

            self.upload_bytes(&object_key, bytes, content_type).await?;
            let url = self.public_object_url(&object_key).ok_or_else(|| {
                Error::Storage(format!("no public URL for object {object_key}"))
            })?;
            tracing::debug!("Uploaded {} to {}", path.display(), url);
            urls.push(url);
        }
        Ok(urls)
    }

    async fn delete_file_by_download_url(&self, url: &str) -> Result<()> {
        let object_key = self.object_key_for_url(url).ok_or_else(|| {
            Error::InvalidInput(format!("URL is not served by bucket {}: {url}", self.config.bucket))
        })?;
        self.delete_object(&object_key).await
    }

    fn owns_url(&self, url: &str) -> bool {
        self.object_key_for_url(url).is_some()
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<R2Config>> {
    let account_id = lookup(ENV_ACCOUNT_ID).map(|value| value.trim().to_string());
    let bucket = lookup(ENV_BUCKET).map(|value| value.trim().to_string());
    let access_key_id = lookup(ENV_ACCESS_KEY_ID).map(|value| value.trim().to_string());
    let secret_access_key = lookup(ENV_SECRET_ACCESS_KEY).map(|value| value.trim().to_string());
    let public_base_url = lookup(ENV_PUBLIC_BASE_URL).map(|value| value.trim().to_string());

    let any_present = account_id.is_some()
        || bucket.is_some()
        || access_key_id.is_some()
        || secret_access_key.is_some()
        || public_base_url.is_some();

    if !any_present {
        return Ok(None);
    }

    let mut missing = Vec::new();
    let mut require = |value: Option<String>, name: &'static str| {
        let value = value.filter(|value| !value.is_empty());
        if value.is_none() {
            missing.push(name);
        }
        value.unwrap_or_default()
    };
    let account_id = require(account_id, ENV_ACCOUNT_ID);
    let bucket = require(bucket, ENV_BUCKET);
    let access_key_id = require(access_key_id, ENV_ACCESS_KEY_ID);
    let secret_access_key = require(secret_access_key, ENV_SECRET_ACCESS_KEY);
    let public_base_url = require(public_base_url, ENV_PUBLIC_BASE_URL);

    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "R2 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    Ok(Some(R2Config {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url: normalize_public_base_url(&public_base_url)?,
    }))
}

fn build_s3_client(config: &R2Config) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "notesync-r2-storage",
    );

    let sdk_config = aws_sdk_s3::config::Builder::new()
        .region(Region::new("auto"))
        .credentials_provider(credentials)
        .endpoint_url(config.endpoint_url())
        .force_path_style(true)
        .build();

    Client::from_conf(sdk_config)
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl std::fmt::Display,
) -> Error {
    let target = object_key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
    Error::Storage(format!("R2 {operation} failed for {target}: {error}"))
}

fn normalize_object_key(object_key: &str) -> Result<String> {
    let object_key = object_key.trim().trim_matches('/').to_string();
    if object_key.is_empty() {
        return Err(Error::InvalidInput(
            "Image object_key cannot be empty".to_string(),
        ));
    }
    Ok(object_key)
}

fn normalize_content_type(content_type: Option<&str>) -> Option<String> {
    content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn normalize_public_base_url(value: &str) -> Result<String> {
    if !value.starts_with("https://") && !value.starts_with("http://") {
        return Err(Error::InvalidInput(
            "R2_PUBLIC_BASE_URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(value.trim_end_matches('/').to_string())
}

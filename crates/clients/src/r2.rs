use std::env;

use anyhow::{anyhow, Result};
use aws_sdk_s3::{Client as S3Client, config::{Builder as S3ConfigBuilder, Credentials, Region}};
use base64::Engine;
use tavern_common::{define_module_client, optional_env, ModuleClient};
use uuid::Uuid;

pub const AVATAR_FOLDER: &str = "avatars";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_extension: String,
    pub data: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_extension: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(anyhow!("Image is empty"));
        }
        if data.len() > MAX_IMAGE_BYTES {
            return Err(anyhow!("Image size should be less than 5MB"));
        }
        Ok(Self { file_extension: file_extension.into(), data })
    }

    /// Accepts a `data:image/<ext>;base64,<payload>` URL.
    pub fn from_base64(base64_data: &str) -> Result<Self> {
        let (file_extension, data) = parse_base64_image(base64_data)?;
        Self::new(file_extension, data)
    }

    pub fn key(&self) -> String {
        format!("{}/{}.{}", AVATAR_FOLDER, Uuid::new_v4(), self.file_extension)
    }

    pub fn content_type(&self) -> String {
        format!("image/{}", self.file_extension)
    }
}

fn parse_base64_image(base64_data: &str) -> Result<(String, Vec<u8>)> {
    const DATA_URL_PREFIX: &str = "data:image/";

    let content = base64_data.strip_prefix(DATA_URL_PREFIX)
        .ok_or(anyhow!("Please upload an image file"))?;

    let (file_extension, base64_content) = content.split_once(";base64,")
        .ok_or(anyhow!("Invalid base64 data URL format"))?;

    if file_extension.is_empty() || !file_extension.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return Err(anyhow!("Invalid image type: {file_extension}"));
    }

    let image_data = base64::engine::general_purpose::STANDARD
        .decode(base64_content)
        .map_err(|e| anyhow!("Failed to decode base64 image: {}", e))?;

    Ok((file_extension.to_string(), image_data))
}

define_module_client! {
    (struct R2Client, "r2")
    client_type: S3Client,
    env: ["R2_ACCOUNT_ID", "R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY", "R2_BUCKET_NAME"],
    setup: async {
        let account_id = env::var("R2_ACCOUNT_ID")?;
        let access_key_id = env::var("R2_ACCESS_KEY_ID")?;
        let secret_access_key = env::var("R2_SECRET_ACCESS_KEY")?;

        let endpoint_url = format!("https://{}.r2.cloudflarestorage.com", account_id);

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "r2-client"
        );

        let s3_config = S3ConfigBuilder::new()
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .behavior_version_latest()
            .build();

        Ok::<_, anyhow::Error>(S3Client::from_conf(s3_config))
    }
}

impl R2Client {
    pub fn bucket_name(&self) -> Result<String> {
        optional_env("R2_BUCKET_NAME").ok_or(anyhow!("R2_BUCKET_NAME is not set"))
    }

    pub fn public_url(&self, key: &str) -> Result<String> {
        let bucket = self.bucket_name()?;
        let domain = optional_env("R2_PUBLIC_DOMAIN")
            .unwrap_or_else(|| format!("{}.r2.dev", bucket));
        Ok(format!("https://{}/{}/{}", domain, bucket, key))
    }

    pub async fn upload(&self, upload: ImageUpload) -> Result<String> {
        let key = upload.key();
        let content_type = upload.content_type();

        self.get_client()
            .put_object()
            .bucket(self.bucket_name()?)
            .key(&key)
            .body(aws_sdk_s3::primitives::ByteStream::from(upload.data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to upload image to R2: {}", e))?;

        tracing::info!("[R2Client::upload] stored {}", key);
        self.public_url(&key)
    }
}

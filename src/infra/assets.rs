//! `AssetStore` over `object_store`: S3-compatible buckets or a local directory.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload, aws::AmazonS3Builder,
    local::LocalFileSystem, path::Path,
};
use tracing::{debug, info};
use url::Url;

use crate::application::assets::{AssetStore, AssetStoreError};
use crate::config::{S3Settings, StorageBackend, StorageSettings};

use super::error::InfraError;

pub struct ObjectAssetStore {
    store: Arc<dyn ObjectStore>,
    public_base: String,
    prefix: String,
    /// Whether the backend persists object attributes such as content type.
    tag_content_type: bool,
}

impl ObjectAssetStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        public_base_url: &Url,
        prefix: &str,
        tag_content_type: bool,
    ) -> Self {
        Self {
            store,
            public_base: public_base_url.as_str().trim_end_matches('/').to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            tag_content_type,
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> Result<Self, InfraError> {
        match &settings.backend {
            StorageBackend::Local { root } => {
                std::fs::create_dir_all(root)?;
                let canonical = std::fs::canonicalize(root)?;
                let store = LocalFileSystem::new_with_prefix(&canonical).map_err(|err| {
                    InfraError::storage(format!("local filesystem error: {err}"))
                })?;
                info!(
                    target = "civic_reports::assets",
                    root = %canonical.display(),
                    "media storage: local directory"
                );
                Ok(Self::new(
                    Arc::new(store),
                    &settings.public_base_url,
                    &settings.prefix,
                    false,
                ))
            }
            StorageBackend::S3(s3) => {
                let store = build_s3(s3)?;
                info!(
                    target = "civic_reports::assets",
                    bucket = %s3.bucket,
                    region = %s3.region,
                    prefix = %settings.prefix,
                    "media storage: s3"
                );
                Ok(Self::new(
                    Arc::new(store),
                    &settings.public_base_url,
                    &settings.prefix,
                    true,
                ))
            }
        }
    }

    fn object_path(&self, name: &str) -> Result<Path, AssetStoreError> {
        let key = if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prefix)
        };
        Path::parse(&key).map_err(|err| AssetStoreError::Backend(err.to_string()))
    }

    fn public_url(&self, path: &Path) -> String {
        format!("{}/{path}", self.public_base)
    }

    /// Maps a public URL back to the object key it was built from.
    fn path_for_url(&self, url: &str) -> Result<Path, AssetStoreError> {
        let key = url
            .strip_prefix(&self.public_base)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AssetStoreError::ForeignUrl(url.to_string()))?;
        Path::parse(key).map_err(|_| AssetStoreError::ForeignUrl(url.to_string()))
    }

    /// Reads an object by key, the part of its public URL after the base.
    pub async fn read(&self, key: &str) -> Result<Bytes, AssetStoreError> {
        let path = Path::parse(key).map_err(|_| AssetStoreError::Missing(key.to_string()))?;
        match self.store.get(&path).await {
            Ok(object) => object
                .bytes()
                .await
                .map_err(|err| AssetStoreError::Backend(err.to_string())),
            Err(object_store::Error::NotFound { .. }) => {
                Err(AssetStoreError::Missing(key.to_string()))
            }
            Err(err) => Err(AssetStoreError::Backend(err.to_string())),
        }
    }
}

fn build_s3(s3: &S3Settings) -> Result<object_store::aws::AmazonS3, InfraError> {
    let mut builder = AmazonS3Builder::new()
        .with_region(&s3.region)
        .with_bucket_name(&s3.bucket)
        .with_allow_http(s3.allow_http);

    if let Some(key) = s3.access_key_id.as_ref() {
        builder = builder.with_access_key_id(key);
    }
    if let Some(secret) = s3.secret_access_key.as_ref() {
        builder = builder.with_secret_access_key(secret);
    }
    if let Some(endpoint) = s3.endpoint.as_ref() {
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.clone()
        } else {
            format!("https://{endpoint}")
        };
        builder = builder.with_endpoint(endpoint);
    }

    builder
        .build()
        .map_err(|err| InfraError::storage(format!("failed to configure s3: {err}")))
}

#[async_trait]
impl AssetStore for ObjectAssetStore {
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, AssetStoreError> {
        let path = self.object_path(name)?;
        let mut options = PutOptions::default();
        if self.tag_content_type {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            options.attributes = attributes;
        }

        let size = data.len();
        self.store
            .put_opts(&path, PutPayload::from(data), options)
            .await
            .map_err(|err| AssetStoreError::Backend(err.to_string()))?;

        debug!(
            target = "civic_reports::assets",
            path = %path,
            size,
            "asset stored"
        );
        Ok(self.public_url(&path))
    }

    async fn delete(&self, url: &str) -> Result<(), AssetStoreError> {
        let path = self.path_for_url(url)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(AssetStoreError::Backend(err.to_string())),
        }
    }
}

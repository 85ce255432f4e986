#![doc = "Object store uploader for the CLI: bridges the core `Uploader` trait to S3 or an in-memory store."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! The core crate only knows the [`Uploader`] trait. This module provides
//! [`ObjectStoreUploader`], which fulfils it against any [`object_store::ObjectStore`]:
//!
//! - [`ObjectStoreUploader::s3`] builds an S3 client from the environment plus the
//!   configured bucket, region and optional S3-compatible endpoint.
//! - [`ObjectStoreUploader::in_memory`] keeps everything in process, for dry runs and tests.
//!
//! Each put carries the content type as an object attribute. Credentials are resolved by
//! the S3 builder from the standard `AWS_*` variables and never pass through this crate.

use std::sync::Arc;

use async_trait::async_trait;
use build_worker_core::contract::{PutObject, UploadError, Uploader};
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};

use crate::load_config::{StoreBackend, StoreSettings};

pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStoreUploader {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Builds the uploader the settings ask for.
    pub fn from_settings(settings: &StoreSettings) -> Result<Self, UploadError> {
        match settings.backend {
            StoreBackend::S3 => Self::s3(settings),
            StoreBackend::Memory => Ok(Self::in_memory(&settings.bucket)),
        }
    }

    pub fn s3(settings: &StoreSettings) -> Result<Self, UploadError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(settings.bucket.clone());
        if let Some(region) = &settings.region {
            builder = builder.with_region(region.clone());
        }
        if let Some(endpoint) = &settings.endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder.build().map_err(|e| {
            tracing::error!(error = %e, bucket = %settings.bucket, "Failed to build S3 client");
            UploadError::Config(e.to_string())
        })?;
        tracing::info!(
            bucket = %settings.bucket,
            region = ?settings.region,
            endpoint = ?settings.endpoint,
            "Initialized S3 uploader"
        );
        Ok(Self::new(Arc::new(store), settings.bucket.clone()))
    }

    pub fn in_memory(bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        tracing::info!(bucket = %bucket, "Initialized in-memory uploader, nothing will leave this process");
        Self::new(Arc::new(InMemory::new()), bucket)
    }

    /// The underlying store, for reading back what was written.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl Uploader for ObjectStoreUploader {
    async fn put(&self, object: PutObject) -> Result<(), UploadError> {
        // one client per bucket
        if object.bucket != self.bucket {
            return Err(UploadError::BucketMismatch {
                expected: self.bucket.clone(),
                requested: object.bucket,
            });
        }

        let location = Path::parse(&object.key).map_err(|e| UploadError::InvalidKey {
            key: object.key.clone(),
            reason: e.to_string(),
        })?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, object.content_type.clone().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let size = object.content.len();
        match self
            .store
            .put_opts(&location, PutPayload::from(object.content), opts)
            .await
        {
            Ok(_) => {
                tracing::debug!(
                    key = %object.key,
                    size,
                    content_type = %object.content_type,
                    "Object stored"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, key = %object.key, bucket = %self.bucket, "Object store put failed");
                Err(UploadError::Store {
                    key: object.key,
                    reason: e.to_string(),
                })
            }
        }
    }
}

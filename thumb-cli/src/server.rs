use std::sync::Arc;

use anyhow::{Context, Result};
use thumb_axum::ServerSettings;
use thumb_blob::{S3MultipartStore, S3Settings};
use thumb_core::ThumbConfigSnapshot;
use thumb_pipeline::Pipeline;

use crate::options::DEFAULT_LISTEN;

pub async fn run(config: ThumbConfigSnapshot) -> Result<()> {
    let s3 = S3Settings::from_config(&config);
    if let Some(url) = s3.service_url.as_deref() {
        tracing::info!(service_url = %url, "using custom S3 endpoint");
    }
    let store = S3MultipartStore::connect(s3)
        .await
        .context("--s3-bucket-name (or THUMB__S3__BUCKET) is required")?;
    tracing::info!(bucket = %store.bucket(), "uploading to S3");

    let pipeline = Pipeline::from_config(Arc::new(store), &config)?;
    let app = thumb_axum::axum(pipeline, ServerSettings::from_config(&config));

    let addr = config.get_string("http.listen").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    app.listen(addr).await
}

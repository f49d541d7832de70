use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use flate2::read::MultiGzDecoder;
use futures::StreamExt;
use reqwest::{header, Client};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::{AssetError, AvailableModel, Manifest, Result};

pub const MANIFEST_FILE: &str = "model_definition.json";
pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

const GZIP_SUFFIX: &str = ".gz";
const DEFAULT_INLINE_LIMIT: usize = 1024 * 1024;
/// Upper bound on the buffer reserved from an untrusted `Content-Length`.
const MAX_PREALLOC: usize = 8 * 1024 * 1024;

/// Raw byte transport. Anything that can turn a URL into bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        (**self).fetch(url).await
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssetError::Config(format!("http client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        let res = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AssetError::fetch(url.as_str(), e))?;

        if !res.status().is_success() {
            return Err(AssetError::fetch(url.as_str(), res.status()));
        }

        let expected = res
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = res.bytes_stream();
        let mut buf = BytesMut::with_capacity(expected.min(MAX_PREALLOC));
        while let Some(item) = body.next().await {
            let chunk = item.map_err(|e| AssetError::fetch(url.as_str(), e))?;
            buf.extend_from_slice(&chunk);
        }

        tracing::debug!(url = %url, bytes = buf.len(), "fetched");
        Ok(buf.freeze())
    }
}

pub fn is_compressed(file: &str) -> bool {
    file.ends_with(GZIP_SUFFIX)
}

/// Name a file's content is stored under: the file name minus any `.gz`.
pub fn tensor_name(file: &str) -> &str {
    file.strip_suffix(GZIP_SUFFIX).unwrap_or(file)
}

/// Inflates every gzip member in `bytes`, so concatenated archives come back whole.
pub fn gunzip(name: &str, bytes: &[u8]) -> Result<Bytes> {
    let mut decoder = MultiGzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| AssetError::Decompression {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Bytes::from(out))
}

/// Payloads over `inline_limit` are inflated on the blocking pool.
pub async fn decompress(name: &str, bytes: Bytes, inline_limit: usize) -> Result<Bytes> {
    if bytes.len() <= inline_limit {
        return gunzip(name, &bytes);
    }
    let name = name.to_owned();
    tokio::task::spawn_blocking(move || gunzip(&name, &bytes)).await?
}

/// The remote layout: `{base}/{model}/{file}`.
pub struct Origin<F> {
    fetcher: F,
    base: Url,
    inline_limit: usize,
}

impl<F: Fetcher> Origin<F> {
    pub fn new(fetcher: F, base: &str) -> Result<Self> {
        let base = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| AssetError::Config(format!("invalid remote url {:?}: {}", base, e)))?;
        Ok(Self {
            fetcher,
            base,
            inline_limit: DEFAULT_INLINE_LIMIT,
        })
    }

    pub fn with_inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn file_url(&self, model: AvailableModel, file: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}/{}",
            self.base.as_str().trim_end_matches('/'),
            model.as_str(),
            file
        );
        Url::parse(&raw).map_err(|e| AssetError::Config(format!("bad asset url {}: {}", raw, e)))
    }

    pub async fn fetch_file(&self, model: AvailableModel, file: &str) -> Result<Bytes> {
        let url = self.file_url(model, file)?;
        let bytes = self.fetcher.fetch(&url).await?;
        if is_compressed(file) {
            decompress(file, bytes, self.inline_limit).await
        } else {
            Ok(bytes)
        }
    }

    pub async fn fetch_manifest(&self, model: AvailableModel) -> Result<Manifest> {
        let bytes = self.fetch_file(model, MANIFEST_FILE).await?;
        Manifest::from_slice(&bytes)
    }
}

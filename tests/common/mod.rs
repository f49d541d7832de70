#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use model_assets::{AssetError, AvailableModel, Fetcher, Result};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub const BASE_URL: &str = "http://origin.test";

/// In-memory remote origin keyed by URL path (`/{model}/{file}`).
#[derive(Default)]
pub struct MockOrigin {
    files: HashMap<String, Bytes>,
    hits: Mutex<HashMap<String, usize>>,
    fail_once: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a bundle. Tensor and definition bytes are derived from the
    /// file name so tests can predict them.
    pub fn bundle(mut self, model: AvailableModel, components: &[(&str, &[&str])]) -> Self {
        let models: Vec<_> = components
            .iter()
            .map(|(definition, tensors)| json!({ "definition": definition, "tensors": tensors }))
            .collect();
        let manifest = json!({ "models": models }).to_string();
        self = self.file(model, "model_definition.json", manifest.into_bytes());

        for (definition, tensors) in components {
            self = self.file(model, definition, format!("definition:{}", definition).into_bytes());
            for tensor in tensors.iter() {
                let bytes = match tensor.strip_suffix(".gz") {
                    Some(plain) => gzip(format!("tensor:{}", plain).as_bytes()),
                    None => format!("tensor:{}", tensor).into_bytes(),
                };
                self = self.file(model, tensor, bytes);
            }
        }

        self.file(model, "config.json", br#"{"d_model":512}"#.to_vec())
            .file(model, "tokenizer.json", br#"{"model":{"type":"Unigram"}}"#.to_vec())
    }

    pub fn file(mut self, model: AvailableModel, file: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path(model, file), Bytes::from(bytes));
        self
    }

    pub fn without(mut self, model: AvailableModel, file: &str) -> Self {
        self.files.remove(&path(model, file));
        self
    }

    pub fn fail_once(self, model: AvailableModel, file: &str) -> Self {
        self.fail_once.lock().insert(path(model, file));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn hits(&self, model: AvailableModel, file: &str) -> usize {
        self.hits.lock().get(&path(model, file)).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockOrigin {
    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        let key = url.path().to_string();
        *self.hits.lock().entry(key.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_once.lock().remove(&key) {
            return Err(AssetError::fetch(url.as_str(), "503 Service Unavailable"));
        }

        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| AssetError::fetch(url.as_str(), "404 Not Found"))
    }
}

pub fn path(model: AvailableModel, file: &str) -> String {
    format!("/{}/{}", model.as_str(), file)
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("gzip write");
    enc.finish().expect("gzip finish")
}

pub fn encoder_decoder() -> Vec<(&'static str, &'static [&'static str])> {
    vec![("enc.bin", &["a", "b"]), ("dec.bin", &["b", "c"])]
}

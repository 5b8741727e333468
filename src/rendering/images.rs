//! Image loading for staged targets.
//!
//! Every `<img>` source in a target starts loading as soon as the target is
//! staged. Each source owns a `watch` channel that moves from `Pending` to
//! `Loaded` or `Errored` exactly once; [`ImageSet::wait_settled`] resolves
//! only after every source has left `Pending`. There is no timeout: a load
//! that never settles keeps the wait pending.

use crate::{Error, ExportConfig, Result};
use base64::Engine as Base64Engine;
use futures::future::BoxFuture;
use image::RgbaImage;
use log::{debug, warn};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Load state of one image source.
#[derive(Debug, Clone)]
pub enum ImageState {
    Pending,
    Loaded(Arc<RgbaImage>),
    /// Settled without pixels; the image paints as broken
    Errored(String),
}

impl ImageState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, ImageState::Pending)
    }
}

/// Fetches the bytes behind an image source.
pub trait ImageLoader: Send + Sync {
    fn load(&self, src: &str) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Loads `http(s)` sources with reqwest and decodes `data:` URIs inline.
#[derive(Clone)]
pub struct HttpImageLoader {
    client: Client,
}

impl HttpImageLoader {
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ImageLoader for HttpImageLoader {
    fn load(&self, src: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let client = self.client.clone();
        let src = src.to_string();
        Box::pin(async move {
            if src.starts_with("data:") {
                return decode_data_uri(&src);
            }
            let resp = client
                .get(&src)
                .send()
                .await
                .map_err(|e| Error::Network(format!("GET {} failed: {}", src, e)))?;
            if !resp.status().is_success() {
                return Err(Error::Network(format!(
                    "GET {} returned HTTP {}",
                    src,
                    resp.status().as_u16()
                )));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| Error::Network(format!("reading {} failed: {}", src, e)))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Decode the payload of a base64 `data:` URI.
pub fn decode_data_uri(src: &str) -> Result<Vec<u8>> {
    let (meta, payload) = src
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| Error::Image("malformed data URI".into()))?;
    if !meta.ends_with(";base64") {
        return Err(Error::Image(format!("unsupported data URI encoding `{}`", meta)));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Image(format!("bad data URI payload: {}", e)))
}

/// Load handles for every distinct image source of one target.
#[derive(Debug, Default)]
pub struct ImageSet {
    slots: HashMap<String, watch::Receiver<ImageState>>,
}

impl ImageSet {
    /// Start loading every source as a task on `runtime`.
    pub fn start<'a, I>(sources: I, loader: Arc<dyn ImageLoader>, runtime: &Handle) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut slots = HashMap::new();
        for src in sources {
            if slots.contains_key(src) {
                continue;
            }
            let (tx, rx) = watch::channel(ImageState::Pending);
            let pending = loader.load(src);
            let name = src.to_string();
            runtime.spawn(async move {
                let state = match pending.await.and_then(|bytes| decode(&bytes)) {
                    Ok(img) => {
                        debug!("Image loaded: {} ({}x{})", short(&name), img.width(), img.height());
                        ImageState::Loaded(Arc::new(img))
                    }
                    Err(e) => {
                        warn!("Image failed to load: {}: {}", short(&name), e);
                        ImageState::Errored(e.to_string())
                    }
                };
                let _ = tx.send(state);
            });
            slots.insert(src.to_string(), rx);
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current state of `src`. Unknown sources report as errored.
    pub fn state(&self, src: &str) -> ImageState {
        match self.slots.get(src) {
            Some(rx) => rx.borrow().clone(),
            None => ImageState::Errored("image was never requested".into()),
        }
    }

    /// Wait until every source in `sources` has loaded or errored.
    pub async fn wait_settled<'a, I>(&self, sources: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let waits = sources.into_iter().filter_map(|src| {
            let mut rx = self.slots.get(src)?.clone();
            Some(async move {
                // A dropped sender means the load task is gone; nothing will
                // ever arrive, so treat the image as settled.
                let _ = rx.wait_for(ImageState::is_settled).await;
            })
        });
        futures::future::join_all(waits).await;
    }
}

fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

fn short(src: &str) -> String {
    if src.starts_with("data:") {
        return "data URI".to_string();
    }
    src.chars().take(96).collect()
}

use crate::graph::User;
use crate::limits::DelayRange;
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Downloads a profile picture. Never fails: a missing picture is `None`.
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: String) -> BoxFuture<'static, Option<Vec<u8>>>;
}

/// Plain GET of the picture URL.
#[derive(Clone)]
pub struct HttpImageSource {
    client: Client,
}

impl HttpImageSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: String) -> BoxFuture<'static, Option<Vec<u8>>> {
        let client = self.client.clone();
        async move {
            let response = match client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Image request for {} failed: {}", url, e);
                    return None;
                }
            };

            if !response.status().is_success() {
                debug!("Image request for {} returned {}", url, response.status());
                return None;
            }

            response.bytes().await.ok().map(|bytes| bytes.to_vec())
        }
        .boxed()
    }
}

/// Profile pictures being fetched in the background. Each download starts
/// after its own random delay so pictures never compete with page fetches
/// in bursts.
pub struct ImageDownloads {
    source: Option<Arc<dyn ImageSource>>,
    delay: DelayRange,
    pending: Vec<(u64, JoinHandle<Option<Vec<u8>>>)>,
}

impl ImageDownloads {
    pub fn new(source: Option<Arc<dyn ImageSource>>, delay: DelayRange) -> Self {
        Self {
            source,
            delay,
            pending: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, DelayRange::fixed(0))
    }

    /// Start downloading `user`'s picture, if it has one.
    pub fn schedule(&mut self, user: &User) {
        let (Some(source), Some(url)) = (&self.source, &user.profile.image) else {
            return;
        };

        let source = source.clone();
        let url = url.clone();
        let delay = self.delay.sample();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            source.fetch(url).await
        });
        self.pending.push((user.id, handle));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for every scheduled download.
    pub async fn settle(self) -> BTreeMap<u64, Option<Vec<u8>>> {
        let mut images = BTreeMap::new();
        for (id, handle) in self.pending {
            let image = match handle.await {
                Ok(image) => image,
                Err(e) => {
                    warn!("Image download for {} did not complete: {}", id, e);
                    None
                }
            };
            if image.is_none() {
                warn!("Failed to download profile picture of {}", id);
            }
            images.insert(id, image);
        }
        images
    }
}

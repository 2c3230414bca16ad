//! Artwork source port.

use async_trait::async_trait;

use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtworkPage {
    /// Display-sized image, safe to hotlink.
    pub preview: String,
    /// Full resolution image.
    pub original: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artwork {
    pub id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub pages: Vec<ArtworkPage>,
    pub tags: Vec<String>,
    pub likes: u64,
    pub nsfw: bool,
}

/// A site artwork can be reposted from.
#[async_trait]
pub trait ArtworkProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Artwork ids linked from `text`, in order of appearance, without duplicates.
    fn match_links(&self, text: &str) -> Vec<String>;

    /// Fetch artwork `id`. Unknown ids are `Error::NotFound`.
    async fn find(&self, id: &str) -> Result<Artwork>;
}

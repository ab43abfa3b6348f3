//! URL layout of the remote catalog

use crate::config::SiteConfig;
use crate::state::{ItemId, Partition};
use crate::Result;
use url::Url;

/// Builds listing and detail URLs from the configured templates
#[derive(Debug, Clone)]
pub struct SiteLayout {
    base: Url,
    listing_path: String,
    detail_path: String,
}

impl SiteLayout {
    /// Creates a layout from a base URL and two path templates
    ///
    /// `listing_path` may use `{partition}` and `{page}`, `detail_path` may use `{id}`.
    pub fn new(base: Url, listing_path: &str, detail_path: &str) -> Self {
        Self {
            base,
            listing_path: listing_path.to_string(),
            detail_path: detail_path.to_string(),
        }
    }

    pub fn from_config(config: &SiteConfig) -> Result<Self> {
        Ok(Self::new(
            Url::parse(&config.base_url)?,
            &config.listing_path,
            &config.detail_path,
        ))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL of listing page `page` of `partition`
    pub fn listing_url(&self, partition: &Partition, page: u32) -> Result<Url> {
        let path = self
            .listing_path
            .replace("{partition}", partition.as_str())
            .replace("{page}", &page.to_string());
        self.join(&path)
    }

    /// URL of the detail page of item `id`
    pub fn detail_url(&self, id: ItemId) -> Result<Url> {
        let path = self.detail_path.replace("{id}", &id.to_string());
        self.join(&path)
    }

    fn join(&self, path: &str) -> Result<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }
}

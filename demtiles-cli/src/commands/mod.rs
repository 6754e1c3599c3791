pub mod batch;
pub mod info;
pub mod query;

use anyhow::{bail, Context, Result};
use demtiles::ElevationService;
use std::path::PathBuf;

/// Service settings shared by the lookup commands.
pub struct ServiceConfig {
    pub archives: Vec<PathBuf>,
    pub cache_size: usize,
    pub max_depth: usize,
}

impl ServiceConfig {
    pub fn build(&self) -> Result<ElevationService> {
        if self.archives.is_empty() {
            bail!("No archives given. Use --archive or set DEMTILES_ARCHIVES");
        }
        ElevationService::builder()
            .archives(&self.archives)
            .cache_size(self.cache_size)
            .max_directory_depth(self.max_depth)
            .build()
            .context("Failed to open archives")
    }
}

//! Flat-file inputs and outputs.
//!
//! # Submodules
//!
//! - [`tabular`]: CSV rows for crawled and resolved articles
//! - [`geojson`]: a `FeatureCollection` of resolved articles
//! - [`input`]: reads earlier CSV / GeoJSON output back for `resolve`
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── articles.csv        # crawl stage
//! ├── resolved.csv        # resolution stage
//! └── resolved.geojson    # resolution stage, located articles only
//! ```

pub mod geojson;
pub mod input;
pub mod tabular;

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::Result;

pub const ARTICLES_CSV: &str = "articles.csv";
pub const RESOLVED_CSV: &str = "resolved.csv";
pub const RESOLVED_GEOJSON: &str = "resolved.geojson";

/// Write `contents` to `dir/file_name`, returning the full path.
pub(crate) async fn write_output(dir: &str, file_name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
    let path = Path::new(dir).join(file_name);
    fs::write(&path, contents).await?;
    info!(path = %path.display(), "Wrote output file");
    Ok(path)
}

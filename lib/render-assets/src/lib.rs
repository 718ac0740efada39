pub mod asset_ids;
pub mod header;
pub mod material_asset;
pub mod material_blueprint;
pub mod mesh;
pub mod shader_blueprint;
pub mod texture;

use material::MaterialError;
use thiserror::Error;

/// Why an asset load was dropped. Fatal to the asset, never to the runtime.
#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error(
        "unsupported format: expected tag '{expected_tag}' version {expected_version}, \
         found tag '{found_tag}' version {found_version}"
    )]
    UnsupportedFormat {
        expected_tag: String,
        expected_version: u32,
        found_tag: String,
        found_version: u32,
    },
    #[error("asset data is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Material(#[from] MaterialError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

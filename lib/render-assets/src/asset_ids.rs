//! Source→compiled asset-id translation. Every on-disk cross-reference is a
//! source-side id; the package supplies the table and loaders translate
//! before the id reaches the runtime.

use hashlink::LinkedHashMap;
use material::property::AssetId;

#[derive(Debug, Default, Clone)]
pub struct AssetIdMapping {
    mapping: LinkedHashMap<AssetId, AssetId>,
}

impl AssetIdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: AssetId, compiled: AssetId) {
        self.mapping.insert(source, compiled);
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Translates a source id. Ids without a table entry pass through
    /// unchanged, so packages only list the ids the compiler renamed;
    /// the uninitialized sentinel never translates.
    pub fn translate(&self, source: AssetId) -> AssetId {
        if !source.is_initialized() {
            return source;
        }
        self.mapping.get(&source).copied().unwrap_or(source)
    }
}

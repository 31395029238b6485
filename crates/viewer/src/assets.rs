//! Asset sources: where model, texture, and shader bytes come from.
//!
//! The render core never talks to the network directly; it fetches paths
//! through an [`AssetSource`]. Production uses a directory of exported
//! static files, tests use an in-memory map with a fetch counter.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use hangar_data::DecodeError;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("asset {0} is not valid UTF-8")]
    Utf8(String),

    #[error("decode failed for {path}: {source}")]
    Decode { path: String, source: DecodeError },

    #[error("no texture paths registered for material {0}")]
    UnknownMaterial(u32),

    #[error("texture worker failed")]
    Worker,
}

/// Byte-level access to static content by path.
pub trait AssetSource: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, AssetError>;
}

/// Serves the exported static tree from a directory on disk.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self.root.join(path);
        match std::fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(path.to_string()))
            }
            Err(e) => Err(AssetError::Io {
                path: path.to_string(),
                source: e,
            }),
        }
    }
}

/// In-memory source. Doubles as the test fixture: every fetch is counted so
/// tests can assert request de-duplication.
#[derive(Default)]
pub struct MemorySource {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.entries
            .lock()
            .expect("memory source poisoned")
            .insert(path.into(), bytes);
    }

    /// Total number of fetches issued against this source.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .expect("memory source poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }
}

/// Shader text shipped with the viewer, used when the static tree does not
/// override it. Keyed by the same paths the programs request.
pub fn embedded_shader(path: &str) -> Option<&'static str> {
    match path {
        crate::renderer::pipeline::FLAT_SHADER_PATH => {
            Some(include_str!("../shaders/flat.wgsl"))
        }
        crate::renderer::pipeline::PBR_SHADER_PATH => Some(include_str!("../shaders/pbr.wgsl")),
        crate::renderer::pipeline::LINE_SHADER_PATH => {
            Some(include_str!("../shaders/line.wgsl"))
        }
        _ => None,
    }
}

/// Memoizing text fetcher for shader sources: each path is fetched at most
/// once per cache lifetime, so program rebuilds (settings changes, shader
/// switches) never refetch.
pub struct StaticCache {
    source: Arc<dyn AssetSource>,
    cache: Mutex<HashMap<String, String>>,
}

impl StaticCache {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn text(&self, path: &str) -> Result<String, AssetError> {
        if let Some(hit) = self
            .cache
            .lock()
            .expect("static cache poisoned")
            .get(path)
        {
            return Ok(hit.clone());
        }

        let text = match self.source.fetch(path) {
            Ok(bytes) => {
                String::from_utf8(bytes).map_err(|_| AssetError::Utf8(path.to_string()))?
            }
            Err(AssetError::NotFound(_)) if embedded_shader(path).is_some() => {
                tracing::debug!(path, "using embedded shader source");
                embedded_shader(path).unwrap_or_default().to_string()
            }
            Err(e) => return Err(e),
        };

        self.cache
            .lock()
            .expect("static cache poisoned")
            .insert(path.to_string(), text.clone());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_counts_fetches() {
        let source = MemorySource::new();
        source.insert("a.tex", vec![1, 2, 3]);
        assert_eq!(source.fetch("a.tex").unwrap(), vec![1, 2, 3]);
        assert!(source.fetch("missing").is_err());
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn static_cache_fetches_each_path_once() {
        let source = Arc::new(MemorySource::new());
        source.insert("shaders/test.wgsl", b"fn main() {}".to_vec());

        let cache = StaticCache::new(source.clone());
        assert_eq!(cache.text("shaders/test.wgsl").unwrap(), "fn main() {}");
        assert_eq!(cache.text("shaders/test.wgsl").unwrap(), "fn main() {}");
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn missing_shader_falls_back_to_embedded() {
        let cache = StaticCache::new(Arc::new(MemorySource::new()));
        let text = cache
            .text(crate::renderer::pipeline::LINE_SHADER_PATH)
            .unwrap();
        assert!(text.contains("%DEFINITIONS%") || text.contains("vs_main"));
    }
}

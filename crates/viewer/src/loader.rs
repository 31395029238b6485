//! Asynchronous asset loads delivered as frame-loop events.
//!
//! Fetches run off the render thread (worker threads natively, inline on
//! wasm where the sources are preloaded) and complete by sending a
//! [`LoadEvent`] over a channel the renderer drains at frame boundaries.
//! Every event carries the model generation it was issued under; the
//! renderer drops events from superseded generations, so a completion
//! arriving after `set_model` tore its resources down is a no-op.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use hangar_data::{ShipTexture, TextureMeta, TexturePack, TexturePaths};

use crate::assets::{AssetError, AssetSource, StaticCache};
use crate::settings::ShaderKind;

/// Which program a shader source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSlot {
    Mesh(ShaderKind),
    Line,
}

#[derive(Debug)]
pub enum LoadPayload {
    Shader {
        slot: ProgramSlot,
        source: Result<String, AssetError>,
    },
    Pack {
        material_id: u32,
        pack: Result<TexturePack, AssetError>,
    },
}

#[derive(Debug)]
pub struct LoadEvent {
    pub generation: u64,
    pub payload: LoadPayload,
}

/// Issues fetches and reports completions. Cheap to clone the sender side;
/// the renderer keeps the single receiver.
pub struct Loader {
    source: Arc<dyn AssetSource>,
    statics: Arc<StaticCache>,
    tx: Sender<LoadEvent>,
}

impl Loader {
    pub fn new(source: Arc<dyn AssetSource>) -> (Self, Receiver<LoadEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let statics = Arc::new(StaticCache::new(source.clone()));
        (
            Self {
                source,
                statics,
                tx,
            },
            rx,
        )
    }

    /// Fetch shader text for a program, via the memoizing static cache.
    pub fn request_shader(&self, generation: u64, slot: ProgramSlot, path: &str) {
        let statics = self.statics.clone();
        let tx = self.tx.clone();
        let path = path.to_string();
        spawn(move || {
            let source = statics.text(&path);
            let _ = tx.send(LoadEvent {
                generation,
                payload: LoadPayload::Shader { slot, source },
            });
        });
    }

    /// Fetch and decode a full texture pack for one material.
    pub fn request_pack(&self, generation: u64, material_id: u32, paths: TexturePaths) {
        let source = self.source.clone();
        let tx = self.tx.clone();
        spawn(move || {
            let pack = load_pack(source.as_ref(), &paths);
            let _ = tx.send(LoadEvent {
                generation,
                payload: LoadPayload::Pack { material_id, pack },
            });
        });
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn(task: impl FnOnce() + Send + 'static) {
    std::thread::spawn(task);
}

/// wasm is single-threaded; sources there are preloaded, so the fetch runs
/// inline and the event is picked up on the next frame like any other.
#[cfg(target_arch = "wasm32")]
fn spawn(task: impl FnOnce() + Send + 'static) {
    task();
}

fn fetch_texture(source: &dyn AssetSource, path: &str) -> Result<ShipTexture, AssetError> {
    let bytes = source.fetch(path)?;
    ShipTexture::decode(&bytes).map_err(|source| AssetError::Decode {
        path: path.to_string(),
        source,
    })
}

fn fetch_meta(source: &dyn AssetSource, path: &str) -> Result<TextureMeta, AssetError> {
    let bytes = source.fetch(path)?;
    TextureMeta::from_json(&bytes).map_err(|source| AssetError::Decode {
        path: path.to_string(),
        source,
    })
}

/// Assemble one material's pack: base is required and fails the pack;
/// optional channels degrade to absent with a log.
#[cfg(not(target_arch = "wasm32"))]
fn load_pack(source: &dyn AssetSource, paths: &TexturePaths) -> Result<TexturePack, AssetError> {
    std::thread::scope(|scope| {
        let base = scope.spawn(|| fetch_texture(source, &paths.base));
        let light = paths
            .light
            .as_deref()
            .map(|path| scope.spawn(move || fetch_texture(source, path)));
        let bump = paths
            .bump
            .as_deref()
            .map(|path| scope.spawn(move || fetch_texture(source, path)));
        let meta = paths
            .meta
            .as_deref()
            .map(|path| scope.spawn(move || fetch_meta(source, path)));

        let base = base.join().map_err(|_| AssetError::Worker)??;
        Ok(TexturePack {
            base,
            light: join_optional(light, "light"),
            bump: join_optional(bump, "bump"),
            meta: join_optional(meta, "meta"),
        })
    })
}

#[cfg(not(target_arch = "wasm32"))]
fn join_optional<T>(
    handle: Option<std::thread::ScopedJoinHandle<'_, Result<T, AssetError>>>,
    channel: &str,
) -> Option<T> {
    let result = handle?.join().ok()?;
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(channel, error = %e, "optional texture channel failed to load");
            None
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn load_pack(source: &dyn AssetSource, paths: &TexturePaths) -> Result<TexturePack, AssetError> {
    let base = fetch_texture(source, &paths.base)?;
    let optional = |result: Option<Result<_, AssetError>>, channel: &str| match result {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            tracing::warn!(channel, error = %e, "optional texture channel failed to load");
            None
        }
        None => None,
    };
    Ok(TexturePack {
        base,
        light: optional(paths.light.as_deref().map(|p| fetch_texture(source, p)), "light"),
        bump: optional(paths.bump.as_deref().map(|p| fetch_texture(source, p)), "bump"),
        meta: optional(paths.meta.as_deref().map(|p| fetch_meta(source, p)), "meta"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use std::time::Duration;

    fn texture_bytes() -> Vec<u8> {
        ShipTexture {
            width: 1,
            height: 1,
            inversion: false,
            pixels: vec![10, 20, 30, 255],
        }
        .encode()
    }

    #[test]
    fn pack_with_all_channels() {
        let source = MemorySource::new();
        source.insert("base.tex", texture_bytes());
        source.insert("light.tex", texture_bytes());
        source.insert(
            "meta.json",
            br#"{"diffuse_color": [1,1,1,1], "opacity": [1,0]}"#.to_vec(),
        );

        let pack = load_pack(
            &source,
            &TexturePaths {
                base: "base.tex".into(),
                light: Some("light.tex".into()),
                bump: None,
                meta: Some("meta.json".into()),
            },
        )
        .unwrap();

        assert!(pack.light.is_some());
        assert!(pack.bump.is_none());
        assert_eq!(pack.meta.unwrap().opacity, [1.0, 0.0]);
    }

    #[test]
    fn base_failure_fails_the_pack() {
        let source = MemorySource::new();
        source.insert("light.tex", texture_bytes());
        let result = load_pack(
            &source,
            &TexturePaths {
                base: "missing.tex".into(),
                light: Some("light.tex".into()),
                bump: None,
                meta: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn optional_failure_degrades_to_absent() {
        let source = MemorySource::new();
        source.insert("base.tex", texture_bytes());
        let pack = load_pack(
            &source,
            &TexturePaths {
                base: "base.tex".into(),
                light: Some("missing.tex".into()),
                bump: None,
                meta: None,
            },
        )
        .unwrap();
        assert!(pack.light.is_none());
    }

    #[test]
    fn events_carry_their_generation() {
        let source = Arc::new(MemorySource::new());
        source.insert("base.tex", texture_bytes());
        let (loader, rx) = Loader::new(source);

        loader.request_pack(
            3,
            9,
            TexturePaths {
                base: "base.tex".into(),
                light: None,
                bump: None,
                meta: None,
            },
        );

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.generation, 3);
        match event.payload {
            LoadPayload::Pack { material_id, pack } => {
                assert_eq!(material_id, 9);
                assert!(pack.is_ok());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}

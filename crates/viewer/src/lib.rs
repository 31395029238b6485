//! Interactive 3D viewer for the game's ship models.
//!
//! Decodes the packed binary mesh and texture formats served by the backend
//! and renders them with wgpu, on desktop and (behind the `wasm` feature) in
//! the browser.

pub mod app;
pub mod assets;
pub mod loader;
pub mod renderer;
pub mod settings;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

/// Run the viewer natively against an exported static tree.
#[cfg(feature = "native")]
pub fn run(data_dir: std::path::PathBuf, ship_record: std::path::PathBuf) -> anyhow::Result<()> {
    use std::sync::Arc;

    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    use winit::event_loop::EventLoop;

    use hangar_data::{ShipDetails, ShipModel};

    use crate::app::App;
    use crate::assets::{AssetSource, DirSource};
    use crate::renderer::Renderer;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("hangar_viewer=debug".parse()?)
                .add_directive("hangar_data=debug".parse()?),
        )
        .init();

    let ship: ShipDetails = serde_json::from_slice(&std::fs::read(&ship_record)?)?;
    let source = Arc::new(DirSource::new(&data_dir));

    let lod = ship
        .default_lod()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("ship {} has no LODs", ship.id))?;
    let model_path = ship
        .model_paths
        .get(&lod)
        .ok_or_else(|| anyhow::anyhow!("no model path registered for {lod}"))?;

    let bytes = source.fetch(model_path)?;
    let model = ShipModel::decode(&bytes)?.with_identity(ship.id, lod.as_str());
    tracing::info!(ship = ship.id, lod = %lod, meshes = model.meshes.len(), "model decoded");

    let renderer = Renderer::new(source);
    let mut app = App::new(renderer, ship, model);

    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;
    Ok(())
}

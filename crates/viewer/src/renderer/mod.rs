//! Renderer orchestration.
//!
//! Owns the GPU context and every GPU resource derived from the current
//! model, reacts to model and settings changes, and runs the per-frame draw.
//! All GPU mutation happens on the render thread: asynchronous completions
//! (shader text, texture packs) arrive as channel events that are drained at
//! frame boundaries and checked against the current model generation before
//! touching anything.

pub mod buffers;
pub(crate) mod context;
pub mod pipeline;
pub mod projection;
pub mod textures;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use winit::window::Window;

use hangar_data::{BoundingBox, ShipDetails, ShipModel};

use crate::assets::AssetSource;
use crate::loader::{LoadEvent, LoadPayload, Loader, ProgramSlot};
use crate::settings::{self, RenderSettings, SettingsAction};
use buffers::MeshBuffers;
use context::RenderContext;
use pipeline::{LineProgram, MeshProgram, LINE_SHADER_PATH};
use projection::{DragMode, Projection};
use textures::TextureCache;

/// How long the shell waits before retrying a frame that found resources
/// not ready or a zero-size target. The only backpressure in the system.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no suitable GPU adapter")]
    NoAdapter,

    #[error("rendering context unavailable: {0}")]
    Context(String),

    #[error("shader build failed: {0}")]
    Shader(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Loading,
    Ready,
    Destroyed,
}

/// Result of one frame attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The loop flag is off; a stale scheduled frame became a no-op.
    Stopped,
    /// Resources not loaded yet or the target has zero size; retry after
    /// [`RETRY_DELAY`].
    NotReady,
    Drawn {
        mesh_draws: usize,
        bounding_drawn: bool,
    },
}

/// Notifications for the surrounding UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    /// One emission per completed >=1 s sampling window, rounded.
    Fps(u32),
    /// User interaction switched auto-rotate off; the UI should reflect
    /// this back into its settings state.
    AutoRotateChanged(bool),
}

pub struct Renderer {
    loader: Loader,
    load_rx: Receiver<LoadEvent>,

    window: Option<Arc<Window>>,
    context: Option<RenderContext>,

    ship: Option<ShipDetails>,
    model: Option<ShipModel>,

    mesh_buffers: Option<MeshBuffers>,
    texture_cache: Option<TextureCache>,
    program: Option<MeshProgram>,
    line: Option<LineProgram>,

    pub projection: Projection,
    settings: RenderSettings,

    state: RendererState,
    running: bool,
    /// Model epoch; load events from older epochs are dropped.
    generation: u64,

    fps: FpsCounter,
    events_tx: Sender<ViewerEvent>,
    events_rx: Receiver<ViewerEvent>,
}

impl Renderer {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        let (loader, load_rx) = Loader::new(source);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            loader,
            load_rx,
            window: None,
            context: None,
            ship: None,
            model: None,
            mesh_buffers: None,
            texture_cache: None,
            program: None,
            line: None,
            projection: Projection::new(),
            settings: RenderSettings::default(),
            state: RendererState::Uninitialized,
            running: false,
            generation: 0,
            fps: FpsCounter::new(),
            events_tx,
            events_rx,
        }
    }

    /// The window the surface will be created on. Must be set before the
    /// first `set_model`.
    pub fn attach_window(&mut self, window: Arc<Window>) {
        self.window = Some(window);
    }

    /// Stream of FPS samples and interaction notifications.
    pub fn events(&self) -> Receiver<ViewerEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// True once a context exists and every resource gate is open: mesh
    /// buffers, the active program (including its textures) and the line
    /// program.
    pub fn initialized(&self) -> bool {
        let Some(textures) = &self.texture_cache else {
            return false;
        };
        self.context.is_some()
            && self.mesh_buffers.as_ref().is_some_and(|b| b.loaded())
            && self.program.as_ref().is_some_and(|p| p.loaded(textures))
            && self.line.as_ref().is_some_and(|l| l.loaded())
    }

    /// Switch to a new model. No-op when the model is absent in spirit —
    /// same ship id and LOD as the current one; otherwise tears down all GPU
    /// state and rebuilds for the new model.
    pub fn set_model(&mut self, ship: &ShipDetails, model: ShipModel) {
        if let Some(current) = &self.model {
            if current.id == model.id && current.lod == model.lod {
                return;
            }
        }

        tracing::info!(ship = ship.id, lod = %model.lod, "switching model");

        // Stop the loop first so a frame scheduled against the old model
        // no-ops, then retire its resources and epoch.
        self.running = false;
        self.destroy_resources();
        self.generation += 1;

        #[cfg(not(target_arch = "wasm32"))]
        {
            self.context = None;
        }
        self.acquire_context();

        self.projection
            .set_bounding_box(BoundingBox::of_meshes(&model.meshes));
        self.ship = Some(ship.clone());
        self.model = Some(model);

        let Some(ctx) = self.context.as_ref() else {
            self.state = RendererState::Uninitialized;
            return;
        };

        let (Some(model), Some(ship)) = (self.model.as_ref(), self.ship.as_ref()) else {
            return;
        };

        self.mesh_buffers = Some(MeshBuffers::build(&ctx.device, model));

        let mut cache = TextureCache::new();
        cache.begin_load(
            &ctx.device,
            &ctx.queue,
            model,
            ship,
            &self.loader,
            self.generation,
        );
        self.texture_cache = Some(cache);

        let program = MeshProgram::create(&self.settings);
        program.request_source(&self.loader, self.generation);
        self.program = Some(program);

        let line = LineProgram::new(true);
        self.loader
            .request_shader(self.generation, ProgramSlot::Line, LINE_SHADER_PATH);
        self.line = Some(line);

        self.state = RendererState::Loading;
        self.running = true;
    }

    /// Apply new settings, diffing against the current ones: a shader switch
    /// rebuilds the active program, flag changes update it in place,
    /// identical settings do nothing. Auto-rotate is always forwarded.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.projection.auto_rotate = settings.auto_rotate;

        let action = settings::diff(&self.settings, &settings);
        self.settings = settings;

        match action {
            SettingsAction::RebuildProgram => {
                if let Some(mut old) = self.program.take() {
                    old.destroy();
                }
                if self.context.is_some() {
                    let program = MeshProgram::create(&self.settings);
                    program.request_source(&self.loader, self.generation);
                    self.program = Some(program);
                }
            }
            SettingsAction::UpdateProgram => {
                if let (Some(ctx), Some(program)) =
                    (self.context.as_ref(), self.program.as_mut())
                {
                    program.update_settings(&ctx.device, &self.settings);
                }
            }
            SettingsAction::None => {}
        }

        if let Some(program) = self.program.as_mut() {
            program.update_pbr(self.settings.pbr);
        }
    }

    pub fn resize(&mut self, height: u32, width: u32) {
        if !self.initialized() {
            return;
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.resize(width, height);
        }
    }

    /// Free everything GPU-side. Safe without a context; afterwards a new
    /// `set_model` starts from scratch.
    pub fn destroy(&mut self) {
        if self.context.is_none() {
            return;
        }
        self.destroy_resources();
        self.context = None;
        self.running = false;
        self.state = RendererState::Destroyed;
    }

    /// Attempt one frame. The caller owns scheduling: `Drawn` means schedule
    /// the next frame normally, `NotReady` means retry after [`RETRY_DELAY`].
    pub fn draw_frame(&mut self) -> FrameOutcome {
        if !self.running {
            return FrameOutcome::Stopped;
        }

        self.pump_load_events();

        let size_valid = self.context.as_ref().is_some_and(|c| c.size_valid());
        if !self.initialized() || !size_valid {
            return FrameOutcome::NotReady;
        }

        let Some(aspect) = self.context.as_ref().map(|c| c.aspect()) else {
            return FrameOutcome::NotReady;
        };
        self.projection.update(aspect);

        // Uniform writes and bind-group refreshes happen before the pass.
        if let (Some(ctx), Some(program), Some(textures), Some(model)) = (
            self.context.as_ref(),
            self.program.as_mut(),
            self.texture_cache.as_ref(),
            self.model.as_ref(),
        ) {
            program.prepare(
                &ctx.device,
                &ctx.queue,
                &self.projection,
                textures,
                &model.material_ids,
            );
        }
        if let (Some(ctx), Some(line)) = (self.context.as_ref(), self.line.as_ref()) {
            line.prepare(&ctx.queue, &self.projection);
        }

        let (Some(ctx), Some(model), Some(mesh_buffers), Some(program), Some(line)) = (
            self.context.as_ref(),
            self.model.as_ref(),
            self.mesh_buffers.as_ref(),
            self.program.as_ref(),
            self.line.as_ref(),
        ) else {
            return FrameOutcome::NotReady;
        };

        let frame = match ctx.acquire() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                ctx.reconfigure();
                return FrameOutcome::NotReady;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire frame");
                return FrameOutcome::NotReady;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        let mut mesh_draws = 0;
        let mut bounding_drawn = false;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: ctx.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (i, mesh) in mesh_buffers.meshes().iter().enumerate() {
                let material_id = model.material_ids.get(i).copied().unwrap_or(0);
                if program.draw(&mut pass, mesh, material_id) {
                    mesh_draws += 1;
                }
            }

            if self.settings.bounding_box {
                if let Some(bounding) = mesh_buffers.bounding() {
                    bounding_drawn = line.draw(&mut pass, bounding);
                }
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        let (planned_meshes, planned_bounding) =
            planned_draw_calls(mesh_buffers.meshes().len(), &self.settings);
        if mesh_draws != planned_meshes || bounding_drawn != planned_bounding {
            tracing::warn!(
                mesh_draws,
                planned_meshes,
                bounding_drawn,
                "frame drew fewer calls than planned"
            );
        }

        if let Some(fps) = self.fps.frame(Instant::now()) {
            let _ = self.events_tx.send(ViewerEvent::Fps(fps));
        }

        FrameOutcome::Drawn {
            mesh_draws,
            bounding_drawn,
        }
    }

    // Interaction forwarding; the shell maps raw window events onto these.

    pub fn pointer_down(&mut self, mode: DragMode) {
        if self.projection.pointer_down(mode) {
            let _ = self.events_tx.send(ViewerEvent::AutoRotateChanged(false));
        }
    }

    pub fn pointer_up(&mut self) {
        self.projection.pointer_up();
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.projection.pointer_move(x, y);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.projection.zoom(steps);
    }

    /// Drain load-completion events, dropping anything from a superseded
    /// model epoch before it can touch GPU state.
    fn pump_load_events(&mut self) {
        let events: Vec<LoadEvent> = self.load_rx.try_iter().collect();
        if events.is_empty() {
            return;
        }

        let Some(ctx) = self.context.as_ref() else {
            // Nothing to apply them to; the resources they were meant for
            // are gone.
            return;
        };

        for event in events {
            if event.generation != self.generation {
                tracing::debug!(
                    event_generation = event.generation,
                    current = self.generation,
                    "dropping stale load event"
                );
                continue;
            }

            match event.payload {
                LoadPayload::Shader { slot, source } => match source {
                    Ok(text) => match slot {
                        ProgramSlot::Mesh(kind) => {
                            if let Some(program) = self.program.as_mut() {
                                if program.kind() == kind {
                                    program.install_source(&ctx.device, ctx.format(), text);
                                }
                            }
                        }
                        ProgramSlot::Line => {
                            if let Some(line) = self.line.as_mut() {
                                line.install_source(&ctx.device, ctx.format(), text);
                            }
                        }
                    },
                    Err(e) => tracing::error!(error = %e, "shader source fetch failed"),
                },
                LoadPayload::Pack { material_id, pack } => {
                    if let Some(cache) = self.texture_cache.as_mut() {
                        cache.apply(&ctx.device, &ctx.queue, material_id, pack);
                    }
                }
            }
        }

        if self.state == RendererState::Loading && self.initialized() {
            self.state = RendererState::Ready;
            tracing::info!("renderer ready");
        }
    }

    fn destroy_resources(&mut self) {
        if let Some(mut buffers) = self.mesh_buffers.take() {
            buffers.destroy();
        }
        if let Some(mut cache) = self.texture_cache.take() {
            cache.destroy();
        }
        if let Some(mut program) = self.program.take() {
            program.destroy();
        }
        if let Some(mut line) = self.line.take() {
            line.destroy();
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn acquire_context(&mut self) {
        if self.context.is_some() {
            return;
        }
        let Some(window) = self.window.clone() else {
            tracing::error!("no window attached; cannot create render context");
            return;
        };
        match pollster::block_on(RenderContext::create(window)) {
            Ok(ctx) => self.context = Some(ctx),
            Err(e) => tracing::error!(error = %e, "failed to create render context"),
        }
    }

    /// On wasm the context is created asynchronously by the bootstrap and
    /// installed before the first `set_model`; an existing context is reused
    /// across model switches.
    #[cfg(target_arch = "wasm32")]
    fn acquire_context(&mut self) {
        if self.context.is_none() {
            tracing::error!("render context not installed");
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) fn install_context(&mut self, context: RenderContext) {
        self.context = Some(context);
    }
}

/// The draw calls a fully-loaded frame should issue for this model size and
/// settings: one per mesh plus the optional bounding overlay.
pub(crate) fn planned_draw_calls(mesh_count: usize, settings: &RenderSettings) -> (usize, bool) {
    (mesh_count, settings.bounding_box)
}

/// Counts frames over wall-clock windows of at least one second and yields
/// the rounded rate when a window completes.
pub(crate) struct FpsCounter {
    frames: u32,
    window_start: Option<Instant>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            frames: 0,
            window_start: None,
        }
    }

    pub fn frame(&mut self, now: Instant) -> Option<u32> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            self.frames = 0;
            return None;
        };

        self.frames += 1;
        let elapsed = now.duration_since(start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }

        let fps = (self.frames as f64 / elapsed.as_secs_f64()).round() as u32;
        self.frames = 0;
        self.window_start = Some(now);
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::settings::ShaderKind;

    #[test]
    fn fps_counter_emits_per_window() {
        let mut fps = FpsCounter::new();
        let t0 = Instant::now();
        assert_eq!(fps.frame(t0), None);

        // 30 frames across exactly one second.
        for i in 1..30 {
            assert_eq!(fps.frame(t0 + Duration::from_millis(i * 33)), None);
        }
        let sample = fps.frame(t0 + Duration::from_secs(1));
        assert_eq!(sample, Some(30));

        // The next window starts fresh.
        assert_eq!(fps.frame(t0 + Duration::from_millis(1500)), None);
    }

    #[test]
    fn fps_rounds_fractional_windows() {
        let mut fps = FpsCounter::new();
        let t0 = Instant::now();
        fps.frame(t0);
        assert_eq!(fps.frame(t0 + Duration::from_millis(400)), None);
        assert_eq!(fps.frame(t0 + Duration::from_millis(800)), None);
        // 3 frames over 1.2 s -> 2.5, rounded away from zero.
        let sample = fps.frame(t0 + Duration::from_millis(1200));
        assert_eq!(sample, Some(3));
    }

    #[test]
    fn planned_calls_follow_settings() {
        let mut settings = RenderSettings::default();
        assert_eq!(planned_draw_calls(2, &settings), (2, false));
        settings.bounding_box = true;
        assert_eq!(planned_draw_calls(5, &settings), (5, true));
    }

    #[test]
    fn renderer_without_window_stays_uninitialized() {
        let mut renderer = Renderer::new(Arc::new(MemorySource::new()));
        let ship = ShipDetails {
            id: 1,
            name: "test".into(),
            lods: vec!["Level0".into()],
            model_paths: Default::default(),
            texture_paths: Default::default(),
        };
        renderer.set_model(&ship, ShipModel::default().with_identity(1, "Level0"));

        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert!(!renderer.initialized());
        assert_eq!(renderer.draw_frame(), FrameOutcome::Stopped);
    }

    #[test]
    fn identical_model_is_a_noop() {
        let mut renderer = Renderer::new(Arc::new(MemorySource::new()));
        let ship = ShipDetails {
            id: 1,
            name: "test".into(),
            lods: vec!["Level0".into()],
            model_paths: Default::default(),
            texture_paths: Default::default(),
        };
        renderer.set_model(&ship, ShipModel::default().with_identity(1, "Level0"));
        let generation = renderer.generation;

        renderer.set_model(&ship, ShipModel::default().with_identity(1, "Level0"));
        assert_eq!(renderer.generation, generation);

        // A different LOD is a real switch.
        renderer.set_model(&ship, ShipModel::default().with_identity(1, "Level1"));
        assert_eq!(renderer.generation, generation + 1);
    }

    #[test]
    fn settings_are_forwarded_without_gpu() {
        let mut renderer = Renderer::new(Arc::new(MemorySource::new()));
        let mut settings = RenderSettings::default();
        settings.auto_rotate = false;
        settings.shader = ShaderKind::Pbr;
        renderer.set_settings(settings.clone());

        assert!(!renderer.projection.auto_rotate);
        assert_eq!(renderer.settings().shader, ShaderKind::Pbr);
        // No context: no program could be built, but nothing panics.
        assert!(renderer.program.is_none());
    }

    #[test]
    fn interaction_disables_auto_rotate_and_notifies() {
        let mut renderer = Renderer::new(Arc::new(MemorySource::new()));
        let events = renderer.events();

        renderer.pointer_down(DragMode::Rotate);
        assert_eq!(
            events.try_recv().ok(),
            Some(ViewerEvent::AutoRotateChanged(false))
        );

        // Second press: auto-rotate already off, no duplicate notification.
        renderer.pointer_up();
        renderer.pointer_down(DragMode::Move);
        assert!(events.try_recv().is_err());
    }
}

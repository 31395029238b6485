//! Browser bootstrap.
//!
//! wasm cannot block on futures, so the GPU context is created on a spawned
//! task and handed to the event loop through thread-local storage; the
//! renderer picks it up on the next event.

use std::cell::RefCell;
use std::sync::Arc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::web::WindowAttributesExtWebSys,
    window::{Window, WindowId},
};

use hangar_data::{ShipDetails, ShipModel};

use crate::assets::{AssetSource, MemorySource};
use crate::renderer::context::RenderContext;
use crate::renderer::{FrameOutcome, Renderer};

// wasm is single-threaded; the handoff slot is only touched from the main
// thread.
thread_local! {
    static CONTEXT: RefCell<Option<RenderContext>> = const { RefCell::new(None) };
}

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    tracing::info!("viewer wasm module loaded");
}

/// Prefetched static content assembled on the JS side.
#[wasm_bindgen]
#[derive(Default)]
pub struct StaticBundle {
    source: MemorySource,
}

#[wasm_bindgen]
impl StaticBundle {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, bytes: Vec<u8>) {
        self.source.insert(path, bytes);
    }
}

/// Start the viewer on the page canvas.
#[wasm_bindgen]
pub async fn start(ship_json: &str, model_bytes: &[u8], bundle: StaticBundle) {
    let result = run_viewer(ship_json, model_bytes, bundle).await;
    if let Err(e) = result {
        tracing::error!(error = %e, "viewer failed to start");
    }
}

async fn run_viewer(
    ship_json: &str,
    model_bytes: &[u8],
    bundle: StaticBundle,
) -> anyhow::Result<()> {
    let ship: ShipDetails = serde_json::from_str(ship_json)?;
    let lod = ship
        .default_lod()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("ship {} has no LODs", ship.id))?;
    let model = ShipModel::decode(model_bytes)?.with_identity(ship.id, lod.as_str());

    let source: Arc<dyn AssetSource> = Arc::new(bundle.source);
    let event_loop = EventLoop::new()?;
    let mut app = WasmApp::new(Renderer::new(source), ship, model);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn page_canvas() -> Option<web_sys::HtmlCanvasElement> {
    let window = web_sys::window()?;
    let document = window.document()?;
    let canvas = document.get_element_by_id("ship-canvas")?;
    let canvas: web_sys::HtmlCanvasElement = canvas.dyn_into().ok()?;

    let dpr = window.device_pixel_ratio();
    let rect = canvas.get_bounding_client_rect();
    canvas.set_width(((rect.width() * dpr) as u32).max(1));
    canvas.set_height(((rect.height() * dpr) as u32).max(1));

    Some(canvas)
}

struct WasmApp {
    renderer: Renderer,
    ship: ShipDetails,
    pending_model: Option<ShipModel>,
    window: Option<Arc<Window>>,
}

impl WasmApp {
    fn new(renderer: Renderer, ship: ShipDetails, model: ShipModel) -> Self {
        Self {
            renderer,
            ship,
            pending_model: Some(model),
            window: None,
        }
    }
}

impl ApplicationHandler for WasmApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let Some(canvas) = page_canvas() else {
            tracing::error!("canvas element not found");
            return;
        };

        let attrs = Window::default_attributes().with_canvas(Some(canvas));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!(error = %e, "failed to create window");
                return;
            }
        };

        self.renderer.attach_window(window.clone());
        self.window = Some(window.clone());

        wasm_bindgen_futures::spawn_local(async move {
            match RenderContext::create(window.clone()).await {
                Ok(context) => {
                    CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
                    window.request_redraw();
                }
                Err(e) => tracing::error!(error = %e, "failed to create render context"),
            }
        });
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Pick up the asynchronously created context, then load the model.
        if self.pending_model.is_some() {
            let context = CONTEXT.with(|slot| slot.borrow_mut().take());
            if let Some(context) = context {
                self.renderer.install_context(context);
                if let Some(model) = self.pending_model.take() {
                    self.renderer.set_model(&self.ship, model);
                }
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.renderer.destroy();
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.renderer.resize(new_size.height, new_size.width);
            }

            WindowEvent::RedrawRequested => {
                if !matches!(self.renderer.draw_frame(), FrameOutcome::Stopped) {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }

            _ => {}
        }
    }
}

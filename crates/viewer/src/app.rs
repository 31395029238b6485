//! Window shell and event routing.
//!
//! Maps raw window events onto the renderer's interaction surface and owns
//! frame scheduling: a drawn frame requests the next redraw immediately, a
//! not-ready frame re-arms after the fixed retry delay.

use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, MouseScrollDelta, StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow},
    window::{Window, WindowId},
};

use hangar_data::{ShipDetails, ShipModel};

use crate::renderer::projection::DragMode;
use crate::renderer::{FrameOutcome, Renderer, ViewerEvent, RETRY_DELAY};

pub struct App {
    renderer: Renderer,
    events: crossbeam_channel::Receiver<ViewerEvent>,
    ship: ShipDetails,
    /// Taken on first resume, once a window exists to render into.
    pending_model: Option<ShipModel>,
    window: Option<Arc<Window>>,
}

impl App {
    pub fn new(renderer: Renderer, ship: ShipDetails, model: ShipModel) -> Self {
        let events = renderer.events();
        Self {
            renderer,
            events,
            ship,
            pending_model: Some(model),
            window: None,
        }
    }

    fn drain_viewer_events(&self) {
        for event in self.events.try_iter() {
            match event {
                ViewerEvent::Fps(fps) => tracing::debug!(fps, "fps sample"),
                ViewerEvent::AutoRotateChanged(enabled) => {
                    tracing::info!(enabled, "auto-rotate changed by interaction");
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(format!("{} — ship viewer", self.ship.name))
            .with_inner_size(PhysicalSize::new(1080, 1080));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!(error = %e, "failed to create window");
                event_loop.exit();
                return;
            }
        };

        self.renderer.attach_window(window.clone());
        if let Some(model) = self.pending_model.take() {
            self.renderer.set_model(&self.ship, model);
        }

        window.request_redraw();
        self.window = Some(window);
    }

    fn new_events(&mut self, event_loop: &ActiveEventLoop, cause: StartCause) {
        // The retry timer fired; try the frame again.
        if matches!(cause, StartCause::ResumeTimeReached { .. }) {
            event_loop.set_control_flow(ControlFlow::Wait);
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.renderer.destroy();
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.renderer.resize(new_size.height, new_size.width);
            }

            WindowEvent::RedrawRequested => {
                match self.renderer.draw_frame() {
                    FrameOutcome::Drawn { .. } => {
                        if let Some(window) = &self.window {
                            window.request_redraw();
                        }
                    }
                    FrameOutcome::NotReady => {
                        event_loop
                            .set_control_flow(ControlFlow::WaitUntil(Instant::now() + RETRY_DELAY));
                    }
                    FrameOutcome::Stopped => {}
                }
                self.drain_viewer_events();
            }

            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    let mode = match button {
                        MouseButton::Left => DragMode::Rotate,
                        MouseButton::Right => DragMode::Move,
                        _ => return,
                    };
                    self.renderer.pointer_down(mode);
                }
                ElementState::Released => self.renderer.pointer_up(),
            },

            WindowEvent::CursorMoved { position, .. } => {
                self.renderer.pointer_move(position.x, position.y);
            }

            WindowEvent::CursorLeft { .. } => self.renderer.pointer_up(),

            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => (position.y / 120.0) as f32,
                };
                self.renderer.zoom(steps);
            }

            _ => {}
        }
    }
}

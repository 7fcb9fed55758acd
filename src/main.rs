// =============================================================================
// VULKAN TRIANGLE - one window, one pipeline, one triangle
// =============================================================================
//
// FRAME FLOW (after a one-time setup in TriangleRenderer::new):
// 1. Wait for the previous frame's fence
// 2. Acquire swapchain image      -> signals "present complete"
// 3. Submit its recorded commands -> waits on it, signals "render complete"
// 4. Present the image            -> waits on "render complete"
//
// There is no resizing and no input: the loop runs until the window is
// closed or a Vulkan call fails, in which case the error ends the process.
//
// =============================================================================

mod backend;
mod config;
mod geometry;
mod renderer;

use anyhow::Result;
use config::Config;
use renderer::TriangleRenderer;
use std::path::PathBuf;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    // Optional first argument: path to a config file
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    // Render continuously instead of waiting for OS events
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.finish()
}

/// Info by default, `RUST_LOG` overrides
fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// The renderer is declared before the window so it drops first:
/// the Vulkan surface must go before the window it points at.
struct App {
    config: Config,
    renderer: Option<TriangleRenderer>,
    window: Option<Window>,
    /// First fatal error; returned from `main`
    error: Option<anyhow::Error>,
    frames: u64,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            error: None,
            frames: 0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = event_loop.create_window(window_attributes)?;
        log::info!("Window created");

        let renderer = TriangleRenderer::new(&self.config, &window)?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Any failure is fatal: remember it and stop the loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:?}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn finish(mut self) -> Result<()> {
        log::info!("Rendered {} frames", self.frames);
        // Tear down Vulkan while the window still exists
        self.renderer = None;
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e.context("Failed to initialize"));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        self.fail(event_loop, e);
                        return;
                    }
                }
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                let Some(ref renderer) = self.renderer else {
                    return;
                };
                match renderer.render_scene() {
                    Ok(()) => self.frames += 1,
                    Err(e) => self.fail(event_loop, e.context("Render error")),
                }
            }

            _ => {}
        }
    }

    /// Keep the render loop spinning
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

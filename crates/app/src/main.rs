//! Model Viewer - Main Entry Point
//!
//! Opens a window and draws a textured OBJ model spinning around its Z axis,
//! redrawing continuously until the window is closed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, trace};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use viewer_core::ViewerConfig;
use viewer_platform::{ResizeFlag, Window};
use viewer_renderer::{FrameOutcome, Renderer};

#[derive(Parser, Debug)]
#[command(name = "model-viewer", about = "Textured OBJ model viewer", long_about = None)]
struct CliArgs {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial window width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// OBJ model to display.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Texture image applied to the model.
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Enable the Vulkan validation layer.
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Disable the Vulkan validation layer.
    #[arg(long)]
    no_validation: bool,

    /// Tracing filter, e.g. "info,viewer=debug". `RUST_LOG` wins over this.
    #[arg(long)]
    log_filter: Option<String>,
}

impl CliArgs {
    /// Load the configuration file (if any) and apply the command-line overrides.
    fn resolve_config(&self) -> Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => ViewerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ViewerConfig::default(),
        };

        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if let Some(model) = &self.model {
            config.assets.model = model.clone();
        }
        if let Some(texture) = &self.texture {
            config.assets.texture = texture.clone();
        }
        if self.validation {
            config.debug.validation = true;
        }
        if self.no_validation {
            config.debug.validation = false;
        }
        if let Some(filter) = &self.log_filter {
            config.debug.log_filter = filter.clone();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

struct App {
    config: ViewerConfig,
    resize: ResizeFlag,
    // Dropped before `window`; the surface refers to it
    renderer: Option<Renderer>,
    window: Option<Window>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            resize: ResizeFlag::new(),
            renderer: None,
            window: None,
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.config.window.width,
            self.config.window.height,
            &self.config.window.title,
        )
        .context("Failed to create window")?;

        let renderer = Renderer::new(&window, &self.config, self.resize.clone())
            .context("Failed to create renderer")?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) else {
            return Ok(());
        };

        let outcome = renderer
            .draw_frame(window.framebuffer_size())
            .context("Failed to draw frame")?;
        if outcome != FrameOutcome::Rendered {
            trace!("Frame outcome: {:?}", outcome);
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.resize.raise();

                // Sleep on events while minimized instead of spinning
                let control_flow = if size.width == 0 || size.height == 0 {
                    ControlFlow::Wait
                } else {
                    ControlFlow::Poll
                };
                event_loop.set_control_flow(control_flow);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Renderer::drop waits for the device to go idle
        self.renderer = None;
        self.window = None;
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let config = args.resolve_config()?;

    viewer_core::init_logging(&config.debug.log_filter);
    info!(
        "Starting model viewer: {} with {}",
        config.assets.model.display(),
        config.assets.texture.display()
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    match run(&args) {
        Ok(()) => {
            info!("Model viewer exited cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Fatal: {:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("model-viewer").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_gives_defaults() {
        let config = parse(&[]).resolve_config().unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = parse(&[
            "--width",
            "1024",
            "--height",
            "768",
            "--model",
            "models/cube.obj",
            "--texture",
            "textures/cube.png",
            "--no-validation",
            "--log-filter",
            "trace",
        ])
        .resolve_config()
        .unwrap();

        assert_eq!((config.window.width, config.window.height), (1024, 768));
        assert_eq!(config.assets.model, PathBuf::from("models/cube.obj"));
        assert_eq!(config.assets.texture, PathBuf::from("textures/cube.png"));
        assert!(!config.debug.validation);
        assert_eq!(config.debug.log_filter, "trace");
    }

    #[test]
    fn test_validation_flag() {
        let config = parse(&["--validation"]).resolve_config().unwrap();
        assert!(config.debug.validation);
    }

    #[test]
    fn test_conflicting_validation_flags_rejected() {
        let result = CliArgs::try_parse_from(["model-viewer", "--validation", "--no-validation"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_width_rejected() {
        let err = parse(&["--width", "0"]).resolve_config().unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid configuration"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let path = std::env::temp_dir().join("model-viewer-missing-config.toml");
        let _ = std::fs::remove_file(&path);
        let args = parse(&["--config", path.to_str().unwrap()]);
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_config_file_then_overrides() {
        let path = std::env::temp_dir().join("model-viewer-test-config.toml");
        std::fs::write(&path, "[window]\nwidth = 640\nheight = 480\ntitle = \"Test\"\n").unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--height", "360"])
            .resolve_config()
            .unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 360);
        assert_eq!(config.window.title, "Test");
    }
}

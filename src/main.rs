use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;
use pollster::block_on;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::platform::run_on_demand::EventLoopExtRunOnDemand;
use winit::window::WindowBuilder;

use voc_scene::{
    print_report, run_headless, GraphicsDevice, InputState, KeyCode, ModelConfig, NamedKey,
    Platform, Scene, SceneConfig, SystemClock, WgpuDevice,
};

const DEFAULT_HEADLESS_FRAMES: u64 = 60;
const USAGE: &str = "Usage: voc-scene [--headless] [--frames N] [--config FILE] [--assets DIR] \
[--size WxH] [--model PATH[:OFFSET]]... [--hidden-model PATH]...";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let config = options.scene_config()?;

    if options.headless {
        return headless(config, options.frames);
    }
    let fallback = config.clone();
    match run_interactive(config) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or WAYLAND_DISPLAY to open a window)."
                );
                headless(fallback, options.frames)
            } else {
                Err(err)
            }
        }
    }
}

fn headless(config: SceneConfig, frames: u64) -> Result<()> {
    let report = run_headless(config, frames)?;
    print_report(&report);
    Ok(())
}

fn run_interactive(config: SceneConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let mut event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("voc-scene")
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(false)
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let device = block_on(WgpuDevice::new(Arc::clone(&window)))?;
    let input = Arc::new(InputState::with_bindings(config.keys.clone()));
    let platform = Platform::new(Arc::clone(&input), Arc::new(SystemClock::new()));
    let mut app = AppState {
        device,
        platform,
        scene: Scene::new(config),
        input,
        last_error: None,
    };
    app.scene
        .init(&mut app.platform.systems(&mut app.device))
        .context("failed to initialize scene")?;

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop
        .run_on_demand(|event, elwt| {
            if let Err(err) = app.process_event(&event, elwt) {
                app.last_error = Some(err);
                elwt.exit();
            }
        })
        .context("event loop failed")?;

    app.shutdown();

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    device: WgpuDevice,
    platform: Platform,
    scene: Scene,
    input: Arc<InputState>,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl AppState {
    fn process_event(
        &mut self,
        event: &Event<()>,
        elwt: &EventLoopWindowTarget<()>,
    ) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.device.window_id() => {
                match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(size) => self.device.resize(*size),
                    WindowEvent::Focused(false) => self.input.release_all(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        if self.handle_keyboard(event) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        self.scene
                            .update(&mut self.platform.systems(&mut self.device))?;
                        self.device.present()?;
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.device.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    /// Records the key in the input state. Returns true when Escape was
    /// pressed.
    fn handle_keyboard(&self, event: &KeyEvent) -> bool {
        let PhysicalKey::Code(code) = event.physical_key else {
            return false;
        };
        let Some(keycode) = map_keycode(code) else {
            return false;
        };
        match event.state {
            ElementState::Pressed => self.input.set_key_down(keycode),
            ElementState::Released => self.input.set_key_up(keycode),
        }
        keycode == KeyCode::Named(NamedKey::Escape) && event.state == ElementState::Pressed
    }

    fn shutdown(&mut self) {
        self.scene
            .destroy(&mut self.platform.systems(&mut self.device));
        info!("rendered {} frames", self.scene.last_frame().frame);
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    use WinitKey as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter => KeyCode::Named(NamedKey::Enter),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::PageUp => KeyCode::Named(NamedKey::PageUp),
        Key::PageDown => KeyCode::Named(NamedKey::PageDown),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

struct CliOptions {
    headless: bool,
    frames: u64,
    config: Option<PathBuf>,
    assets: Option<PathBuf>,
    size: Option<(u32, u32)>,
    models: Vec<ModelConfig>,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            headless: false,
            frames: DEFAULT_HEADLESS_FRAMES,
            config: None,
            assets: None,
            size: None,
            models: Vec::new(),
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--frames" => {
                    let value = next_value(&mut args, &arg)?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count `{value}`"))?;
                }
                "--config" => options.config = Some(next_value(&mut args, &arg)?.into()),
                "--assets" => options.assets = Some(next_value(&mut args, &arg)?.into()),
                "--size" => options.size = Some(parse_size(&next_value(&mut args, &arg)?)?),
                "--model" => options.models.push(parse_model(&next_value(&mut args, &arg)?)),
                "--hidden-model" => {
                    let mut model = ModelConfig::new(next_value(&mut args, &arg)?);
                    model.visible = false;
                    options.models.push(model);
                }
                "-h" | "--help" => return Err(anyhow!(USAGE)),
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }

    /// Loads the config file, if any, and applies the flags on top.
    fn scene_config(&self) -> Result<SceneConfig> {
        let mut config = match &self.config {
            Some(path) => SceneConfig::load(path)?,
            None => SceneConfig::default(),
        };
        if let Some(assets) = &self.assets {
            config.asset_root = assets.clone();
        }
        if let Some((width, height)) = self.size {
            config.width = width;
            config.height = height;
        }
        // Model flags name files relative to the working directory.
        let cwd = env::current_dir().context("failed to read working directory")?;
        config.models.extend(self.models.iter().map(|model| ModelConfig {
            path: cwd.join(&model.path),
            ..model.clone()
        }));
        Ok(config)
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let parsed = value
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));
    match parsed {
        Some((width, height)) if width > 0 && height > 0 => Ok((width, height)),
        _ => Err(anyhow!("invalid size `{value}`, expected WIDTHxHEIGHT")),
    }
}

/// `PATH` or `PATH:OFFSET`. A suffix that is not a number stays in the path.
fn parse_model(value: &str) -> ModelConfig {
    if let Some((path, offset)) = value.rsplit_once(':') {
        if let Ok(offset) = offset.parse::<f32>() {
            let mut model = ModelConfig::new(path);
            model.offset = offset;
            return model;
        }
    }
    ModelConfig::new(value)
}

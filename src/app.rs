use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::SceneConfig;
use crate::font::FontManager;
use crate::input::InputState;
use crate::render::{GraphicsDevice, RecordingDevice};
use crate::scene::{Scene, Systems};
use crate::texture::TextureManager;
use crate::timer::{Clock, ManualClock};

/// Simulated frame length for headless runs, in milliseconds.
pub const HEADLESS_FRAME_MS: f64 = 1000.0 / 60.0;

/// Services shared by every frame of a run.
pub struct Platform {
    pub textures: TextureManager,
    pub fonts: FontManager,
    pub input: Arc<InputState>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Platform {
    pub fn new(input: Arc<InputState>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            textures: TextureManager::new(),
            fonts: FontManager::new(),
            input,
            clock,
        }
    }

    /// Borrows the services for one scene call against `device`.
    pub fn systems<'a>(&'a mut self, device: &'a mut dyn GraphicsDevice) -> Systems<'a> {
        Systems {
            device,
            textures: &mut self.textures,
            fonts: &mut self.fonts,
            keys: self.input.as_ref(),
            clock: self.clock.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub name: String,
    pub sub_meshes: usize,
    pub visible: bool,
}

/// What a headless run loaded and drew.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessReport {
    pub nodes: Vec<NodeSummary>,
    pub linked_programs: usize,
    pub loaded_textures: usize,
    pub frames: u64,
    pub draw_calls: usize,
    pub skipped_nodes: usize,
    pub dropped_draws: usize,
}

/// Runs `frames` updates against a [`RecordingDevice`] with a simulated
/// 60 Hz clock.
pub fn run_headless(config: SceneConfig, frames: u64) -> Result<HeadlessReport> {
    let input = Arc::new(InputState::with_bindings(config.keys.clone()));
    let clock = Arc::new(ManualClock::new(0.0));
    let mut platform = Platform::new(input, clock.clone());
    let mut device = RecordingDevice::new();
    let mut scene = Scene::new(config);

    scene
        .init(&mut platform.systems(&mut device))
        .context("failed to initialize scene")?;
    device.present().context("failed to present init commands")?;

    let mut report = HeadlessReport {
        nodes: scene
            .meshes()
            .nodes()
            .iter()
            .map(|node| NodeSummary {
                name: node.name.clone(),
                sub_meshes: node.sub_meshes.len(),
                visible: node.visible,
            })
            .collect(),
        linked_programs: scene
            .config()
            .shaders
            .iter()
            .filter(|pair| scene.shaders().get(&pair.name).is_some_and(|p| p.is_linked()))
            .count(),
        loaded_textures: device.texture_units().len(),
        ..HeadlessReport::default()
    };

    for _ in 0..frames {
        clock.advance(HEADLESS_FRAME_MS);
        let stats = scene
            .update(&mut platform.systems(&mut device))
            .context("frame update failed")?;
        device.present().context("failed to present frame")?;
        report.frames += 1;
        report.draw_calls += stats.draw_calls;
        report.skipped_nodes += stats.skipped_nodes;
    }

    scene.destroy(&mut platform.systems(&mut device));
    report.dropped_draws = device.dropped_draws();
    Ok(report)
}

pub fn print_report(report: &HeadlessReport) {
    println!(
        "Loaded {} mesh nodes ({} programs linked, {} textures)",
        report.nodes.len(),
        report.linked_programs,
        report.loaded_textures
    );
    for node in &report.nodes {
        let visibility = if node.visible { "visible" } else { "hidden" };
        println!(
            " - {} ({} sub-meshes, {visibility})",
            node.name, node.sub_meshes
        );
    }
    println!(
        "Rendered {} frames: {} draw calls, {} hidden nodes skipped",
        report.frames, report.draw_calls, report.skipped_nodes
    );
    if report.dropped_draws > 0 {
        println!("Dropped {} draws with no program bound", report.dropped_draws);
    }
}

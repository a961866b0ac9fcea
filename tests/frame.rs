use std::f32::consts::PI;
use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use once_cell::sync::Lazy;
use tempfile::TempDir;

use voc_scene::render::{Command, UniformValue};
use voc_scene::{
    GraphicsDevice, InputState, KeyCode, ManualClock, ModelConfig, Platform, RecordingDevice,
    Scene, SceneConfig, SceneError, SceneState,
};

static SHADERS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        (
            "flat-depth.vert.wgsl",
            include_str!("../assets/shaders/flat-depth.vert.wgsl"),
        ),
        (
            "flat-depth.frag.wgsl",
            include_str!("../assets/shaders/flat-depth.frag.wgsl"),
        ),
        ("font.vert.wgsl", include_str!("../assets/shaders/font.vert.wgsl")),
        ("font.frag.wgsl", include_str!("../assets/shaders/font.frag.wgsl")),
    ]
});

const QUAD_OBJ: &str = "o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

struct Harness {
    _assets: TempDir,
    device: RecordingDevice,
    platform: Platform,
    clock: Arc<ManualClock>,
    input: Arc<InputState>,
    scene: Scene,
}

impl Harness {
    fn new(models: Vec<ModelConfig>, with_textures: bool) -> Self {
        let assets = tempfile::tempdir().expect("asset dir");
        write_assets(assets.path(), with_textures);
        let mut config = SceneConfig {
            asset_root: assets.path().to_path_buf(),
            models,
            ..SceneConfig::default()
        };
        config.font.path = "fonts/missing.ttf".into();

        let input = Arc::new(InputState::new());
        let clock = Arc::new(ManualClock::new(0.0));
        Self {
            _assets: assets,
            device: RecordingDevice::new(),
            platform: Platform::new(Arc::clone(&input), clock.clone()),
            clock,
            input,
            scene: Scene::new(config),
        }
    }

    fn init(&mut self) -> Result<(), SceneError> {
        let result = self.scene.init(&mut self.platform.systems(&mut self.device));
        self.device.take_commands();
        result
    }

    fn frame(&mut self, millis: f64) -> Result<Vec<Command>, SceneError> {
        self.clock.advance(millis);
        self.scene
            .update(&mut self.platform.systems(&mut self.device))?;
        Ok(self.device.take_commands())
    }

    fn destroy(&mut self) {
        self.scene
            .destroy(&mut self.platform.systems(&mut self.device));
    }
}

fn write_assets(root: &Path, with_textures: bool) {
    let shaders = root.join("shaders");
    std::fs::create_dir_all(&shaders).unwrap();
    for (name, source) in SHADERS.iter() {
        std::fs::write(shaders.join(name), source).unwrap();
    }
    let models = root.join("models");
    std::fs::create_dir_all(&models).unwrap();
    std::fs::write(models.join("quad.obj"), QUAD_OBJ).unwrap();

    if with_textures {
        let textures = root.join("textures");
        std::fs::create_dir_all(&textures).unwrap();
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 100, 50]));
        for face in ["nz", "nx", "pz", "px", "py", "ny"] {
            image.save(textures.join(format!("{face}.jpg"))).unwrap();
        }
    }
}

fn draws(commands: &[Command]) -> Vec<Command> {
    commands
        .iter()
        .filter(|command| matches!(command, Command::Draw { .. }))
        .cloned()
        .collect()
}

#[test]
fn draws_follow_registration_order() {
    let mut harness = Harness::new(vec![ModelConfig::new("models/quad.obj")], false);
    harness.init().unwrap();
    let commands = harness.frame(16.0).unwrap();

    let expected: Vec<_> = harness
        .scene
        .meshes()
        .nodes()
        .iter()
        .flat_map(|node| node.sub_meshes.iter().map(|sub| sub.buffers().vertex_array))
        .collect();
    let drawn: Vec<_> = draws(&commands)
        .into_iter()
        .map(|draw| match draw {
            Command::Draw { vertex_array, .. } => vertex_array,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(expected.len(), 9);
    assert_eq!(drawn, expected);
    assert_eq!(harness.scene.last_frame().draw_calls, 9);
    assert_eq!(harness.scene.state(), SceneState::Running);
}

#[test]
fn hidden_models_are_skipped() {
    let mut hidden = ModelConfig::new("models/quad.obj");
    hidden.visible = false;
    let mut harness = Harness::new(vec![hidden], false);
    harness.init().unwrap();
    assert_eq!(harness.scene.meshes().len(), 4);

    let commands = harness.frame(16.0).unwrap();
    assert_eq!(draws(&commands).len(), 8);
    let stats = harness.scene.last_frame();
    assert_eq!(stats.skipped_nodes, 1);
    assert_eq!(stats.frame, 1);
}

#[test]
fn textured_flag_wraps_skybox_draws() {
    let mut harness = Harness::new(Vec::new(), true);
    harness.init().unwrap();
    assert_eq!(harness.device.texture_units(), vec![0, 1, 2, 3, 4, 5]);

    let commands = harness.frame(16.0).unwrap();
    let shaders = harness.scene.shaders();
    let textured = shaders.uniform("perspective", "textured").unwrap();
    let program = shaders.get("perspective").unwrap().program.unwrap();

    for unit in 0..6u32 {
        let bind = commands
            .iter()
            .position(|command| *command == Command::BindTexture(unit))
            .expect("texture bound");
        assert_eq!(
            commands[bind + 1],
            Command::SetUniform {
                program,
                location: textured,
                value: UniformValue::Bool(true),
            }
        );
        assert!(matches!(
            commands[bind + 2],
            Command::Draw { texture_unit: Some(u), .. } if u == unit
        ));
        assert_eq!(
            commands[bind + 3],
            Command::SetUniform {
                program,
                location: textured,
                value: UniformValue::Bool(false),
            }
        );
    }
    assert_eq!(
        harness.device.uniform_bytes(program, textured),
        Some(&0u32.to_ne_bytes()[..])
    );
}

#[test]
fn frame_clears_and_uploads_projections() {
    let mut harness = Harness::new(Vec::new(), false);
    harness.init().unwrap();
    let commands = harness.frame(16.0).unwrap();

    let config = harness.scene.config().clone();
    assert_eq!(
        commands[0],
        Command::Clear {
            color: config.clear_color,
            depth: 1.0,
        }
    );

    let shaders = harness.scene.shaders();
    let perspective = shaders.get("perspective").unwrap().program.unwrap();
    let projection = shaders.uniform("perspective", "projection").unwrap();
    let expected = Mat4::perspective_rh(45f32.to_radians(), 640.0 / 480.0, 0.001, 750.0);
    assert_eq!(harness.scene.perspective(), expected);
    assert_eq!(
        harness.device.uniform_bytes(perspective, projection),
        Some(bytemuck::cast_slice::<f32, u8>(&expected.to_cols_array()))
    );

    let diffuse = shaders.uniform("perspective", "diffuse").unwrap();
    assert_eq!(
        harness.device.uniform_bytes(perspective, diffuse),
        Some(bytemuck::cast_slice::<f32, u8>(&config.diffuse.to_array()))
    );

    let font = shaders.get("font").unwrap().program.unwrap();
    let ortho = shaders.uniform("font", "projection").unwrap();
    assert!(commands.contains(&Command::SetUniform {
        program: font,
        location: ortho,
        value: UniformValue::Mat4(Mat4::orthographic_rh(0.0, 640.0, 480.0, 0.0, -1.0, 1.0)),
    }));
    assert_eq!(commands.last(), Some(&Command::UseProgram(None)));
    assert_eq!(harness.scene.transforms().depth(), 0);
}

#[test]
fn held_keys_move_the_camera_after_the_view_is_taken() {
    let mut harness = Harness::new(Vec::new(), false);
    harness.init().unwrap();
    harness.input.set_key_down(KeyCode::Character('W'));

    harness.frame(1000.0).unwrap();
    let before = voc_scene::Camera::new();
    assert_eq!(harness.scene.view(), before.view_matrix());
    let camera = harness.scene.camera();
    assert!((camera.position - Vec3::new(0.0, 0.0, 5.0 - PI)).length() < 1e-4);
    assert!((harness.scene.last_frame().delta - 1.0).abs() < 1e-6);

    harness.input.release_all();
    harness.frame(500.0).unwrap();
    assert_eq!(harness.scene.view(), harness.scene.camera().view_matrix());
}

#[test]
fn lifecycle_is_enforced() {
    let mut harness = Harness::new(Vec::new(), false);
    assert_eq!(
        harness.frame(16.0).unwrap_err(),
        SceneError::InvalidState {
            operation: "update",
            state: SceneState::Uninitialized,
        }
    );

    harness.init().unwrap();
    assert_eq!(harness.scene.state(), SceneState::Initialized);
    assert!(matches!(
        harness.init(),
        Err(SceneError::InvalidState { .. })
    ));
    assert_eq!(harness.device.live_meshes(), 8);
    assert_eq!(harness.device.live_programs(), 2);

    harness.frame(16.0).unwrap();
    harness.destroy();
    harness.destroy();
    assert_eq!(harness.scene.state(), SceneState::Destroyed);
    assert!(harness.scene.meshes().is_empty());
    assert_eq!(harness.device.live_meshes(), 0);
    assert_eq!(harness.device.live_programs(), 0);
    assert!(harness.frame(16.0).is_err());
}

#[test]
fn failed_programs_drop_draws() {
    let mut harness = Harness::new(Vec::new(), false);
    let broken = harness.scene.config().resolve(Path::new("shaders/flat-depth.frag.wgsl"));
    std::fs::write(broken, "@fragment fn fs_main( {").unwrap();

    harness.init().unwrap();
    assert!(!harness.scene.shaders().get("perspective").unwrap().is_linked());
    let commands = harness.frame(16.0).unwrap();
    assert!(draws(&commands).is_empty());
    assert_eq!(harness.device.dropped_draws(), 8);
    assert_eq!(harness.scene.last_frame().draw_calls, 8);
    harness.device.present().unwrap();
}

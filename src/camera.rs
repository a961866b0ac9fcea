use std::f32::consts::PI;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Spectator key states sampled once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpectatorInput {
    pub move_forward: bool,
    pub move_backward: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub look_up: bool,
    pub look_down: bool,
}

/// Free-fly camera steered with discrete keys.
///
/// Only one move/turn action applies per frame and only one look action.
/// Angles accumulate without clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub look: Vec3,
    pub up: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            look: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::Y,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one frame of spectator input. Speeds are π units (or
    /// radians) per second.
    pub fn step(&mut self, elapsed: f32, input: SpectatorInput) {
        let amount = PI * elapsed;

        if input.move_forward {
            self.position += self.look * amount;
        } else if input.move_backward {
            self.position -= self.look * amount;
        } else if input.turn_left {
            self.yaw -= amount;
            self.face_yaw();
        } else if input.turn_right {
            self.yaw += amount;
            self.face_yaw();
        }

        if input.look_up {
            self.pitch += amount;
            self.look.y = self.pitch.sin();
        } else if input.look_down {
            self.pitch -= amount;
            self.look.y = self.pitch.sin();
        }
    }

    fn face_yaw(&mut self) {
        self.look.x = self.yaw.sin();
        self.look.z = -self.yaw.cos();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.look, self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.25;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn moving_forward_follows_the_look_direction() {
        let mut camera = Camera::new();
        camera.step(
            DT,
            SpectatorInput {
                move_forward: true,
                ..Default::default()
            },
        );
        assert!(approx(camera.position, Vec3::new(0.0, 0.0, 5.0 - PI * DT)));
        assert_eq!(camera.yaw, 0.0);
        assert_eq!(camera.pitch, 0.0);
    }

    #[test]
    fn turning_left_rotates_the_look_direction() {
        let mut camera = Camera::new();
        camera.step(
            DT,
            SpectatorInput {
                turn_left: true,
                ..Default::default()
            },
        );
        let yaw = -PI * DT;
        assert!((camera.yaw - yaw).abs() < 1e-6);
        assert!((camera.look.x - yaw.sin()).abs() < 1e-6);
        assert!((camera.look.z + yaw.cos()).abs() < 1e-6);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn first_move_action_wins() {
        let mut camera = Camera::new();
        camera.step(
            DT,
            SpectatorInput {
                move_forward: true,
                turn_right: true,
                look_up: true,
                look_down: true,
                ..Default::default()
            },
        );
        assert_eq!(camera.yaw, 0.0);
        assert!((camera.pitch - PI * DT).abs() < 1e-6);
        assert!((camera.look.y - (PI * DT).sin()).abs() < 1e-6);
    }

    #[test]
    fn zero_elapsed_time_is_a_no_op() {
        let inputs = [
            SpectatorInput {
                move_forward: true,
                look_up: true,
                ..Default::default()
            },
            SpectatorInput {
                move_backward: true,
                look_down: true,
                ..Default::default()
            },
            SpectatorInput {
                turn_left: true,
                ..Default::default()
            },
            SpectatorInput {
                turn_right: true,
                look_up: true,
                ..Default::default()
            },
        ];
        for input in inputs {
            let mut camera = Camera::new();
            camera.step(0.0, input);
            assert_eq!(camera, Camera::new(), "{input:?}");
        }
    }

    #[test]
    fn view_matrix_looks_down_negative_z() {
        let camera = Camera::new();
        let view = camera.view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert!(approx(origin, Vec3::new(0.0, 0.0, -5.0)));
    }
}

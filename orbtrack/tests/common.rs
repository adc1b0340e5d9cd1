//! Shared helpers for the integration tests: synthetic sphere scenes,
//! scripted cameras and tracker construction with simulated time.
#![allow(dead_code)]

use ndarray::Array3;
use orbtrack::clock::ManualClock;
use orbtrack::led::{LedState, MockLeds};
use orbtrack::{ControllerId, SphereTracker, TrackerConfig};
use shared::camera_interface::mock::MockCamera;
use shared::image_proc::bgr_scalar_to_hsv;
use shared::{BgrImage, ColorSignature, ConfigStorage};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const FRAME_W: usize = 640;
pub const FRAME_H: usize = 480;

/// Palette colors in RGB order, as handed out by `enable`.
pub const MAGENTA: (u8, u8, u8) = (0xff, 0x00, 0xff);
pub const CYAN: (u8, u8, u8) = (0x00, 0xff, 0xff);
pub const BLUE: (u8, u8, u8) = (0x00, 0x00, 0xff);

pub fn rgb_to_bgr(rgb: (u8, u8, u8)) -> (u8, u8, u8) {
    (rgb.2, rgb.1, rgb.0)
}

/// One glowing sphere in the synthetic scene.
#[derive(Debug, Clone)]
pub struct Sphere {
    pub center: (f64, f64),
    pub radius: f64,
    /// Rendered color, BGR order.
    pub bgr: (u8, u8, u8),
    pub visible: bool,
}

/// Mutable scene shared between a test and its scripted camera.
#[derive(Clone, Default)]
pub struct Scene {
    spheres: Arc<Mutex<Vec<Sphere>>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sphere(&self, center: (f64, f64), radius: f64, bgr: (u8, u8, u8)) -> usize {
        let mut spheres = self.spheres.lock().unwrap();
        spheres.push(Sphere {
            center,
            radius,
            bgr,
            visible: true,
        });
        spheres.len() - 1
    }

    pub fn move_sphere(&self, index: usize, center: (f64, f64)) {
        self.spheres.lock().unwrap()[index].center = center;
    }

    pub fn set_radius(&self, index: usize, radius: f64) {
        self.spheres.lock().unwrap()[index].radius = radius;
    }

    pub fn set_color(&self, index: usize, bgr: (u8, u8, u8)) {
        self.spheres.lock().unwrap()[index].bgr = bgr;
    }

    pub fn set_visible(&self, index: usize, visible: bool) {
        self.spheres.lock().unwrap()[index].visible = visible;
    }

    pub fn render(&self) -> BgrImage {
        let spheres = self.spheres.lock().unwrap().clone();
        render_frame(&spheres)
    }

    /// Camera that films the scene as-is, independent of the LED state.
    pub fn camera(&self) -> MockCamera {
        let scene = self.clone();
        MockCamera::from_fn((FRAME_W, FRAME_H), move || Arc::new(scene.render()))
    }
}

/// Render solid discs on a black frame.
pub fn render_frame(spheres: &[Sphere]) -> BgrImage {
    let mut frame = Array3::zeros((FRAME_H, FRAME_W, 3));
    for sphere in spheres.iter().filter(|s| s.visible) {
        let (cx, cy) = sphere.center;
        let r = sphere.radius;
        let x0 = (cx - r).floor().max(0.0) as usize;
        let y0 = (cy - r).floor().max(0.0) as usize;
        let x1 = ((cx + r).ceil() as usize).min(FRAME_W - 1);
        let y1 = ((cy + r).ceil() as usize).min(FRAME_H - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if dx * dx + dy * dy <= r * r {
                    frame[[y, x, 0]] = sphere.bgr.0;
                    frame[[y, x, 1]] = sphere.bgr.1;
                    frame[[y, x, 2]] = sphere.bgr.2;
                }
            }
        }
    }
    frame
}

/// Sphere geometry for one blink phase; the color comes from the LEDs.
pub fn blink_sphere(center: (f64, f64), radius: f64) -> Sphere {
    Sphere {
        center,
        radius,
        bgr: (0, 0, 0),
        visible: true,
    }
}

/// Camera that renders one sphere following the committed LED color of the
/// given controller: lit LEDs show the sphere in that color, dark LEDs show
/// an empty frame. `blinks` gives the sphere geometry per lit phase (the
/// last entry repeats), so calibration can be fed inconsistent blobs.
pub fn blink_camera(leds: &MockLeds, id: ControllerId, blinks: Vec<Sphere>) -> MockCamera {
    assert!(!blinks.is_empty(), "at least one blink geometry needed");
    let state = leds.state();
    let mut was_lit = false;
    let mut lit_phases = 0usize;

    MockCamera::from_fn((FRAME_W, FRAME_H), move || {
        let lit = state
            .lock()
            .unwrap()
            .get(&id.0)
            .copied()
            .filter(|&c| c != (0, 0, 0));

        let frame = match lit {
            Some(rgb) => {
                if !was_lit {
                    lit_phases += 1;
                }
                was_lit = true;
                let mut sphere = blinks[(lit_phases - 1).min(blinks.len() - 1)].clone();
                sphere.bgr = rgb_to_bgr(rgb);
                render_frame(&[sphere])
            }
            None => {
                was_lit = false;
                render_frame(&[])
            }
        };
        Arc::new(frame)
    })
}

/// Persist a color signature so a later `enable` can take the fast path.
pub fn seed_signature(
    dir: &TempDir,
    id: ControllerId,
    assigned_rgb: (u8, u8, u8),
    sphere_bgr: (u8, u8, u8),
) {
    let storage = ConfigStorage::with_path(dir.path().to_path_buf());
    let bgr = [
        sphere_bgr.0 as f64,
        sphere_bgr.1 as f64,
        sphere_bgr.2 as f64,
        0.0,
    ];
    let signature = ColorSignature {
        assigned_rgb,
        bgr,
        hsv: bgr_scalar_to_hsv(bgr),
    };
    storage.save_color_signature(id.0, &signature).unwrap();
}

pub type TestTracker = SphereTracker<MockCamera, MockLeds, Arc<ManualClock>>;

/// Build a tracker around a scripted camera, with simulated time and
/// storage in a temp directory.
pub fn build_tracker(
    camera: MockCamera,
    leds: MockLeds,
    dir: &TempDir,
) -> (TestTracker, Arc<ManualClock>, LedState) {
    let led_state = leds.state();
    let clock = Arc::new(ManualClock::new());
    let storage = ConfigStorage::with_path(dir.path().to_path_buf());
    let tracker = SphereTracker::with_clock(
        camera,
        leds,
        storage,
        TrackerConfig::default(),
        Arc::clone(&clock),
    )
    .expect("tracker should build");
    (tracker, clock, led_state)
}

/// Run one acquire-and-track cycle.
pub fn step(tracker: &mut TestTracker) -> usize {
    tracker.update_image();
    tracker.update(None)
}

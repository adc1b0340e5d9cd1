//! Per-frame tracking: quality gates, smoothing, ROI handling and the
//! lost-sphere recovery sweep.

mod common;

use common::{build_tracker, seed_signature, step, Scene, MAGENTA};
use orbtrack::led::MockLeds;
use orbtrack::{ControllerId, Status};
use tempfile::TempDir;

struct Setup {
    tracker: common::TestTracker,
    clock: std::sync::Arc<orbtrack::clock::ManualClock>,
    scene: Scene,
    sphere: usize,
    id: ControllerId,
    _dir: TempDir,
}

/// One tracked magenta sphere, enabled through the persisted fast path.
fn tracked_setup(center: (f64, f64), radius: f64) -> Setup {
    let dir = TempDir::new().unwrap();
    let id = ControllerId(1);

    let scene = Scene::new();
    let sphere = scene.add_sphere(center, radius, common::rgb_to_bgr(MAGENTA));
    seed_signature(&dir, id, MAGENTA, common::rgb_to_bgr(MAGENTA));

    let (mut tracker, clock, _leds) = build_tracker(scene.camera(), MockLeds::new(), &dir);
    assert_eq!(tracker.enable_with_color(id, MAGENTA), Status::Calibrated);
    Setup {
        tracker,
        clock,
        scene,
        sphere,
        id,
        _dir: dir,
    }
}

#[test]
fn test_clean_sphere_passes_quality_gates() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = tracked_setup((100.0, 100.0), 20.0);

    assert_eq!(step(&mut s.tracker), 1);
    assert_eq!(s.tracker.status(s.id), Status::Tracking);

    let record = s.tracker.record(s.id).unwrap();
    assert!(record.is_tracked);
    // a solid disc fills its estimated circle almost exactly
    assert!(record.q1 > 0.9 && record.q1 < 1.25, "q1 was {}", record.q1);
    assert!((record.q3 - 20.0).abs() <= 1.5, "q3 was {}", record.q3);

    // with q1 this high the reported position snaps to the mass center
    let (x, y, r) = s.tracker.position(s.id).unwrap();
    assert_eq!((x, y), (100.0, 100.0));
    assert!((r - 20.0).abs() <= 1.5, "r was {r}");
}

#[test]
fn test_adaptive_smoothing_follows_fast_motion() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = tracked_setup((100.0, 100.0), 20.0);

    assert_eq!(step(&mut s.tracker), 1);
    assert_eq!(s.tracker.position(s.id).unwrap().0, 100.0);

    // a 20 px jump saturates the adaptive blend: f = min(20/7 + 0.15, 1)
    let mass_jump: f64 = 20.0;
    let blend = (mass_jump / 7.0 + 0.15).min(1.0);
    assert_eq!(blend, 1.0);
    let expected_x = 100.0 * (1.0 - blend) + 120.0 * blend;

    s.scene.move_sphere(s.sphere, (120.0, 100.0));
    assert_eq!(step(&mut s.tracker), 1);
    let (x, y, _) = s.tracker.position(s.id).unwrap();
    assert!((x - expected_x).abs() <= 1.0, "x was {x}");
    assert!((y - 100.0).abs() <= 1.0, "y was {y}");
}

#[test]
fn test_roi_rectangle_never_leaves_frame() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = tracked_setup((100.0, 100.0), 20.0);

    let waypoints = [
        (60.0, 60.0),
        (120.0, 120.0),
        (200.0, 180.0),
        (300.0, 240.0),
        (400.0, 300.0),
        (500.0, 380.0),
        (600.0, 440.0),
        (610.0, 450.0),
    ];

    for &center in &waypoints {
        s.scene.move_sphere(s.sphere, center);
        for _ in 0..4 {
            step(&mut s.tracker);

            let roi = s.tracker.roi_rect(s.id).unwrap();
            assert!(roi.x >= 0 && roi.y >= 0, "roi origin {roi:?}");
            assert!(
                roi.x + roi.width <= common::FRAME_W as i32,
                "roi right edge out of frame: {roi:?}"
            );
            assert!(
                roi.y + roi.height <= common::FRAME_H as i32,
                "roi bottom edge out of frame: {roi:?}"
            );
        }
    }

    // after settling, the sphere near the frame corner is still locked
    assert_eq!(s.tracker.status(s.id), Status::Tracking);
    let (x, y, _) = s.tracker.position(s.id).unwrap();
    assert!((x - 610.0).abs() <= 2.0, "x was {x}");
    assert!((y - 450.0).abs() <= 2.0, "y was {y}");
}

#[test]
fn test_quadrant_sweep_visits_all_corners() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = tracked_setup((320.0, 240.0), 20.0);

    assert_eq!(step(&mut s.tracker), 1);

    // sphere gone: each failing frame parks the coarsest ROI on the next
    // frame corner
    s.scene.set_visible(s.sphere, false);
    let expected_origins = [(0, 0), (320, 0), (320, 240), (0, 240)];
    for &(ex, ey) in &expected_origins {
        assert_eq!(step(&mut s.tracker), 0);
        assert_eq!(s.tracker.status(s.id), Status::Calibrated);

        let roi = s.tracker.roi_rect(s.id).unwrap();
        assert_eq!((roi.x, roi.y), (ex, ey));
        assert_eq!((roi.width, roi.height), (320, 240));
    }

    // reappearing in the bottom-right quadrant, the sweep finds the sphere
    // within a few frames
    s.scene.set_visible(s.sphere, true);
    s.scene.move_sphere(s.sphere, (500.0, 350.0));
    let mut found = 0;
    for _ in 0..8 {
        found = step(&mut s.tracker);
        if found == 1 {
            break;
        }
    }
    assert_eq!(found, 1);
    let (x, y, _) = s.tracker.position(s.id).unwrap();
    assert!((x - 500.0).abs() <= 2.0, "x was {x}");
    assert!((y - 350.0).abs() <= 2.0, "y was {y}");
}

#[test]
fn test_fps_estimate_gates_roi_recentering() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = tracked_setup((100.0, 100.0), 20.0);

    // zero-duration updates leave the FPS estimate untouched
    for _ in 0..5 {
        step(&mut s.tracker);
    }
    assert_eq!(s.tracker.fps(), 0.0);

    // 5 ms per update reads as 200 FPS; the smoothed estimate converges
    // there and crosses the recentering threshold
    s.clock.set_advance_on_read(5);
    for _ in 0..15 {
        step(&mut s.tracker);
    }
    let expected = 200.0 * (1.0 - 0.85f64.powi(15));
    assert!((s.tracker.fps() - expected).abs() < 20.0, "fps {}", s.tracker.fps());
    assert!(s.tracker.fps() > 160.0);

    // with recentering active, tracking still follows motion
    s.scene.move_sphere(s.sphere, (140.0, 130.0));
    step(&mut s.tracker);
    step(&mut s.tracker);
    assert_eq!(s.tracker.status(s.id), Status::Tracking);
    let (x, y, _) = s.tracker.position(s.id).unwrap();
    assert!((x - 140.0).abs() <= 2.0, "x was {x}");
    assert!((y - 130.0).abs() <= 2.0, "y was {y}");
}

#[test]
fn test_single_controller_update_leaves_others_alone() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let (m1, m2) = (ControllerId(1), ControllerId(2));

    let scene = Scene::new();
    scene.add_sphere((100.0, 100.0), 20.0, common::rgb_to_bgr(MAGENTA));
    let cyan_sphere = scene.add_sphere((250.0, 80.0), 20.0, common::rgb_to_bgr(common::CYAN));
    seed_signature(&dir, m1, MAGENTA, common::rgb_to_bgr(MAGENTA));
    seed_signature(&dir, m2, common::CYAN, common::rgb_to_bgr(common::CYAN));

    let (mut tracker, _clock, _leds) = build_tracker(scene.camera(), MockLeds::new(), &dir);
    assert_eq!(tracker.enable(m1), Status::Calibrated);
    assert_eq!(tracker.enable(m2), Status::Calibrated);
    assert_eq!(step(&mut tracker), 2);

    let m2_position = tracker.position(m2).unwrap();

    // m2's sphere moves, but only m1 is updated
    scene.move_sphere(cyan_sphere, (280.0, 110.0));
    tracker.update_image();
    assert_eq!(tracker.update(Some(m1)), 1);
    assert_eq!(tracker.position(m2).unwrap(), m2_position);
}

#[test]
fn test_annotated_frame_marks_roi() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = tracked_setup((100.0, 100.0), 20.0);

    assert_eq!(step(&mut s.tracker), 1);
    let annotated = s.tracker.annotate_frame().expect("frame present");
    let roi = s.tracker.roi_rect(s.id).unwrap();

    // the thick white outline sits just outside the nominal edge, the thin
    // red one exactly on it
    let (x, y) = (roi.x as usize, roi.y as usize);
    assert_eq!(annotated[[y - 1, x - 1, 0]], 255);
    assert_eq!(annotated[[y - 1, x - 1, 2]], 255);
    assert_eq!(annotated[[y, x, 0]], 0);
    assert_eq!(annotated[[y, x, 2]], 255);
}

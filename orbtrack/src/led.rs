//! Controller LED abstraction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::record::ControllerId;

/// Trait for driving a controller's sphere LEDs.
///
/// `set_leds` stages a color; `update_leds` commits it to the device. The
/// commit is treated as non-blocking.
pub trait LedInterface {
    fn set_leds(&mut self, id: ControllerId, r: u8, g: u8, b: u8);
    fn update_leds(&mut self, id: ControllerId);
}

/// Shared view of the committed LED state, for test scene rendering.
pub type LedState = Arc<Mutex<HashMap<u32, (u8, u8, u8)>>>;

/// Mock LED driver that records committed colors.
///
/// The committed state is shared behind an `Arc` so a scripted camera can
/// render frames that follow the LEDs, which is what the blink calibration
/// tests need.
#[derive(Default)]
pub struct MockLeds {
    staged: HashMap<u32, (u8, u8, u8)>,
    committed: LedState,
    pub commits: usize,
}

impl MockLeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the committed LED state.
    pub fn state(&self) -> LedState {
        Arc::clone(&self.committed)
    }
}

impl LedInterface for MockLeds {
    fn set_leds(&mut self, id: ControllerId, r: u8, g: u8, b: u8) {
        self.staged.insert(id.0, (r, g, b));
    }

    fn update_leds(&mut self, id: ControllerId) {
        if let Some(&color) = self.staged.get(&id.0) {
            self.committed.lock().unwrap().insert(id.0, color);
        }
        self.commits += 1;
    }
}

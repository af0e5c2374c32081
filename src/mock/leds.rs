use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::leds::{LedStrip, Rgb8};

/// Strip that keeps every frame shown on it.
#[derive(Clone, Default)]
pub struct RecordingStrip {
    frames: Arc<Mutex<Vec<Vec<Rgb8>>>>,
    loaded: Vec<Rgb8>,
}

impl RecordingStrip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<Rgb8>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LedStrip for RecordingStrip {
    fn load(&mut self, pixels: &[Rgb8]) -> Result<(), i32> {
        self.loaded.clear();
        self.loaded.extend_from_slice(pixels);
        Ok(())
    }

    fn show(&mut self) -> Result<(), i32> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(self.loaded.clone());
        Ok(())
    }
}

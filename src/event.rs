//! Records carried by the bounded queues.

/// One key transition from the matrix.
///
/// Copied into queue storage at push and out again at pop; consumed exactly
/// once by the steno worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanEvent {
    pub row: u8,
    pub col: u8,
    pub pressed: bool,
    /// Microseconds since boot when the transition was sampled.
    pub timestamp: u64,
}

impl ScanEvent {
    pub const fn new(row: u8, col: u8, pressed: bool, timestamp: u64) -> Self {
        Self {
            row,
            col,
            pressed,
            timestamp,
        }
    }
}

/// HID usage code for the left shift bit in the modifier byte.
pub const MOD_LEFT_SHIFT: u8 = 0x02;

/// Boot-protocol keyboard input report: modifiers, reserved, six key slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HidReport(pub [u8; 8]);

impl HidReport {
    /// All keys up.
    pub const RELEASE: HidReport = HidReport([0; 8]);

    /// A single key with modifiers.
    pub const fn key(mods: u8, usage: u8) -> Self {
        HidReport([mods, 0, usage, 0, 0, 0, 0, 0])
    }

    pub fn mods(&self) -> u8 {
        self.0[0]
    }

    /// Pressed key usage codes (non-zero slots).
    pub fn keys(&self) -> impl Iterator<Item = u8> + '_ {
        self.0[2..].iter().copied().filter(|&k| k != 0)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

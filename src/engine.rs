//! Reference steno engine.
//!
//! Stands in for the external translator so the firmware is complete: it
//! gathers key presses into raw steno strokes and types each stroke out as
//! text (`STKPW-FRPBGS`), followed by a space. It also negotiates which half
//! talks to the host over the inter-board link.
//!
//! # Link bytes
//!
//! ```text
//! 0b00pk_kkkk   key event: p = pressed, k = sender's local key index
//! 0x80 | side   announce: idle
//! 0x90 | side   announce: primary (has the USB host)
//! ```
//!
//! # Roles
//!
//! ```text
//!            host attached                    host lost
//!   Idle ───────────────────▶ Primary ───────────────────▶ Idle
//!     │                          ▲
//!     │ peer announces primary   │ host attached
//!     ▼                          │
//!   Secondary ───────────────────┘
//!     │ no announce for IDLE_ROUNDS housekeeping passes
//!     ▼
//!   Idle
//! ```
//!
//! Primary types strokes from both halves. Secondary forwards its key
//! events over the link and types nothing.

use core::fmt::{self, Write};

use crate::event::{HidReport, ScanEvent, MOD_LEFT_SHIFT};
use crate::leds::{
    Indication, RenderState, INIT_INDICATOR, SECONDARY_INDICATOR, STENO_RAW_INDICATOR,
    USB_PRIMARY_INDICATOR,
};
use crate::sys;
use crate::workers::steno::{Emit, StenoEngine};
use crate::BG_LOG_STREAM;

/// Keys on one half.
pub const KEYS_PER_SIDE: usize = 15;

/// Housekeeping passes a secondary waits for an announce before giving up.
pub const IDLE_ROUNDS: u8 = 3;

const KEY_PRESSED: u8 = 0x20;
const KEY_INDEX: u8 = 0x1f;
const ANNOUNCE: u8 = 0x80;
const ANNOUNCE_KIND: u8 = 0xf0;
const ANNOUNCE_IDLE: u8 = 0x80;
const ANNOUNCE_PRIMARY: u8 = 0x90;

/// Raw steno stroke, one bit per key.
///
/// Bits 23..0 follow the steno order `^+STKPWHRAO*EUFRPBLGTSDZ`; bit 24 is
/// the number key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stroke(pub u32);

impl Stroke {
    pub const EMPTY: Stroke = Stroke(0);
    pub const NUM: u32 = 0x100_0000;
    pub const MID: u32 = 0x7c00;
    pub const RIGHT: u32 = 0x3ff;

    const ORDER: &'static [u8; 24] = b"^+STKPWHRAO*EUFRPBLGTSDZ";

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn merge(self, other: Stroke) -> Stroke {
        Stroke(self.0 | other.0)
    }

    /// Call `f` for every character of the textual form.
    pub fn for_each_char(self, mut f: impl FnMut(char)) {
        if self.0 & Self::NUM != 0 {
            f('#');
        }
        let needs_hyphen = self.0 & Self::RIGHT != 0 && self.0 & Self::MID == 0;
        for (i, &ch) in Self::ORDER.iter().enumerate() {
            let bit = 23 - i;
            if bit == 9 && needs_hyphen {
                f('-');
            }
            if self.0 & (1 << bit) != 0 {
                f(ch as char);
            }
        }
    }
}

impl fmt::Display for Stroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Ok(());
        self.for_each_char(|ch| {
            if result.is_ok() {
                result = f.write_char(ch);
            }
        });
        result
    }
}

/// Key index on the left half, then the right, to stroke bits.
static KEYMAP: [u32; 2 * KEYS_PER_SIDE] = [
    // Left
    1 << 13,    // O
    1 << 14,    // A
    Stroke::NUM,
    0x80_0000,  // ^
    0x80_0000,  // ^
    1 << 15,    // R
    1 << 16,    // H
    1 << 17,    // W
    1 << 18,    // P
    1 << 20,    // T
    1 << 19,    // K
    1 << 12,    // *
    1 << 21,    // S
    0,
    0,
    // Right
    1 << 11,    // E
    1 << 10,    // U
    Stroke::NUM,
    0x40_0000,  // +
    0x40_0000,  // +
    1 << 8,     // -R
    1 << 9,     // -F
    1 << 6,     // -B
    1 << 7,     // -P
    1 << 5,     // -L
    1 << 4,     // -G
    1 << 3,     // -T
    1 << 2,     // -S
    1 << 1,     // -D
    1 << 0,     // -Z
];

/// Which half of the keyboard this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    fn from_bits(bits: u8) -> Option<Side> {
        match bits {
            0 => Some(Side::Left),
            1 => Some(Side::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Neither host nor primary peer seen.
    Idle,
    /// Owns the USB host; types strokes from both halves.
    Primary,
    /// Forwards key events to the primary half.
    Secondary,
}

/// HID key for one stroke character.
fn char_report(ch: char) -> Option<HidReport> {
    let report = match ch {
        'A'..='Z' => HidReport::key(MOD_LEFT_SHIFT, 0x04 + (ch as u8 - b'A')),
        '-' => HidReport::key(0, 0x2d),
        '*' => HidReport::key(MOD_LEFT_SHIFT, 0x25),
        '#' => HidReport::key(MOD_LEFT_SHIFT, 0x20),
        '^' => HidReport::key(MOD_LEFT_SHIFT, 0x23),
        '+' => HidReport::key(MOD_LEFT_SHIFT, 0x2e),
        ' ' => HidReport::key(0, 0x2c),
        _ => return None,
    };
    Some(report)
}

/// Type `stroke` as text plus a trailing space, then release all keys.
///
/// A release goes between two identical reports so the host sees two key
/// presses.
pub fn type_stroke(stroke: Stroke, out: &mut dyn Emit) {
    let mut last = HidReport::RELEASE;
    let mut emit = |report: HidReport| {
        if report == last {
            out.report(HidReport::RELEASE);
        }
        out.report(report);
        last = report;
    };

    stroke.for_each_char(|ch| {
        if let Some(report) = char_report(ch) {
            emit(report);
        }
    });
    emit(HidReport::key(0, 0x2c));
    emit(HidReport::RELEASE);
}

pub struct RawStenoEngine {
    side: Side,
    cols: u8,
    role: Role,
    /// Pressed keys per side, bit = local key index.
    pressed: [u16; 2],
    /// Every key pressed since the stroke began.
    seen: Stroke,
    rounds_without_announce: u8,
    peer_heard: bool,
    warned_same_side: bool,
    shown: Option<&'static Indication>,
    strokes: u32,
}

impl RawStenoEngine {
    pub fn new(side: Side, cols: u8) -> Self {
        Self {
            side,
            cols,
            role: Role::Idle,
            pressed: [0; 2],
            seen: Stroke::EMPTY,
            rounds_without_announce: 0,
            peer_heard: false,
            warned_same_side: false,
            shown: None,
            strokes: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Strokes typed since boot.
    pub fn strokes(&self) -> u32 {
        self.strokes
    }

    fn set_role(&mut self, role: Role) {
        if role == self.role {
            return;
        }
        crate::rt_info!(BG_LOG_STREAM, sys::now_us(), "steno: {:?} -> {:?}", self.role, role);
        self.role = role;
        self.pressed = [0; 2];
        self.seen = Stroke::EMPTY;
        self.rounds_without_announce = 0;
    }

    fn apply_key(&mut self, side: Side, index: u8, pressed: bool, out: &mut dyn Emit) {
        let index = index as usize;
        if index >= KEYS_PER_SIDE {
            return;
        }
        let keys = &mut self.pressed[side as usize];
        if pressed {
            *keys |= 1 << index;
        } else {
            *keys &= !(1 << index);
        }

        let down = self.down();
        self.seen = self.seen.merge(down);
        if self.pressed == [0; 2] && !self.seen.is_empty() {
            let stroke = self.seen;
            self.seen = Stroke::EMPTY;
            self.strokes += 1;
            crate::rt_debug!(BG_LOG_STREAM, sys::now_us(), "steno: stroke {}", stroke);
            type_stroke(stroke, out);
        }
    }

    /// Stroke bits of the keys currently held on both halves.
    fn down(&self) -> Stroke {
        let mut bits = 0;
        for side in [Side::Left, Side::Right] {
            let keys = self.pressed[side as usize];
            for index in 0..KEYS_PER_SIDE {
                if keys & (1 << index) != 0 {
                    bits |= KEYMAP[side as usize * KEYS_PER_SIDE + index];
                }
            }
        }
        Stroke(bits)
    }

    fn show(&mut self, out: &mut dyn Emit) {
        let wanted: &'static Indication = match self.role {
            Role::Idle => &INIT_INDICATOR,
            Role::Primary if out.link_present() && !self.peer_heard => &USB_PRIMARY_INDICATOR,
            Role::Primary => &STENO_RAW_INDICATOR,
            Role::Secondary => &SECONDARY_INDICATOR,
        };
        if self.shown.map_or(true, |shown| !core::ptr::eq(shown, wanted)) {
            self.shown = Some(wanted);
            out.set_leds(RenderState::all(wanted));
        }
    }

    fn on_announce(&mut self, byte: u8, out: &mut dyn Emit) {
        let Some(peer) = Side::from_bits(byte & !ANNOUNCE_KIND) else {
            return;
        };
        self.peer_heard = true;

        if peer == self.side && !self.warned_same_side {
            self.warned_same_side = true;
            crate::rt_warn!(
                BG_LOG_STREAM,
                sys::now_us(),
                "steno: both halves are configured as {}",
                peer.as_str()
            );
        }

        if byte & ANNOUNCE_KIND == ANNOUNCE_PRIMARY {
            self.rounds_without_announce = 0;
            if self.role == Role::Idle && !out.host_attached() {
                self.set_role(Role::Secondary);
            }
        }
        self.show(out);
    }
}

impl StenoEngine for RawStenoEngine {
    fn on_event(&mut self, event: &ScanEvent, out: &mut dyn Emit) {
        let index = event.row as usize * self.cols as usize + event.col as usize;
        if index >= KEYS_PER_SIDE {
            crate::rt_debug!(
                BG_LOG_STREAM,
                sys::now_us(),
                "steno: no key at ({}, {})",
                event.row,
                event.col
            );
            return;
        }
        let index = index as u8;

        match self.role {
            Role::Idle => {}
            Role::Primary => self.apply_key(self.side, index, event.pressed, out),
            Role::Secondary => {
                let pressed = if event.pressed { KEY_PRESSED } else { 0 };
                out.link_send(pressed | index);
            }
        }
    }

    fn on_link_byte(&mut self, byte: u8, out: &mut dyn Emit) {
        if byte & ANNOUNCE != 0 {
            self.on_announce(byte, out);
        } else if byte & !(KEY_PRESSED | KEY_INDEX) == 0 {
            self.peer_heard = true;
            if self.role == Role::Primary {
                let side = self.side.other();
                self.apply_key(side, byte & KEY_INDEX, byte & KEY_PRESSED != 0, out);
                self.show(out);
            }
        }
    }

    fn housekeeping(&mut self, _now_us: u64, out: &mut dyn Emit) {
        let attached = out.host_attached();
        match self.role {
            Role::Idle if attached => self.set_role(Role::Primary),
            Role::Primary if !attached => self.set_role(Role::Idle),
            Role::Secondary if attached => self.set_role(Role::Primary),
            Role::Secondary => {
                self.rounds_without_announce += 1;
                if self.rounds_without_announce > IDLE_ROUNDS {
                    self.set_role(Role::Idle);
                }
            }
            _ => {}
        }

        match self.role {
            Role::Idle => out.link_send(ANNOUNCE_IDLE | self.side as u8),
            Role::Primary => out.link_send(ANNOUNCE_PRIMARY | self.side as u8),
            Role::Secondary => {}
        }
        self.show(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;
    use std::vec::Vec;

    #[derive(Default)]
    struct Capture {
        reports: Vec<HidReport>,
        link: Vec<u8>,
        leds: Vec<RenderState>,
        attached: bool,
    }

    impl Emit for Capture {
        fn report(&mut self, report: HidReport) {
            self.reports.push(report);
        }

        fn link_send(&mut self, byte: u8) {
            self.link.push(byte);
        }

        fn set_leds(&mut self, state: RenderState) {
            self.leds.push(state);
        }

        fn host_attached(&self) -> bool {
            self.attached
        }

        fn link_present(&self) -> bool {
            true
        }
    }

    fn key(row: u8, col: u8, pressed: bool) -> ScanEvent {
        ScanEvent::new(row, col, pressed, 0)
    }

    fn primary(side: Side) -> (RawStenoEngine, Capture) {
        let mut engine = RawStenoEngine::new(side, 5);
        let mut out = Capture {
            attached: true,
            ..Capture::default()
        };
        engine.housekeeping(0, &mut out);
        assert_eq!(engine.role(), Role::Primary);
        out.link.clear();
        (engine, out)
    }

    #[test]
    fn test_stroke_text() {
        assert_eq!(Stroke(1 << 21 | 1 << 20).to_string(), "ST");
        assert_eq!(Stroke(1 << 20 | 1 << 3).to_string(), "T-T");
        assert_eq!(Stroke(1 << 14 | 1 << 3).to_string(), "AT");
        assert_eq!(Stroke(Stroke::NUM | 1 << 21).to_string(), "#S");
        assert_eq!(Stroke(1 << 12).to_string(), "*");
        assert_eq!(Stroke(1 << 0).to_string(), "-Z");
    }

    #[test]
    fn test_typing_stroke_text() {
        let mut out = Capture::default();
        type_stroke(Stroke(1 << 18 | 1 << 7), &mut out);
        assert_eq!(
            out.reports,
            [
                HidReport::key(MOD_LEFT_SHIFT, 0x13),
                HidReport::key(0, 0x2d),
                HidReport::key(MOD_LEFT_SHIFT, 0x13),
                HidReport::key(0, 0x2c),
                HidReport::RELEASE,
            ]
        );

        out.reports.clear();
        type_stroke(Stroke(Stroke::NUM | 1 << 12), &mut out);
        assert_eq!(
            out.reports,
            [
                HidReport::key(MOD_LEFT_SHIFT, 0x20),
                HidReport::key(MOD_LEFT_SHIFT, 0x25),
                HidReport::key(0, 0x2c),
                HidReport::RELEASE,
            ]
        );
    }

    #[test]
    fn test_stroke_completes_when_all_keys_released() {
        let (mut engine, mut out) = primary(Side::Left);

        // S (row 2, col 2) and T (row 1, col 4).
        engine.on_event(&key(2, 2, true), &mut out);
        engine.on_event(&key(1, 4, true), &mut out);
        engine.on_event(&key(2, 2, false), &mut out);
        assert!(out.reports.is_empty());

        engine.on_event(&key(1, 4, false), &mut out);
        assert_eq!(engine.strokes(), 1);
        assert_eq!(
            out.reports,
            [
                HidReport::key(MOD_LEFT_SHIFT, 0x16),
                HidReport::key(MOD_LEFT_SHIFT, 0x17),
                HidReport::key(0, 0x2c),
                HidReport::RELEASE,
            ]
        );
    }

    #[test]
    fn test_duplicate_key_positions_share_a_bit() {
        let (mut engine, mut out) = primary(Side::Left);

        // Both '^' keys down, one released: the stroke is still open.
        engine.on_event(&key(0, 3, true), &mut out);
        engine.on_event(&key(0, 4, true), &mut out);
        engine.on_event(&key(0, 3, false), &mut out);
        assert_eq!(engine.strokes(), 0);
        engine.on_event(&key(0, 4, false), &mut out);
        assert_eq!(engine.strokes(), 1);
        assert_eq!(out.reports[0], HidReport::key(MOD_LEFT_SHIFT, 0x23));
    }

    #[test]
    fn test_idle_ignores_keys_and_announces() {
        let mut engine = RawStenoEngine::new(Side::Right, 5);
        let mut out = Capture::default();

        engine.on_event(&key(0, 0, true), &mut out);
        engine.on_event(&key(0, 0, false), &mut out);
        engine.housekeeping(0, &mut out);

        assert!(out.reports.is_empty());
        assert_eq!(engine.role(), Role::Idle);
        assert_eq!(out.link, [ANNOUNCE_IDLE | 1]);
        assert_eq!(out.leds, [RenderState::all(&INIT_INDICATOR)]);
    }

    #[test]
    fn test_secondary_forwards_and_times_out() {
        let mut engine = RawStenoEngine::new(Side::Right, 5);
        let mut out = Capture::default();

        engine.on_link_byte(ANNOUNCE_PRIMARY | Side::Left as u8, &mut out);
        assert_eq!(engine.role(), Role::Secondary);

        engine.on_event(&key(1, 2, true), &mut out);
        engine.on_event(&key(1, 2, false), &mut out);
        assert_eq!(out.link, [KEY_PRESSED | 7, 7]);
        assert!(out.reports.is_empty());

        for _ in 0..IDLE_ROUNDS {
            engine.housekeeping(0, &mut out);
            assert_eq!(engine.role(), Role::Secondary);
        }
        engine.housekeeping(0, &mut out);
        assert_eq!(engine.role(), Role::Idle);
    }

    #[test]
    fn test_primary_combines_both_halves() {
        let (mut engine, mut out) = primary(Side::Left);

        // Left S, right -Z (local index 14).
        engine.on_event(&key(2, 2, true), &mut out);
        engine.on_link_byte(KEY_PRESSED | 14, &mut out);
        engine.on_event(&key(2, 2, false), &mut out);
        assert_eq!(engine.strokes(), 0);
        engine.on_link_byte(14, &mut out);

        assert_eq!(engine.strokes(), 1);
        assert_eq!(
            out.reports[..3],
            [
                HidReport::key(MOD_LEFT_SHIFT, 0x16),
                HidReport::key(0, 0x2d),
                HidReport::key(MOD_LEFT_SHIFT, 0x1d),
            ]
        );
        assert_eq!(
            out.leds.last(),
            Some(&RenderState::all(&STENO_RAW_INDICATOR))
        );
    }

    #[test]
    fn test_primary_announces_and_drops_on_detach() {
        let (mut engine, mut out) = primary(Side::Left);
        engine.housekeeping(0, &mut out);
        assert_eq!(out.link, [ANNOUNCE_PRIMARY]);

        out.attached = false;
        engine.housekeeping(0, &mut out);
        assert_eq!(engine.role(), Role::Idle);
    }

    #[test]
    fn test_out_of_range_positions_ignored() {
        let (mut engine, mut out) = primary(Side::Left);
        engine.on_event(&key(3, 0, true), &mut out);
        engine.on_event(&key(3, 0, false), &mut out);
        engine.on_link_byte(KEY_PRESSED | 20, &mut out);
        engine.on_link_byte(20, &mut out);
        assert!(out.reports.is_empty());
        assert_eq!(engine.strokes(), 0);
    }
}

//! GBA MPlay song model and encoding tables

pub mod pattern;
pub mod writer;

/// Modulation target of the engine's LFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModType {
    Vib,
    Tre,
    Pan,
}

impl ModType {
    pub fn from_raw(value: u8) -> Self {
        match value {
            0 => ModType::Vib,
            1 => ModType::Tre,
            _ => ModType::Pan,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ModType::Vib => "mod_vib",
            ModType::Tre => "mod_tre",
            ModType::Pan => "mod_pan",
        }
    }
}

/// One engine track event. Signed payloads are already biased to the
/// engine's range; note lengths are raw tick counts, decomposed into
/// base length and gate time only at emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgbEvent {
    Wait(u32),
    LoopStart,
    LoopEnd,
    Prio(u8),
    /// Half the BPM, the engine's tempo byte.
    Tempo(u8),
    Keysh(i8),
    Voice(u8),
    Vol(u8),
    Pan(i8),
    Bend(i8),
    Bendr(u8),
    Lfos(u8),
    Lfodl(u8),
    Mod(u8),
    Modt(ModType),
    Tune(i8),
    Xcmd { op: u8, par: u8 },
    Eot { key: u8 },
    Tie { key: u8, velocity: u8 },
    Note { len: u8, key: u8, velocity: u8 },
}

impl AgbEvent {
    /// Worst-case encoded size, used by the pattern-size heuristic.
    pub fn byte_len(&self) -> u32 {
        match self {
            AgbEvent::LoopStart => 0,
            AgbEvent::Wait(..) => 1,
            AgbEvent::LoopEnd => 5,
            AgbEvent::Note { .. } => 4,
            AgbEvent::Tie { .. } | AgbEvent::Xcmd { .. } => 3,
            _ => 2,
        }
    }
}

/// How a bar is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarKind {
    /// Written in place.
    Inline,
    /// Written in place under a label, closed with PEND; other bars call it.
    Origin,
    /// Replaced by a PATT call to an earlier identical bar.
    Call { track: usize, bar: usize },
}

#[derive(Debug, Clone)]
pub struct AgbBar {
    pub events: Vec<AgbEvent>,
    pub kind: BarKind,
}

impl AgbBar {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            kind: BarKind::Inline,
        }
    }

    pub fn byte_len(&self) -> u32 {
        self.events.iter().map(AgbEvent::byte_len).sum()
    }

    pub fn has_loop_marker(&self) -> bool {
        self.events
            .iter()
            .any(|ev| matches!(ev, AgbEvent::LoopStart | AgbEvent::LoopEnd))
    }
}

impl Default for AgbBar {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgbTrack {
    pub bars: Vec<AgbBar>,
}

#[derive(Debug, Clone, Default)]
pub struct AgbSong {
    pub tracks: Vec<AgbTrack>,
}

/// Wait and note lengths the engine encodes directly. Lengths up to 24
/// are exact; longer ones snap down to the nearest entry, leaving a
/// remainder of at most 3 ticks.
const LEN_TABLE: [u8; 97] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, //
    10, 11, 12, 13, 14, 15, 16, 17, 18, 19, //
    20, 21, 22, 23, 24, 24, 24, 24, 28, 28, //
    30, 30, 32, 32, 32, 32, 36, 36, 36, 36, //
    40, 40, 42, 42, 44, 44, 44, 44, 48, 48, //
    48, 48, 52, 52, 54, 54, 56, 56, 56, 56, //
    60, 60, 60, 60, 64, 64, 66, 66, 68, 68, //
    68, 68, 72, 72, 72, 72, 76, 76, 78, 78, //
    80, 80, 80, 80, 84, 84, 84, 84, 88, 88, //
    90, 90, 92, 92, 92, 92, 96,
];

/// Largest directly representable length not exceeding `len` (0..=96).
pub fn quantize_len(len: u8) -> u8 {
    LEN_TABLE[usize::from(len)]
}

/// Engine tempo byte: half the BPM, rounded.
pub fn tempo_byte(us_per_beat: u32) -> u8 {
    (30_000_000.0 / f64::from(us_per_beat.max(1)))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Engine bend byte: the 14-bit pitch value scaled to a signed byte.
pub fn bend_byte(value: i16) -> i8 {
    (f64::from(value) / 128.0).round().clamp(-64.0, 63.0) as i8
}

/// Assembler spelling of a MIDI key, e.g. 60 is "Cn3".
pub fn note_name(key: u8) -> String {
    const NAMES: [&str; 12] = [
        "Cn", "Cs", "Dn", "Ds", "En", "Fn", "Fs", "Gn", "Gs", "An", "As", "Bn",
    ];
    const OCTAVES: [&str; 11] = ["M2", "M1", "0", "1", "2", "3", "4", "5", "6", "7", "8"];
    format!(
        "{}{}",
        NAMES[usize::from(key % 12)],
        OCTAVES[usize::from(key / 12)]
    )
}

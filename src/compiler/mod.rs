//! MIDI to MPlay compiler - the multi-pass lowering pipeline
//!
//! Each pass mutates the score in place and establishes the invariants
//! the next pass consumes, in this order: event interpretation, track
//! pruning, volume filtering, loop state restoration, redundancy
//! elimination, bar lowering, note order fixup, pattern deduplication.

pub mod filter;
pub mod interpret;
pub mod looprestore;
pub mod lower;
pub mod prune;
pub mod redundancy;

use crate::agb::pattern;
use crate::agb::writer::AsmWriter;
use crate::error::Result;
use crate::midi::{load, MidiScore};
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// All CLI-derived settings, passed through the passes explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Assembler symbol prefix for the song.
    pub symbol: String,
    /// Voicegroup symbol referenced by the song table.
    pub voicegroup: String,
    /// Master volume 0..=128.
    pub master_volume: u8,
    pub priority: u8,
    pub reverb: u8,
    /// Perceptual (gamma 10/6) volume and velocity curve.
    pub natural_volume: bool,
    /// Emit gtp bytes so note gate times are exact.
    pub exact_gate: bool,
    /// CLI defaults for the corresponding `*_global` directives.
    pub modt: Option<u8>,
    pub mod_scale: f64,
    pub lfos: Option<u8>,
    pub lfodl: Option<u8>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: "song".to_string(),
            voicegroup: "voicegroup000".to_string(),
            master_volume: 128,
            priority: 0,
            reverb: 0,
            natural_volume: false,
            exact_gate: false,
            modt: None,
            mod_scale: 1.0,
            lfos: None,
            lfodl: None,
        }
    }
}

pub struct Compiler {
    settings: Settings,
}

impl Compiler {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Compile a MIDI file into an MPlay assembly file.
    pub fn compile_file(&self, input: &Path, output: &Path) -> Result<()> {
        let score = load::load_file(input)?;
        debug!("loaded {} tracks from {}", score.tracks.len(), input.display());
        let file = File::create(output)?;
        let mut out = BufWriter::new(file);
        self.compile(score, &mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Run the pass pipeline over `score` and write assembly to `out`.
    pub fn compile<W: Write>(&self, mut score: MidiScore, out: &mut W) -> Result<()> {
        let globals = interpret::run(&mut score, &self.settings);
        prune::run(&mut score);
        if score.tracks.is_empty() {
            log::warn!("no track carries notes, writing a header-only file");
            return AsmWriter::new(out, &self.settings).write_empty();
        }

        filter::run(&mut score, &self.settings, globals.mod_scale);
        looprestore::run(&mut score);
        redundancy::run(&mut score);

        let mut song = lower::run(&mut score)?;
        lower::fix_note_order(&mut song);
        let calls = pattern::dedupe(&mut song);
        debug!("deduplicated {calls} bars into pattern calls");

        AsmWriter::new(out, &self.settings).write_song(&song)
    }
}

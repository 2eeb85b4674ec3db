use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI file error: {0}")]
    Midi(#[from] midly::Error),

    #[error("SMPTE time division is not supported")]
    SmpteTimeDivision,

    #[error("note on at tick {tick} (key {key}) has no matching note off")]
    UnmatchedNoteOn { tick: u32, key: u8 },

    #[error("unexpected note off at tick {tick} (key {key})")]
    StrayNoteOff { tick: u32, key: u8 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Standard MIDI file loading

use crate::error::{Error, Result};
use crate::midi::{EventKind, MidiEvent, MidiScore, MidiTrack, NoteOffKind, TextClass};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

/// The GBA engine runs at 24 clocks per quarter note.
pub const TICKS_PER_QUARTER: u32 = 24;

/// Load an SMF file and re-time it to 24 ticks per quarter note.
pub fn load_file(path: &Path) -> Result<MidiScore> {
    let bytes = std::fs::read(path)?;
    let smf = Smf::parse(&bytes)?;
    let division = match smf.header.timing {
        Timing::Metrical(tpq) => u32::from(tpq.as_int()),
        Timing::Timecode(..) => return Err(Error::SmpteTimeDivision),
    };
    Ok(convert(&smf, division))
}

fn convert(smf: &Smf, division: u32) -> MidiScore {
    let mut score = MidiScore::default();
    for track in &smf.tracks {
        let mut out = MidiTrack::default();
        let mut tick = 0u64;
        for ev in track {
            tick += u64::from(ev.delta.as_int());
            if let Some(kind) = convert_kind(&ev.kind) {
                out.events.push(MidiEvent::new(retime(tick, division), kind));
            }
        }
        score.tracks.push(out);
    }
    score
}

/// Absolute tick at the file's division, re-timed to 24 tpq, round half up.
fn retime(tick: u64, division: u32) -> u32 {
    ((tick * u64::from(TICKS_PER_QUARTER) + u64::from(division / 2)) / u64::from(division)) as u32
}

fn convert_kind(kind: &TrackEventKind) -> Option<EventKind> {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match *message {
                // velocity 0 means note off by MIDI convention
                MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                    Some(EventKind::NoteOff {
                        channel,
                        key: key.as_int(),
                        kind: NoteOffKind::Init,
                    })
                }
                MidiMessage::NoteOn { key, vel } => Some(EventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                }),
                MidiMessage::NoteOff { key, .. } => Some(EventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    kind: NoteOffKind::Init,
                }),
                MidiMessage::Controller { controller, value } => {
                    Some(EventKind::Controller {
                        channel,
                        controller: controller.as_int(),
                        value: value.as_int(),
                    })
                }
                MidiMessage::ProgramChange { program } => Some(EventKind::Program {
                    channel,
                    program: program.as_int(),
                }),
                MidiMessage::PitchBend { bend } => Some(EventKind::PitchBend {
                    channel,
                    value: bend.as_int(),
                }),
                _ => None,
            }
        }
        TrackEventKind::Meta(meta) => match meta {
            MetaMessage::Tempo(us_per_beat) => Some(EventKind::Tempo {
                us_per_beat: us_per_beat.as_int(),
            }),
            MetaMessage::TimeSignature(num, denom_log2, _, _) => {
                Some(EventKind::TimeSignature {
                    num: *num,
                    denom_log2: *denom_log2,
                })
            }
            MetaMessage::Text(text) => Some(text_event(TextClass::Text, text)),
            MetaMessage::Marker(text) => Some(text_event(TextClass::Marker, text)),
            MetaMessage::CuePoint(text) => Some(text_event(TextClass::CuePoint, text)),
            _ => None,
        },
        _ => None,
    }
}

fn text_event(class: TextClass, raw: &[u8]) -> EventKind {
    EventKind::Text {
        class,
        text: String::from_utf8_lossy(raw).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retime_identity() {
        assert_eq!(retime(0, 24), 0);
        assert_eq!(retime(96, 24), 96);
    }

    #[test]
    fn test_retime_common_divisions() {
        // one quarter note is 24 ticks regardless of the input division
        assert_eq!(retime(480, 480), 24);
        assert_eq!(retime(960, 960), 24);
        assert_eq!(retime(192, 96), 48);
    }

    #[test]
    fn test_retime_rounds_half_up() {
        // 10 ticks at 480 tpq = 0.5 ticks at 24 tpq
        assert_eq!(retime(10, 480), 1);
        assert_eq!(retime(9, 480), 0);
    }
}

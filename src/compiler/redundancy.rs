//! Redundant controller elimination
//!
//! Events equal to the running value of their stream, or shadowed by a
//! later event of the same stream at the same tick, are retired into
//! dummies. Comparison happens on encoded values so the pass drops
//! exactly what the emitter would have emitted twice.

use crate::agb::{bend_byte, tempo_byte};
use crate::midi::{cc, EventKind, MidiScore, MidiTrack};

/// Running values per stream, in encoded space. The engine's power-on
/// state seeds the table; volume and voice are first-seen gated so a
/// track's initial value always survives.
struct Running {
    tempo: u8,
    voice: u8,
    voice_seen: bool,
    volume: u8,
    volume_seen: bool,
    pan: u8,
    bend: i8,
    bendr: u8,
    lfos: u8,
    lfodl: u8,
    modulation: u8,
    modt: u8,
    tune: u8,
    prio: u8,
}

impl Default for Running {
    fn default() -> Self {
        Self {
            tempo: 60,
            voice: 0,
            voice_seen: false,
            volume: 100,
            volume_seen: false,
            pan: 0x40,
            bend: 0,
            bendr: 2,
            lfos: 22,
            lfodl: 0,
            modulation: 0,
            modt: 0,
            tune: 0x40,
            prio: 0,
        }
    }
}

pub fn run(score: &mut MidiScore) {
    for track in &mut score.tracks {
        eliminate(track);
    }
}

fn eliminate(track: &mut MidiTrack) {
    let mut running = Running::default();

    for i in 0..track.events.len() {
        let shadowed = shadowed(track, i);
        let drop = match track.events[i].kind.clone() {
            EventKind::Tempo { us_per_beat } => {
                let enc = tempo_byte(us_per_beat);
                if shadowed || enc == running.tempo {
                    true
                } else {
                    running.tempo = enc;
                    false
                }
            }
            EventKind::Program { program, .. } => {
                if shadowed || (running.voice_seen && program == running.voice) {
                    true
                } else {
                    running.voice = program;
                    running.voice_seen = true;
                    false
                }
            }
            EventKind::PitchBend { value, .. } => {
                let enc = bend_byte(value);
                if shadowed || enc == running.bend {
                    true
                } else {
                    running.bend = enc;
                    false
                }
            }
            EventKind::Controller {
                controller, value, ..
            } => match controller {
                cc::LOOP => value != cc::LOOP_START && value != cc::LOOP_END,
                cc::VOLUME => {
                    if shadowed || (running.volume_seen && value == running.volume) {
                        true
                    } else {
                        running.volume = value;
                        running.volume_seen = true;
                        false
                    }
                }
                cc::PAN => update(&mut running.pan, value, shadowed),
                cc::BENDR => update(&mut running.bendr, value, shadowed),
                cc::LFOS => update(&mut running.lfos, value, shadowed),
                cc::LFODL => update(&mut running.lfodl, value, shadowed),
                cc::MOD => update(&mut running.modulation, value, shadowed),
                cc::MODT => update(&mut running.modt, value, shadowed),
                cc::TUNE => update(&mut running.tune, value, shadowed),
                cc::PRIO => update(&mut running.prio, value, shadowed),
                // unknown controller streams carry nothing downstream
                _ => true,
            },
            // leftover text events have no recognised directive
            EventKind::Text { .. } => true,
            // time signatures, notes and dummies pass through
            _ => false,
        };

        if drop {
            track.events[i].kind = EventKind::Dummy;
        }
    }
}

fn update(slot: &mut u8, value: u8, shadowed: bool) -> bool {
    if shadowed || value == *slot {
        true
    } else {
        *slot = value;
        false
    }
}

/// A later event of the same stream at the same tick makes this one
/// inaudible.
fn shadowed(track: &MidiTrack, i: usize) -> bool {
    let Some(key) = stream_key(&track.events[i].kind) else {
        return false;
    };
    let tick = track.events[i].tick;
    track.events[i + 1..]
        .iter()
        .take_while(|ev| ev.tick == tick)
        .any(|ev| stream_key(&ev.kind) == Some(key))
}

/// Identity of the control stream an event belongs to.
fn stream_key(kind: &EventKind) -> Option<(u8, u8)> {
    match *kind {
        EventKind::Tempo { .. } => Some((0, 0)),
        EventKind::Program { .. } => Some((1, 0)),
        EventKind::PitchBend { .. } => Some((2, 0)),
        EventKind::Controller { controller, .. } => Some((3, controller)),
        _ => None,
    }
}

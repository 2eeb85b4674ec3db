//! Loop state restoration
//!
//! The playback engine jumps back to the loop label without restoring
//! any channel state, so the controller state in effect at the loop
//! start is re-emitted just before the loop end.

use crate::midi::{cc, EventKind, MidiEvent, MidiScore, MidiTrack};

/// Running controller state, snapshotted while the scan is still at or
/// before the loop start tick.
#[derive(Debug, Clone)]
struct LoopState {
    tempo: u32,
    voice: u8,
    volume: u8,
    pan: u8,
    bend: i16,
    bendr: u8,
    modulation: u8,
    modt: u8,
    tune: u8,
    prio: u8,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            tempo: 500_000,
            voice: 0,
            volume: 100,
            pan: 0x40,
            bend: 0,
            bendr: 2,
            modulation: 0,
            modt: 0,
            tune: 0x40,
            prio: 0,
        }
    }
}

impl LoopState {
    fn observe(&mut self, kind: &EventKind) {
        match *kind {
            EventKind::Tempo { us_per_beat } => self.tempo = us_per_beat,
            EventKind::Program { program, .. } => self.voice = program,
            EventKind::PitchBend { value, .. } => self.bend = value,
            EventKind::Controller {
                controller, value, ..
            } => match controller {
                cc::VOLUME => self.volume = value,
                cc::PAN => self.pan = value,
                cc::BENDR => self.bendr = value,
                cc::MOD => self.modulation = value,
                cc::MODT => self.modt = value,
                cc::TUNE => self.tune = value,
                cc::PRIO => self.prio = value,
                _ => {}
            },
            _ => {}
        }
    }
}

pub fn run(score: &mut MidiScore) {
    for track in &mut score.tracks {
        restore_track(track);
    }
}

fn restore_track(track: &mut MidiTrack) {
    let Some(channel) = track.first_channel() else {
        return;
    };
    let mut state = LoopState::default();
    let mut loop_start_tick = u32::MAX;

    let mut i = 0;
    while i < track.events.len() {
        let tick = track.events[i].tick;

        if let EventKind::Controller {
            controller: cc::LOOP,
            value,
            ..
        } = track.events[i].kind
        {
            if value == cc::LOOP_START {
                loop_start_tick = tick;
            } else if value == cc::LOOP_END && tick > loop_start_tick {
                let block = restore_events(&state, channel, tick);
                let len = block.len();
                track.events.splice(i..i, block);
                // skip the inserted block and the loop end itself
                i += len + 1;
                continue;
            }
            i += 1;
            continue;
        }

        if tick <= loop_start_tick {
            state.observe(&track.events[i].kind);
        }
        i += 1;
    }
}

fn restore_events(state: &LoopState, channel: u8, tick: u32) -> Vec<MidiEvent> {
    let ctrl = |controller, value| {
        MidiEvent::new(
            tick,
            EventKind::Controller {
                channel,
                controller,
                value,
            },
        )
    };
    vec![
        MidiEvent::new(
            tick,
            EventKind::Tempo {
                us_per_beat: state.tempo,
            },
        ),
        MidiEvent::new(
            tick,
            EventKind::Program {
                channel,
                program: state.voice,
            },
        ),
        ctrl(cc::VOLUME, state.volume),
        ctrl(cc::PAN, state.pan),
        MidiEvent::new(
            tick,
            EventKind::PitchBend {
                channel,
                value: state.bend,
            },
        ),
        ctrl(cc::BENDR, state.bendr),
        ctrl(cc::MOD, state.modulation),
        ctrl(cc::MODT, state.modt),
        ctrl(cc::TUNE, state.tune),
        ctrl(cc::PRIO, state.prio),
    ]
}

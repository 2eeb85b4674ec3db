//! Bar lowering
//!
//! Partitions the flat event streams into bars along the time signature
//! schedule, translates each MIDI event into its engine counterpart and
//! pairs notes into bounded notes or tie/EOT pairs. The first track is
//! the timing master; all tracks share its bar table.

use crate::agb::{bend_byte, tempo_byte, AgbBar, AgbEvent, AgbSong, AgbTrack, ModType};
use crate::error::{Error, Result};
use crate::midi::{cc, EventKind, MidiScore, MidiTrack, NoteOffKind};

/// Ticks in a default 4/4 bar.
const DEFAULT_BAR_LEN: u32 = 96;

/// Longest length a single NOTE can carry; longer notes become ties.
const MAX_NOTE_LEN: u32 = 96;

/// Tick capacity of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSpan {
    pub num_ticks: u32,
}

pub fn run(score: &mut MidiScore) -> Result<AgbSong> {
    let table = bar_table(&score.tracks[0]);
    let mut song = AgbSong::default();
    for track in &mut score.tracks {
        song.tracks.push(lower_track(track, &table)?);
    }
    Ok(song)
}

/// Build the bar table from the timing master track.
fn bar_table(track: &MidiTrack) -> Vec<BarSpan> {
    let mut bars = Vec::new();
    let mut bar_len = DEFAULT_BAR_LEN;
    let mut num_ticks = 0u32;
    let mut prev_tick = 0u32;

    for ev in &track.events {
        num_ticks += ev.tick - prev_tick;
        prev_tick = ev.tick;
        while num_ticks >= bar_len {
            bars.push(BarSpan { num_ticks: bar_len });
            num_ticks -= bar_len;
        }
        if let EventKind::TimeSignature { num, denom_log2 } = ev.kind {
            bar_len = (u32::from(num) * 96) >> u32::from(denom_log2).min(31);
            if bar_len == 0 {
                bar_len = DEFAULT_BAR_LEN;
            }
            if num_ticks > 0 {
                // a mid-bar signature change cuts the bar short
                bars.push(BarSpan { num_ticks });
                num_ticks = 0;
            }
        }
    }

    // the tail bar is padded to a full bar so every track can flush to it
    bars.push(BarSpan { num_ticks: bar_len });
    bars
}

fn lower_track(track: &mut MidiTrack, table: &[BarSpan]) -> Result<AgbTrack> {
    let mut bars: Vec<AgbBar> = table.iter().map(|_| AgbBar::new()).collect();
    let mut cur_bar = 0usize;
    let mut bar_start = 0u32;
    let mut tick_counter = 0u32;

    let last = track.events.len().saturating_sub(1);
    for i in 0..track.events.len() {
        let tick = track.events[i].tick;
        let silent = matches!(
            track.events[i].kind,
            EventKind::Dummy | EventKind::TimeSignature { .. }
        );
        // dummies are skipped, except the final one: it flushes the
        // waits up to the common end tick
        if silent && i != last {
            continue;
        }

        let mut ticks_to_event = tick - (bar_start + tick_counter);
        while cur_bar + 1 < table.len()
            && ticks_to_event >= table[cur_bar].num_ticks - tick_counter
        {
            let fill = table[cur_bar].num_ticks - tick_counter;
            if fill > 0 {
                bars[cur_bar].events.push(AgbEvent::Wait(fill));
            }
            bar_start += table[cur_bar].num_ticks;
            cur_bar += 1;
            tick_counter = 0;
            ticks_to_event = tick - bar_start;
        }
        if ticks_to_event > 0 {
            bars[cur_bar].events.push(AgbEvent::Wait(ticks_to_event));
            tick_counter += ticks_to_event;
        }

        if silent {
            continue;
        }
        if let Some(ev) = translate(track, i)? {
            bars[cur_bar].events.push(ev);
        }
    }

    // fill the rest of the final bar
    let fill = table[cur_bar].num_ticks - tick_counter;
    if fill > 0 {
        bars[cur_bar].events.push(AgbEvent::Wait(fill));
    }

    Ok(AgbTrack { bars })
}

fn translate(track: &mut MidiTrack, i: usize) -> Result<Option<AgbEvent>> {
    let tick = track.events[i].tick;
    let ev = match track.events[i].kind.clone() {
        EventKind::Tempo { us_per_beat } => Some(AgbEvent::Tempo(tempo_byte(us_per_beat))),
        EventKind::Program { program, .. } => Some(AgbEvent::Voice(program)),
        EventKind::PitchBend { value, .. } => Some(AgbEvent::Bend(bend_byte(value))),
        EventKind::Controller {
            controller, value, ..
        } => match controller {
            cc::VOLUME => Some(AgbEvent::Vol(value)),
            cc::PAN => Some(AgbEvent::Pan((i16::from(value) - 64) as i8)),
            cc::MOD => Some(AgbEvent::Mod(value)),
            cc::BENDR => Some(AgbEvent::Bendr(value)),
            cc::LFOS => Some(AgbEvent::Lfos(value)),
            cc::LFODL => Some(AgbEvent::Lfodl(value)),
            cc::MODT => Some(AgbEvent::Modt(ModType::from_raw(value))),
            cc::TUNE => Some(AgbEvent::Tune((i16::from(value) - 64) as i8)),
            cc::PRIO => Some(AgbEvent::Prio(value)),
            cc::LOOP if value == cc::LOOP_START => Some(AgbEvent::LoopStart),
            cc::LOOP if value == cc::LOOP_END => Some(AgbEvent::LoopEnd),
            _ => None,
        },
        EventKind::NoteOn { key, velocity, .. } => Some(pair_note(track, i, key, velocity)?),
        EventKind::NoteOff { key, kind, .. } => match kind {
            NoteOffKind::Init => return Err(Error::StrayNoteOff { tick, key }),
            NoteOffKind::Tie => Some(AgbEvent::Eot { key }),
            NoteOffKind::Short => None,
        },
        EventKind::Text { .. } | EventKind::TimeSignature { .. } | EventKind::Dummy => None,
    };
    Ok(ev)
}

/// Find the matching note off and decide between a bounded note and a
/// tie. The note off is marked so its own translation emits the right
/// thing (nothing, or an EOT).
fn pair_note(track: &mut MidiTrack, i: usize, key: u8, velocity: u8) -> Result<AgbEvent> {
    let on_tick = track.events[i].tick;
    for j in i + 1..track.events.len() {
        let off_tick = track.events[j].tick;
        if let EventKind::NoteOff {
            key: off_key, kind, ..
        } = &mut track.events[j].kind
        {
            if *off_key == key && *kind == NoteOffKind::Init {
                let len = off_tick - on_tick;
                if len > MAX_NOTE_LEN {
                    *kind = NoteOffKind::Tie;
                    return Ok(AgbEvent::Tie { key, velocity });
                }
                *kind = NoteOffKind::Short;
                return Ok(AgbEvent::Note {
                    len: len.max(1) as u8,
                    key,
                    velocity,
                });
            }
        }
    }
    Err(Error::UnmatchedNoteOn { tick: on_tick, key })
}

/// Rotate every EOT to the front of its tick position so voice releases
/// happen before allocations; the channel allocator is non-preemptive.
pub fn fix_note_order(song: &mut AgbSong) {
    for track in &mut song.tracks {
        for bar in &mut track.bars {
            let mut first_at_tick = 0usize;
            for i in 0..bar.events.len() {
                match bar.events[i] {
                    AgbEvent::Wait(..) => first_at_tick = i + 1,
                    AgbEvent::Eot { .. } => {
                        if i > first_at_tick {
                            bar.events[first_at_tick..=i].rotate_right(1);
                        }
                        first_at_tick += 1;
                    }
                    _ => {}
                }
            }
        }
    }
}

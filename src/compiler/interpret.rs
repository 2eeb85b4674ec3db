//! Event interpreter
//!
//! Rewrites text-class directives and bend-range RPN sequences into
//! synthetic controller events in the private controller namespace,
//! records the loop region, and inserts per-track defaults so every
//! track enters lowering with the same shape.

use crate::compiler::Settings;
use crate::midi::{cc, EventKind, MidiEvent, MidiScore, MidiTrack, NoteOffKind};
use log::{debug, warn};

/// The null RPN selection; data entry only maps to bend range while the
/// running RPN pair is (0, 0).
const RPN_NONE: u8 = 0x7f;

/// Global state collected from `*_global` directives and the CLI.
pub struct Globals {
    pub mod_scale: f64,
}

struct Interp {
    loop_start: Option<u32>,
    loop_end: Option<u32>,
    modt: Option<u8>,
    lfos: Option<u8>,
    lfodl: Option<u8>,
    mod_scale: f64,
}

pub fn run(score: &mut MidiScore, settings: &Settings) -> Globals {
    let mut st = Interp {
        loop_start: None,
        loop_end: None,
        modt: settings.modt,
        lfos: settings.lfos,
        lfodl: settings.lfodl,
        mod_scale: settings.mod_scale,
    };

    for track in &mut score.tracks {
        interpret_track(track, &mut st);
    }

    let max_tick = score.max_tick();
    for track in &mut score.tracks {
        insert_track_events(track, &st, max_tick);
    }

    Globals {
        mod_scale: st.mod_scale,
    }
}

fn interpret_track(track: &mut MidiTrack, st: &mut Interp) {
    let channel = track.first_channel();
    let mut rpn_msb = RPN_NONE;
    let mut rpn_lsb = RPN_NONE;

    for i in 0..track.events.len() {
        let tick = track.events[i].tick;
        match track.events[i].kind.clone() {
            EventKind::Text { text, .. } => {
                if let Some(kind) = apply_directive(text.trim(), tick, channel, st) {
                    track.events[i].kind = kind;
                }
            }
            EventKind::Controller {
                channel: ev_channel,
                controller,
                value,
            } => match controller {
                cc::RPN_MSB => rpn_msb = value,
                cc::RPN_LSB => rpn_lsb = value,
                cc::DATA_ENTRY_MSB if rpn_msb == 0 && rpn_lsb == 0 => {
                    // RPN (0, 0) is pitch bend sensitivity
                    track.events[i].kind = EventKind::Controller {
                        channel: ev_channel,
                        controller: cc::BENDR,
                        value,
                    };
                }
                _ => {}
            },
            EventKind::NoteOff { .. } => {
                if let EventKind::NoteOff { kind, .. } = &mut track.events[i].kind {
                    *kind = NoteOffKind::Init;
                }
            }
            _ => {}
        }
    }
}

/// Interpret one text payload. `None` leaves the event untouched; a
/// recognised directive is consumed even when its value is unusable.
fn apply_directive(
    text: &str,
    tick: u32,
    channel: Option<u8>,
    st: &mut Interp,
) -> Option<EventKind> {
    match text {
        "[" | "loopStart" => {
            if st.loop_start.is_none() {
                st.loop_start = Some(tick);
            }
            return Some(EventKind::Dummy);
        }
        "]" | "loopEnd" => {
            if st.loop_end.is_none() {
                st.loop_end = Some(tick);
            }
            return Some(EventKind::Dummy);
        }
        _ => {}
    }

    let (key, value) = text.split_once('=')?;
    let (key, value) = (key.trim(), value.trim());

    let kind = match key {
        "modscale_global" => {
            if let Ok(f) = value.parse::<f64>() {
                st.mod_scale = clamp_f64("modscale_global", f, 0.0, 16.0);
            }
            EventKind::Dummy
        }
        "modt_global" => {
            if let Some(n) = parse_clamped(key, value, 0, 2) {
                st.modt = Some(n as u8);
            }
            EventKind::Dummy
        }
        "lfos_global" => {
            if let Some(n) = parse_clamped(key, value, 0, 127) {
                st.lfos = Some(n as u8);
            }
            EventKind::Dummy
        }
        "lfodl_global" => {
            if let Some(n) = parse_clamped(key, value, 0, 127) {
                st.lfodl = Some(n as u8);
            }
            EventKind::Dummy
        }
        "modt" => synth(channel, cc::MODT, parse_clamped(key, value, 0, 2)),
        "tune" => synth(
            channel,
            cc::TUNE,
            parse_clamped(key, value, -64, 63).map(|n| n + 64),
        ),
        "lfos" => synth(channel, cc::LFOS, parse_clamped(key, value, 0, 127)),
        "lfodl" => synth(channel, cc::LFODL, parse_clamped(key, value, 0, 127)),
        "prio" => synth(channel, cc::PRIO, parse_clamped(key, value, 0, 127)),
        _ => return None,
    };
    Some(kind)
}

/// Parse a directive value, clamping into range; clamping is silent by
/// design, the input is advisory.
fn parse_clamped(name: &str, value: &str, lo: i64, hi: i64) -> Option<i64> {
    match value.parse::<i64>() {
        Ok(n) => {
            let clamped = n.clamp(lo, hi);
            if clamped != n {
                warn!("{name}: {n} clamped to {clamped}");
            }
            Some(clamped)
        }
        Err(_) => {
            warn!("{name}: unparsable value '{value}', directive dropped");
            None
        }
    }
}

fn clamp_f64(name: &str, f: f64, lo: f64, hi: f64) -> f64 {
    let clamped = f.clamp(lo, hi);
    if clamped != f {
        warn!("{name}: {f} clamped to {clamped}");
    }
    clamped
}

/// A directive with no usable value or no channel to attach to is
/// consumed without effect.
fn synth(channel: Option<u8>, controller: u8, value: Option<i64>) -> EventKind {
    match (channel, value) {
        (Some(channel), Some(value)) => EventKind::Controller {
            channel,
            controller,
            value: value as u8,
        },
        (None, Some(_)) => {
            debug!("directive on a channel-less track dropped");
            EventKind::Dummy
        }
        (_, None) => EventKind::Dummy,
    }
}

fn insert_track_events(track: &mut MidiTrack, st: &Interp, max_tick: u32) {
    if let Some(channel) = track.first_channel() {
        let ctrl = |controller, value| {
            MidiEvent::new(
                0,
                EventKind::Controller {
                    channel,
                    controller,
                    value,
                },
            )
        };

        // default voice and volume go in front of whatever the file
        // already has at tick 0, so the first notes play under them
        let mut defaults: Vec<MidiEvent> = Vec::new();
        if !has_program(track) {
            defaults.push(MidiEvent::new(0, EventKind::Program { channel, program: 0 }));
        }
        if !has_volume(track) {
            defaults.push(ctrl(cc::VOLUME, 127));
        }
        track.events.splice(0..0, defaults);

        // globals land after the tick-0 events the file already has
        let global = |controller, value| EventKind::Controller {
            channel,
            controller,
            value,
        };
        if let Some(v) = st.modt {
            insert_after(track, 0, global(cc::MODT, v));
        }
        if let Some(v) = st.lfos {
            insert_after(track, 0, global(cc::LFOS, v));
        }
        if let Some(v) = st.lfodl {
            insert_after(track, 0, global(cc::LFODL, v));
        }

        if let (Some(start), Some(end)) = (st.loop_start, st.loop_end) {
            if end > start {
                // the start marker precedes concurrent state resets,
                // the end marker follows them
                insert_before(
                    track,
                    start,
                    EventKind::Controller {
                        channel,
                        controller: cc::LOOP,
                        value: cc::LOOP_START,
                    },
                );
                insert_after(
                    track,
                    end,
                    EventKind::Controller {
                        channel,
                        controller: cc::LOOP,
                        value: cc::LOOP_END,
                    },
                );
            }
        }
    } else {
        debug!("track without channel messages, skipping per-track defaults");
    }

    // every track ends at the same tick so the tail bars align
    insert_after(track, max_tick, EventKind::Dummy);
}

fn has_volume(track: &MidiTrack) -> bool {
    track.events.iter().any(|ev| {
        matches!(
            ev.kind,
            EventKind::Controller {
                controller: cc::VOLUME,
                ..
            }
        )
    })
}

fn has_program(track: &MidiTrack) -> bool {
    track
        .events
        .iter()
        .any(|ev| matches!(ev.kind, EventKind::Program { .. }))
}

fn insert_before(track: &mut MidiTrack, tick: u32, kind: EventKind) {
    let idx = track.lower_bound(tick);
    track.events.insert(idx, MidiEvent::new(tick, kind));
}

fn insert_after(track: &mut MidiTrack, tick: u32, kind: EventKind) {
    let idx = track.upper_bound(tick);
    track.events.insert(idx, MidiEvent::new(tick, kind));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::TextClass;

    fn marker(tick: u32, text: &str) -> MidiEvent {
        MidiEvent::new(
            tick,
            EventKind::Text {
                class: TextClass::Marker,
                text: text.to_string(),
            },
        )
    }

    fn note_pair(tick: u32, key: u8) -> Vec<MidiEvent> {
        vec![
            MidiEvent::new(
                tick,
                EventKind::NoteOn {
                    channel: 0,
                    key,
                    velocity: 100,
                },
            ),
            MidiEvent::new(
                tick + 24,
                EventKind::NoteOff {
                    channel: 0,
                    key,
                    kind: NoteOffKind::Init,
                },
            ),
        ]
    }

    fn score_of(events: Vec<MidiEvent>) -> MidiScore {
        MidiScore {
            tracks: vec![MidiTrack { events }],
        }
    }

    fn controllers(track: &MidiTrack) -> Vec<(u32, u8, u8)> {
        track
            .events
            .iter()
            .filter_map(|ev| match ev.kind {
                EventKind::Controller {
                    controller, value, ..
                } => Some((ev.tick, controller, value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_directive_becomes_private_controller() {
        let mut events = note_pair(0, 60);
        events.insert(0, marker(0, "modt=1"));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());

        let ctrls = controllers(&score.tracks[0]);
        assert!(ctrls.contains(&(0, cc::MODT, 1)));
        assert!(!score.tracks[0]
            .events
            .iter()
            .any(|ev| matches!(ev.kind, EventKind::Text { .. })));
    }

    #[test]
    fn test_tune_is_biased() {
        let mut events = note_pair(0, 60);
        events.insert(0, marker(0, "tune=-10"));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());
        assert!(controllers(&score.tracks[0]).contains(&(0, cc::TUNE, 54)));
    }

    #[test]
    fn test_directive_value_clamped() {
        let mut events = note_pair(0, 60);
        events.insert(0, marker(0, "modt=9"));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());
        assert!(controllers(&score.tracks[0]).contains(&(0, cc::MODT, 2)));
    }

    #[test]
    fn test_loop_markers_inserted() {
        let mut events = vec![marker(0, "[")];
        events.extend(note_pair(0, 60));
        events.push(marker(96, "]"));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());

        let track = &score.tracks[0];
        // the start marker comes before everything at its tick
        assert_eq!(
            track.events[0].kind,
            EventKind::Controller {
                channel: 0,
                controller: cc::LOOP,
                value: cc::LOOP_START
            }
        );
        assert!(controllers(track).contains(&(96, cc::LOOP, cc::LOOP_END)));
    }

    #[test]
    fn test_dangling_loop_start_ignored() {
        let mut events = vec![marker(0, "[")];
        events.extend(note_pair(0, 60));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());
        assert!(!controllers(&score.tracks[0])
            .iter()
            .any(|&(_, c, _)| c == cc::LOOP));
    }

    #[test]
    fn test_rpn_zero_maps_data_entry_to_bend_range() {
        let ctrl = |tick, controller, value| {
            MidiEvent::new(
                tick,
                EventKind::Controller {
                    channel: 0,
                    controller,
                    value,
                },
            )
        };
        let mut events = vec![
            ctrl(0, cc::RPN_MSB, 0),
            ctrl(0, cc::RPN_LSB, 0),
            ctrl(0, cc::DATA_ENTRY_MSB, 12),
        ];
        events.extend(note_pair(0, 60));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());
        assert!(controllers(&score.tracks[0]).contains(&(0, cc::BENDR, 12)));
    }

    #[test]
    fn test_data_entry_without_rpn_untouched() {
        let ctrl = |tick, controller, value| {
            MidiEvent::new(
                tick,
                EventKind::Controller {
                    channel: 0,
                    controller,
                    value,
                },
            )
        };
        let mut events = vec![ctrl(0, cc::DATA_ENTRY_MSB, 12)];
        events.extend(note_pair(0, 60));
        let mut score = score_of(events);
        run(&mut score, &Settings::default());
        assert!(controllers(&score.tracks[0]).contains(&(0, cc::DATA_ENTRY_MSB, 12)));
        assert!(!controllers(&score.tracks[0])
            .iter()
            .any(|&(_, c, _)| c == cc::BENDR));
    }

    #[test]
    fn test_default_voice_and_volume_inserted() {
        let mut score = score_of(note_pair(0, 60));
        run(&mut score, &Settings::default());
        let track = &score.tracks[0];
        assert!(track
            .events
            .iter()
            .any(|ev| ev.tick == 0 && ev.kind == EventKind::Program { channel: 0, program: 0 }));
        assert!(controllers(track).contains(&(0, cc::VOLUME, 127)));
    }

    #[test]
    fn test_tracks_end_at_common_tick() {
        let mut score = MidiScore {
            tracks: vec![
                MidiTrack {
                    events: note_pair(0, 60),
                },
                MidiTrack {
                    events: note_pair(0, 64)
                        .into_iter()
                        .chain(note_pair(96, 64))
                        .collect(),
                },
            ],
        };
        run(&mut score, &Settings::default());
        assert_eq!(score.tracks[0].last_tick(), 120);
        assert_eq!(score.tracks[1].last_tick(), 120);
    }

    #[test]
    fn test_globals_inserted_in_every_track() {
        let settings = Settings {
            lfos: Some(44),
            ..Settings::default()
        };
        let mut score = MidiScore {
            tracks: vec![
                MidiTrack {
                    events: note_pair(0, 60),
                },
                MidiTrack {
                    events: note_pair(0, 64),
                },
            ],
        };
        run(&mut score, &settings);
        for track in &score.tracks {
            assert!(controllers(track).contains(&(0, cc::LFOS, 44)));
        }
    }

    #[test]
    fn test_globals_follow_existing_tick_zero_events() {
        let settings = Settings {
            modt: Some(1),
            lfos: Some(44),
            ..Settings::default()
        };
        let mut events = vec![MidiEvent::new(
            0,
            EventKind::Program {
                channel: 0,
                program: 5,
            },
        )];
        events.extend(note_pair(0, 60));
        let mut score = score_of(events);
        run(&mut score, &settings);

        let track = &score.tracks[0];
        let pos = |pred: &dyn Fn(&EventKind) -> bool| {
            track.events.iter().position(|ev| pred(&ev.kind)).unwrap()
        };
        let program = pos(&|k| matches!(k, EventKind::Program { program: 5, .. }));
        let note_on = pos(&|k| matches!(k, EventKind::NoteOn { .. }));
        let modt = pos(&|k| {
            matches!(
                k,
                EventKind::Controller {
                    controller: cc::MODT,
                    ..
                }
            )
        });
        let lfos = pos(&|k| {
            matches!(
                k,
                EventKind::Controller {
                    controller: cc::LFOS,
                    ..
                }
            )
        });

        // globals come after everything the file already had at tick 0,
        // MODT before LFOS
        assert!(program < modt && note_on < modt);
        assert!(modt < lfos);
    }

    #[test]
    fn test_modscale_global_directive() {
        let mut events = note_pair(0, 60);
        events.insert(0, marker(0, "modscale_global=2.5"));
        let mut score = score_of(events);
        let globals = run(&mut score, &Settings::default());
        assert_eq!(globals.mod_scale, 2.5);
    }
}

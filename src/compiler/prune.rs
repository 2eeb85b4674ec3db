//! Track pruning and meta hoisting
//!
//! Tempo and time signature events move onto the first surviving track
//! so it can serve as the timing master for bar construction; tracks
//! without notes are dropped.

use crate::midi::{EventKind, MidiEvent, MidiScore, MidiTrack};
use log::debug;

pub fn run(score: &mut MidiScore) {
    let mut tempos: Vec<MidiEvent> = Vec::new();
    let mut tsigs: Vec<MidiEvent> = Vec::new();

    for track in &mut score.tracks {
        for ev in &mut track.events {
            if matches!(
                ev.kind,
                EventKind::Tempo { .. } | EventKind::TimeSignature { .. }
            ) {
                let hoisted = std::mem::replace(&mut ev.kind, EventKind::Dummy);
                let queue = if matches!(hoisted, EventKind::Tempo { .. }) {
                    &mut tempos
                } else {
                    &mut tsigs
                };
                queue.push(MidiEvent::new(ev.tick, hoisted));
            }
        }
    }

    // sort_by_key is stable, file order survives at equal ticks
    tempos.sort_by_key(|ev| ev.tick);
    tsigs.sort_by_key(|ev| ev.tick);

    // time signatures at the same tick collapse, last wins
    tsigs.dedup_by(|cur, prev| {
        if cur.tick == prev.tick {
            *prev = cur.clone();
            true
        } else {
            false
        }
    });

    let before = score.tracks.len();
    score.tracks.retain(MidiTrack::has_note_on);
    debug!("pruned {} of {before} tracks", before - score.tracks.len());

    let Some(first) = score.tracks.first_mut() else {
        return;
    };
    merge_sorted(first, tempos);
    merge_sorted(first, tsigs);
}

/// Lower-bound merge that keeps queue order at equal ticks.
fn merge_sorted(track: &mut MidiTrack, queue: Vec<MidiEvent>) {
    let mut min_idx = 0usize;
    for ev in queue {
        let idx = track.lower_bound(ev.tick).max(min_idx);
        track.events.insert(idx, ev);
        min_idx = idx + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::NoteOffKind;

    fn note_on(tick: u32) -> MidiEvent {
        MidiEvent::new(
            tick,
            EventKind::NoteOn {
                channel: 0,
                key: 60,
                velocity: 100,
            },
        )
    }

    fn note_off(tick: u32) -> MidiEvent {
        MidiEvent::new(
            tick,
            EventKind::NoteOff {
                channel: 0,
                key: 60,
                kind: NoteOffKind::Init,
            },
        )
    }

    fn tempo(tick: u32, us_per_beat: u32) -> MidiEvent {
        MidiEvent::new(tick, EventKind::Tempo { us_per_beat })
    }

    #[test]
    fn test_noteless_tracks_dropped() {
        let mut score = MidiScore {
            tracks: vec![
                MidiTrack {
                    events: vec![tempo(0, 500_000)],
                },
                MidiTrack {
                    events: vec![note_on(0), note_off(24)],
                },
            ],
        };
        run(&mut score);
        assert_eq!(score.tracks.len(), 1);
        assert!(score.tracks[0].has_note_on());
    }

    #[test]
    fn test_tempo_hoisted_to_first_track() {
        let mut score = MidiScore {
            tracks: vec![
                MidiTrack {
                    events: vec![note_on(0), note_off(24)],
                },
                MidiTrack {
                    events: vec![tempo(12, 400_000), note_on(0), note_off(24)],
                },
            ],
        };
        run(&mut score);

        // track 0 received the tempo at its tick position
        assert!(score.tracks[0]
            .events
            .iter()
            .any(|ev| ev.tick == 12 && ev.kind == EventKind::Tempo { us_per_beat: 400_000 }));
        // the donor slot became a dummy
        assert!(score.tracks[1]
            .events
            .iter()
            .all(|ev| !matches!(ev.kind, EventKind::Tempo { .. })));
    }

    #[test]
    fn test_tempo_inserted_before_equal_tick_events() {
        let mut score = MidiScore {
            tracks: vec![MidiTrack {
                events: vec![note_on(0), note_off(24), tempo(24, 400_000)],
            }],
        };
        run(&mut score);
        let track = &score.tracks[0];
        let tempo_idx = track
            .events
            .iter()
            .position(|ev| matches!(ev.kind, EventKind::Tempo { .. }))
            .unwrap();
        let off_idx = track
            .events
            .iter()
            .position(|ev| matches!(ev.kind, EventKind::NoteOff { .. }))
            .unwrap();
        assert!(tempo_idx < off_idx);
    }

    #[test]
    fn test_time_signature_last_wins_at_equal_tick() {
        let tsig = |tick, num| {
            MidiEvent::new(
                tick,
                EventKind::TimeSignature {
                    num,
                    denom_log2: 2,
                },
            )
        };
        let mut score = MidiScore {
            tracks: vec![MidiTrack {
                events: vec![tsig(0, 3), tsig(0, 4), note_on(0), note_off(24)],
            }],
        };
        run(&mut score);
        let sigs: Vec<u8> = score.tracks[0]
            .events
            .iter()
            .filter_map(|ev| match ev.kind {
                EventKind::TimeSignature { num, .. } => Some(num),
                _ => None,
            })
            .collect();
        assert_eq!(sigs, vec![4]);
    }

    #[test]
    fn test_all_tracks_pruned_leaves_empty_score() {
        let mut score = MidiScore {
            tracks: vec![MidiTrack {
                events: vec![tempo(0, 500_000)],
            }],
        };
        run(&mut score);
        assert!(score.tracks.is_empty());
    }
}

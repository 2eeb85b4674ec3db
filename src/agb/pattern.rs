//! Bar pattern deduplication

use crate::agb::{AgbBar, AgbEvent, AgbSong, BarKind};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A PATT call costs five bytes, so smaller bars are not worth calling.
const MIN_PATTERN_BYTES: u32 = 5;

/// Replace repeated bars by calls to their first occurrence.
///
/// Returns the number of bars turned into calls.
pub fn dedupe(song: &mut AgbSong) -> usize {
    let mut seen: HashMap<Vec<AgbEvent>, (usize, usize)> = HashMap::new();
    let mut calls = 0;

    for ti in 0..song.tracks.len() {
        for bi in 0..song.tracks[ti].bars.len() {
            if !is_candidate(&song.tracks[ti].bars[bi]) {
                continue;
            }
            match seen.entry(song.tracks[ti].bars[bi].events.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert((ti, bi));
                }
                Entry::Occupied(slot) => {
                    let (origin_track, origin_bar) = *slot.get();
                    song.tracks[origin_track].bars[origin_bar].kind = BarKind::Origin;
                    song.tracks[ti].bars[bi].kind = BarKind::Call {
                        track: origin_track,
                        bar: origin_bar,
                    };
                    calls += 1;
                }
            }
        }
    }

    calls
}

/// Bars holding a loop marker must stay in place; the loop label and the
/// jump may not live inside a callable pattern.
fn is_candidate(bar: &AgbBar) -> bool {
    !bar.events.is_empty() && bar.byte_len() > MIN_PATTERN_BYTES && !bar.has_loop_marker()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agb::AgbTrack;

    fn note_bar() -> AgbBar {
        AgbBar {
            events: vec![
                AgbEvent::Note {
                    len: 24,
                    key: 60,
                    velocity: 100,
                },
                AgbEvent::Wait(24),
                AgbEvent::Note {
                    len: 24,
                    key: 64,
                    velocity: 100,
                },
                AgbEvent::Wait(72),
            ],
            kind: BarKind::Inline,
        }
    }

    fn song_of(bars: Vec<AgbBar>) -> AgbSong {
        AgbSong {
            tracks: vec![AgbTrack { bars }],
        }
    }

    #[test]
    fn test_identical_bars_deduplicate() {
        let mut song = song_of(vec![note_bar(), note_bar()]);
        assert_eq!(dedupe(&mut song), 1);
        assert_eq!(song.tracks[0].bars[0].kind, BarKind::Origin);
        assert_eq!(
            song.tracks[0].bars[1].kind,
            BarKind::Call { track: 0, bar: 0 }
        );
    }

    #[test]
    fn test_small_bars_stay_inline() {
        let small = AgbBar {
            events: vec![AgbEvent::Wait(96)],
            kind: BarKind::Inline,
        };
        let mut song = song_of(vec![small.clone(), small]);
        assert_eq!(dedupe(&mut song), 0);
        assert_eq!(song.tracks[0].bars[0].kind, BarKind::Inline);
        assert_eq!(song.tracks[0].bars[1].kind, BarKind::Inline);
    }

    #[test]
    fn test_loop_marker_bars_excluded() {
        let mut bar = note_bar();
        bar.events.insert(0, AgbEvent::LoopStart);
        let mut song = song_of(vec![bar.clone(), bar]);
        assert_eq!(dedupe(&mut song), 0);
        assert_eq!(song.tracks[0].bars[0].kind, BarKind::Inline);
    }

    #[test]
    fn test_dedup_crosses_tracks() {
        let mut song = AgbSong {
            tracks: vec![
                AgbTrack {
                    bars: vec![note_bar()],
                },
                AgbTrack {
                    bars: vec![note_bar()],
                },
            ],
        };
        assert_eq!(dedupe(&mut song), 1);
        assert_eq!(song.tracks[0].bars[0].kind, BarKind::Origin);
        assert_eq!(
            song.tracks[1].bars[0].kind,
            BarKind::Call { track: 0, bar: 0 }
        );
    }
}

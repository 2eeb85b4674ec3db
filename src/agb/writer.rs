//! MPlay assembly emitter
//!
//! Writes the song as GNU assembler source against the MPlayDef.s macro
//! set. The emitter tracks the last command kind and the last note
//! key/velocity/length so it can drop opcodes and operands the engine
//! repeats implicitly.

use crate::agb::{note_name, quantize_len, AgbBar, AgbEvent, AgbSong, AgbTrack, BarKind};
use crate::compiler::Settings;
use crate::error::Result;
use std::io::Write;

/// Kind of the last emitted command; a matching next command may elide
/// its opcode. Notes only repeat at the same base length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmdState {
    None,
    Voice,
    Vol,
    Pan,
    Bend,
    Bendr,
    Lfos,
    Lfodl,
    Mod,
    Modt,
    Tune,
    Xcmd,
    Eot,
    Tie,
    Note(u8),
}

pub struct AsmWriter<'a, W: Write> {
    out: &'a mut W,
    settings: &'a Settings,
    track_num: usize,
    cmd_state: CmdState,
    may_repeat: bool,
    last_key: Option<u8>,
    last_vel: Option<u8>,
}

impl<'a, W: Write> AsmWriter<'a, W> {
    pub fn new(out: &'a mut W, settings: &'a Settings) -> Self {
        Self {
            out,
            settings,
            track_num: 0,
            cmd_state: CmdState::None,
            may_repeat: false,
            last_key: None,
            last_vel: None,
        }
    }

    fn reset_state(&mut self) {
        self.cmd_state = CmdState::None;
        self.may_repeat = false;
        self.last_key = None;
        self.last_vel = None;
    }

    fn sym(&self) -> String {
        self.settings.symbol.clone()
    }

    /// Header plus `.end`, for a score with no surviving tracks.
    pub fn write_empty(&mut self) -> Result<()> {
        self.write_header()?;
        writeln!(self.out, "\t.end")?;
        Ok(())
    }

    pub fn write_song(&mut self, song: &AgbSong) -> Result<()> {
        self.write_header()?;
        for (idx, track) in song.tracks.iter().enumerate() {
            self.write_track(track, idx + 1)?;
        }
        self.write_footer(song.tracks.len())?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let sym = self.sym();
        let rev = if self.settings.reverb > 0 {
            u32::from(self.settings.reverb) | 0x80
        } else {
            0
        };
        writeln!(self.out, "\t.include \"MPlayDef.s\"")?;
        writeln!(self.out)?;
        writeln!(self.out, "\t.equ\t{sym}_grp, {}", self.settings.voicegroup)?;
        writeln!(self.out, "\t.equ\t{sym}_pri, {}", self.settings.priority)?;
        writeln!(self.out, "\t.equ\t{sym}_rev, {rev}")?;
        writeln!(self.out, "\t.equ\t{sym}_mvl, 127")?;
        writeln!(self.out, "\t.equ\t{sym}_key, 0")?;
        writeln!(self.out, "\t.equ\t{sym}_tbs, 1")?;
        writeln!(self.out, "\t.equ\t{sym}_exg, 0")?;
        writeln!(self.out, "\t.equ\t{sym}_cmp, 1")?;
        writeln!(self.out)?;
        writeln!(self.out, "\t.section .rodata")?;
        writeln!(self.out, "\t.global\t{sym}")?;
        writeln!(self.out, "\t.align\t2")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn write_track(&mut self, track: &AgbTrack, num: usize) -> Result<()> {
        self.track_num = num;
        let sym = self.sym();
        writeln!(self.out, "{sym}_{num}:")?;
        writeln!(self.out, "\t.byte\tKEYSH , {sym}_key+0")?;
        self.reset_state();

        for (bar_num, bar) in track.bars.iter().enumerate() {
            writeln!(
                self.out,
                "@ {bar_num:03}   ----------------------------------------"
            )?;
            match bar.kind {
                BarKind::Origin => {
                    writeln!(self.out, "{sym}_{num}_{bar_num}:")?;
                    self.reset_state();
                    self.write_bar(bar)?;
                    writeln!(self.out, "\t.byte\tPEND")?;
                }
                BarKind::Call { track: ot, bar: ob } => {
                    writeln!(self.out, "\t.byte\tPATT")?;
                    writeln!(self.out, "\t .word\t{sym}_{}_{}", ot + 1, ob)?;
                    self.reset_state();
                }
                BarKind::Inline => self.write_bar(bar)?,
            }
        }

        writeln!(self.out, "\t.byte\tFINE")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn write_bar(&mut self, bar: &AgbBar) -> Result<()> {
        for ev in &bar.events {
            self.write_event(ev)?;
        }
        Ok(())
    }

    fn write_footer(&mut self, num_tracks: usize) -> Result<()> {
        let sym = self.sym();
        writeln!(self.out)?;
        writeln!(self.out, "\t.align\t2")?;
        writeln!(self.out, "{sym}:")?;
        writeln!(self.out, "\t.byte\t{num_tracks}\t@ NumTrks")?;
        writeln!(self.out, "\t.byte\t0\t@ NumBlks")?;
        writeln!(self.out, "\t.byte\t{sym}_pri\t@ Priority")?;
        writeln!(self.out, "\t.byte\t{sym}_rev\t@ Reverb")?;
        writeln!(self.out)?;
        writeln!(self.out, "\t.word\t{sym}_grp")?;
        writeln!(self.out)?;
        for num in 1..=num_tracks {
            writeln!(self.out, "\t.word\t{sym}_{num}")?;
        }
        writeln!(self.out)?;
        writeln!(self.out, "\t.end")?;
        Ok(())
    }

    fn write_event(&mut self, ev: &AgbEvent) -> Result<()> {
        match *ev {
            AgbEvent::Wait(len) => self.wait(len),
            AgbEvent::LoopStart => {
                let sym = self.sym();
                writeln!(self.out, "{sym}_{}_LOOP:", self.track_num)?;
                self.reset_state();
                Ok(())
            }
            AgbEvent::LoopEnd => {
                let sym = self.sym();
                writeln!(self.out, "\t.byte\tGOTO")?;
                writeln!(self.out, "\t .word\t{sym}_{}_LOOP", self.track_num)?;
                Ok(())
            }
            AgbEvent::Prio(v) => self.plain_cmd("PRIO", &v.to_string()),
            AgbEvent::Tempo(v) => {
                let operand = format!("{}*{}_tbs/2", u32::from(v) * 2, self.sym());
                self.plain_cmd("TEMPO", &operand)
            }
            AgbEvent::Keysh(v) => {
                let operand = format!("{}_key{v:+}", self.sym());
                self.plain_cmd("KEYSH", &operand)
            }
            AgbEvent::Voice(v) => self.state_cmd(CmdState::Voice, "VOICE", &v.to_string()),
            AgbEvent::Vol(v) => {
                let operand = format!("{v}*{}_mvl/mxv", self.sym());
                self.state_cmd(CmdState::Vol, "VOL", &operand)
            }
            AgbEvent::Pan(v) => self.state_cmd(CmdState::Pan, "PAN", &signed(v)),
            AgbEvent::Bend(v) => self.state_cmd(CmdState::Bend, "BEND", &signed(v)),
            AgbEvent::Bendr(v) => self.state_cmd(CmdState::Bendr, "BENDR", &v.to_string()),
            AgbEvent::Lfos(v) => self.state_cmd(CmdState::Lfos, "LFOS", &v.to_string()),
            AgbEvent::Lfodl(v) => self.state_cmd(CmdState::Lfodl, "LFODL", &v.to_string()),
            AgbEvent::Mod(v) => self.state_cmd(CmdState::Mod, "MOD", &v.to_string()),
            AgbEvent::Modt(t) => self.state_cmd(CmdState::Modt, "MODT", t.mnemonic()),
            AgbEvent::Tune(v) => self.state_cmd(CmdState::Tune, "TUNE", &signed(v)),
            AgbEvent::Xcmd { op, par } => self.xcmd(op, par),
            AgbEvent::Eot { key } => self.eot(key),
            AgbEvent::Tie { key, velocity } => self.tie(key, velocity),
            AgbEvent::Note {
                len,
                key,
                velocity,
            } => self.note(len, key, velocity),
        }
    }

    fn wait(&mut self, len: u32) -> Result<()> {
        let mut len = len;
        while len > 96 {
            writeln!(self.out, "\t.byte\tW96")?;
            len -= 96;
        }
        if len > 0 {
            let base = quantize_len(len as u8);
            if base > 0 {
                writeln!(self.out, "\t.byte\tW{base:02}")?;
            }
            let rest = len as u8 - base;
            if rest > 0 {
                writeln!(self.out, "\t.byte\tW{rest:02}")?;
            }
        }
        self.may_repeat = true;
        Ok(())
    }

    /// PRIO, TEMPO and KEYSH are always spelled out and never repeated.
    fn plain_cmd(&mut self, op: &str, operand: &str) -> Result<()> {
        writeln!(self.out, "\t.byte\t{op} , {operand}")?;
        self.cmd_state = CmdState::None;
        self.may_repeat = false;
        Ok(())
    }

    fn state_cmd(&mut self, state: CmdState, op: &str, operand: &str) -> Result<()> {
        if self.may_repeat && self.cmd_state == state {
            writeln!(self.out, "\t.byte\t\t{operand}")?;
        } else {
            writeln!(self.out, "\t.byte\t\t{op} , {operand}")?;
        }
        self.cmd_state = state;
        self.may_repeat = true;
        Ok(())
    }

    fn xcmd(&mut self, op: u8, par: u8) -> Result<()> {
        if self.may_repeat && self.cmd_state == CmdState::Xcmd {
            writeln!(self.out, "\t.byte\t\t{op} , {par}")?;
        } else {
            writeln!(self.out, "\t.byte\t\tXCMD , {op} , {par}")?;
        }
        self.cmd_state = CmdState::Xcmd;
        self.may_repeat = true;
        Ok(())
    }

    fn eot(&mut self, key: u8) -> Result<()> {
        if self.may_repeat && self.cmd_state == CmdState::Eot && self.last_key != Some(key) {
            writeln!(self.out, "\t.byte\t\t{}", note_name(key))?;
        } else if self.last_key == Some(key) {
            writeln!(self.out, "\t.byte\t\tEOT")?;
        } else {
            writeln!(self.out, "\t.byte\t\tEOT , {}", note_name(key))?;
        }
        self.cmd_state = CmdState::Eot;
        self.last_key = Some(key);
        self.may_repeat = true;
        Ok(())
    }

    fn tie(&mut self, key: u8, velocity: u8) -> Result<()> {
        if self.last_vel != Some(velocity) {
            writeln!(
                self.out,
                "\t.byte\t\tTIE , {} , v{velocity:03}",
                note_name(key)
            )?;
        } else if self.last_key != Some(key) {
            writeln!(self.out, "\t.byte\t\tTIE , {}", note_name(key))?;
        } else {
            writeln!(self.out, "\t.byte\t\tTIE")?;
        }
        self.cmd_state = CmdState::Tie;
        self.last_key = Some(key);
        self.last_vel = Some(velocity);
        self.may_repeat = false;
        Ok(())
    }

    fn note(&mut self, len: u8, key: u8, velocity: u8) -> Result<()> {
        let base = quantize_len(len);
        // without exact gate times the remainder is dropped, releasing
        // the voice up to three ticks early but saving the gtp byte
        let gate = if self.settings.exact_gate { len - base } else { 0 };
        let elide = self.may_repeat && self.cmd_state == CmdState::Note(base);

        let mut parts: Vec<String> = Vec::new();
        if !elide {
            parts.push(format!("N{base:02}"));
        }
        if gate > 0 {
            parts.push(note_name(key));
            parts.push(format!("v{velocity:03}"));
            parts.push(format!("gtp{gate}"));
        } else if self.last_vel != Some(velocity) {
            parts.push(note_name(key));
            parts.push(format!("v{velocity:03}"));
        } else if self.last_key != Some(key) {
            parts.push(note_name(key));
        } else if elide {
            // a bare key byte repeats the whole note
            parts.push(note_name(key));
        }
        writeln!(self.out, "\t.byte\t\t{}", parts.join(" , "))?;

        self.cmd_state = CmdState::Note(base);
        self.last_key = Some(key);
        self.last_vel = Some(velocity);
        self.may_repeat = true;
        Ok(())
    }
}

fn signed(v: i8) -> String {
    format!("c_v{v:+}")
}

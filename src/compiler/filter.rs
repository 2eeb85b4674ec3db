//! Volume, expression and velocity scaling
//!
//! Expression folds into the volume stream, the combined value is scaled
//! by the master volume and optionally mapped through the perceptual
//! curve; modulation depth is scaled by the global factor.

use crate::compiler::Settings;
use crate::midi::{cc, EventKind, MidiScore};

pub fn run(score: &mut MidiScore, settings: &Settings, mod_scale: f64) {
    for track in &mut score.tracks {
        let mut volume = 100u8;
        let mut expression = 127u8;

        for ev in &mut track.events {
            match &mut ev.kind {
                EventKind::Controller {
                    controller, value, ..
                } => match *controller {
                    cc::VOLUME => {
                        volume = *value;
                        *value = scale_volume(volume, expression, settings);
                    }
                    cc::EXPRESSION => {
                        expression = *value;
                        *controller = cc::VOLUME;
                        *value = scale_volume(volume, expression, settings);
                    }
                    cc::MOD => {
                        *value = scale_mod(*value, mod_scale);
                    }
                    _ => {}
                },
                EventKind::NoteOn { velocity, .. } => {
                    *velocity = scale_velocity(*velocity, settings);
                }
                _ => {}
            }
        }
    }
}

fn scale_volume(volume: u8, expression: u8, settings: &Settings) -> u8 {
    let product = f64::from(volume) * f64::from(expression) * f64::from(settings.master_volume);
    let out = if settings.natural_volume {
        127.0 * (product / (127.0 * 127.0 * 128.0)).powf(10.0 / 6.0)
    } else {
        product / (127.0 * 128.0)
    };
    out.round().clamp(0.0, 127.0) as u8
}

/// Velocity 0 means note off on the wire, so scaled velocities never
/// drop below 1.
fn scale_velocity(velocity: u8, settings: &Settings) -> u8 {
    let out = if settings.natural_volume {
        (127.0 * (f64::from(velocity) / 127.0).powf(10.0 / 6.0)).round()
    } else {
        f64::from(velocity)
    };
    out.clamp(1.0, 127.0) as u8
}

fn scale_mod(value: u8, mod_scale: f64) -> u8 {
    (f64::from(value) * mod_scale).round().clamp(0.0, 127.0) as u8
}

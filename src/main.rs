mod audio;
mod clipper;
mod display;
mod error;
mod frame_queue;
mod scope;
mod settings;
mod smoother;
mod ui;

use std::sync::Arc;

use clipper::SharedParams;
use frame_queue::frame_queue;
use settings::{AppSettings, default_settings_path};
use ui::ClipperApp;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let settings_path = default_settings_path();
    let mut settings = AppSettings::load(&settings_path);

    let params = Arc::new(SharedParams::new(&settings.params));
    // `NAME=value` arguments override the saved parameters, e.g. `DRIVE=9 MIX=50`.
    for arg in std::env::args().skip(1) {
        apply_override(&params, &arg);
    }
    settings.params = params.snapshot();

    let started = audio::start(
        Arc::clone(&params),
        settings.output_device.as_deref(),
        settings.input_device.as_deref(),
    )
    .or_else(|err| {
        log::warn!("Saved audio devices unavailable ({err}), trying defaults");
        audio::start(Arc::clone(&params), None, None)
    });
    let (audio, scope, audio_error) = match started {
        Ok((audio, scope)) => (Some(audio), scope, None),
        Err(err) => {
            log::error!("Audio unavailable: {err}");
            let (_, scope) = frame_queue();
            (None, scope, Some(err.to_string()))
        }
    };

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "F.W Clipper",
        options,
        Box::new(move |cc| {
            Box::new(ClipperApp::new(
                cc,
                params,
                audio,
                scope,
                settings_path,
                settings,
                audio_error,
            ))
        }),
    )
}

fn apply_override(params: &SharedParams, arg: &str) {
    let Some((name, raw)) = arg.split_once('=') else {
        log::warn!("Ignoring argument '{arg}', expected NAME=value");
        return;
    };
    let result = match raw.trim().parse::<f32>() {
        Ok(value) => params.set_parameter(name, value),
        Err(_) => {
            log::warn!("Ignoring '{arg}': '{raw}' is not a number");
            return;
        }
    };
    if let Err(err) = result {
        log::warn!("Ignoring '{arg}': {err}");
    }
}

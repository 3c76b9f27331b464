//! Audio playback module using rodio

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use rodio::{Decoder, OutputStream, Sink};

/// Play a WAV file and block until it has finished.
pub fn play_wav_file(path: &Path) -> Result<()> {
    let wav_data = std::fs::read(path)?;

    let (_stream, stream_handle) = OutputStream::try_default()?;
    let sink = Sink::try_new(&stream_handle)?;

    let duration = wav_duration(&wav_data);
    let source = Decoder::new(Cursor::new(wav_data))?;
    sink.append(source);

    // Sleeping on the header's duration returns more reliably than
    // sleep_until_end on some backends.
    match duration {
        Some(dur) => std::thread::sleep(dur + Duration::from_millis(100)),
        None => sink.sleep_until_end(),
    }

    Ok(())
}

fn wav_duration(wav_data: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(Cursor::new(wav_data)).ok()?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(reader.duration() as f64 / rate as f64))
}

//! Silent WAV clips
//!
//! The unlock handshake plays a header-only clip before the first real
//! narration. Output is always 8-bit mono PCM.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

const HEADER_LEN: u32 = 44;
/// Unsigned 8-bit PCM rests at the midpoint
const SILENCE: u8 = 0x80;

/// `samples` frames of 8-bit mono silence at `sample_rate` Hz
pub fn silence(sample_rate: u32, samples: u32) -> std::io::Result<Vec<u8>> {
    let mut wav = Vec::with_capacity((HEADER_LEN + samples) as usize);
    wav.write_all(b"RIFF")?;
    wav.write_u32::<LittleEndian>(HEADER_LEN - 8 + samples)?;
    wav.write_all(b"WAVEfmt ")?;
    wav.write_u32::<LittleEndian>(16)?;
    wav.write_u16::<LittleEndian>(1)?; // PCM
    wav.write_u16::<LittleEndian>(1)?; // mono
    wav.write_u32::<LittleEndian>(sample_rate)?;
    wav.write_u32::<LittleEndian>(sample_rate)?; // byte rate
    wav.write_u16::<LittleEndian>(1)?; // block align
    wav.write_u16::<LittleEndian>(8)?;
    wav.write_all(b"data")?;
    wav.write_u32::<LittleEndian>(samples)?;
    wav.resize((HEADER_LEN + samples) as usize, SILENCE);
    Ok(wav)
}

/// WAV bytes of the silent unlock clip
pub fn silent_wav() -> std::io::Result<Vec<u8>> {
    silence(8000, 0)
}

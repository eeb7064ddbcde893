//! Reads raw LC-3 image files into a [`Machine`]'s memory.
//!
//! An image is a 2-byte big-endian origin followed by a stream of 2-byte
//! big-endian words, placed consecutively starting at the origin. Short
//! reads are valid: loading simply stops at end-of-stream. Multiple images
//! may be loaded before execution; later images overlay earlier ones at
//! their own origins.

use crate::error::VmError;
use crate::machine::Machine;
use byteorder::{BigEndian, ReadBytesExt};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn load_image(machine: &mut Machine, path: &Path) -> Result<(), VmError> {
    let words = read_words(path).map_err(|source| VmError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let mut words = words.into_iter();
    let origin = match words.next() {
        Some(origin) => origin,
        None => {
            log::warn!("{:?}: empty image, nothing loaded", path);
            return Ok(());
        }
    };

    log::info!("loading {:?} at {:#06x}", path, origin);

    for (offset, word) in words.enumerate() {
        let address = origin.wrapping_add(offset as u16);
        // Stop rather than wrap once the image runs off the end of memory.
        if (offset as u32) + u32::from(origin) >= u32::from(u16::MAX) + 1 {
            break;
        }
        machine.write(address, word);
    }

    Ok(())
}

pub fn load_images<P: AsRef<Path>>(machine: &mut Machine, paths: &[P]) -> Result<(), VmError> {
    for path in paths {
        load_image(machine, path.as_ref())?;
    }
    Ok(())
}

fn read_words(path: &Path) -> std::io::Result<Vec<u16>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut words = Vec::new();

    loop {
        match reader.read_u16::<BigEndian>() {
            Ok(word) => words.push(word),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(words),
            Err(e) => return Err(e),
        }
    }
}

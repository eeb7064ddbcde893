use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop the VM before a clean `HALT`.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("no image file supplied")]
    NoImage,

    #[error("failed to load image {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("illegal instruction {opcode:#06b} at pc {pc:#06x}")]
    IllegalInstruction { opcode: u8, pc: u16 },

    #[error("unknown trap vector {vector:#04x} at pc {pc:#06x}")]
    UnknownTrap { vector: u8, pc: u16 },

    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

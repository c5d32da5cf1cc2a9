use std::fmt;
use std::io;

/// Errors returned by construction-time operations: ROM parsing, save-state
/// loading and battery-RAM loading. Runtime errors inside `tick()` are not
/// part of this enum — an illegal opcode locks the CPU in place rather than
/// producing an error, reproducing real DMG silicon (see `Cpu`).
#[derive(Debug)]
pub enum Error {
    /// Header checksum mismatch or an impossible ROM/RAM size field.
    InvalidRom,
    /// The cartridge header names an MBC type this core doesn't implement.
    UnsupportedCartridge(u8),
    /// A save-state's magic or version doesn't match what this core writes.
    IncompatibleStateVersion,
    /// A save-state ended before a block's declared length was satisfied.
    TruncatedState,
    /// A persistence collaborator (battery RAM, save-state) I/O call failed.
    IoFailure(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRom => write!(f, "invalid ROM: bad checksum or size fields"),
            Error::UnsupportedCartridge(code) => {
                write!(f, "unsupported cartridge type 0x{:02X}", code)
            }
            Error::IncompatibleStateVersion => {
                write!(f, "save state has an unrecognized magic or version")
            }
            Error::TruncatedState => write!(f, "save state ended mid-block"),
            Error::IoFailure(e) => write!(f, "persistence I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoFailure(e)
    }
}

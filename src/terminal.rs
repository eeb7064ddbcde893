//! The host terminal abstraction.
//!
//! The VM core never touches stdin/stdout directly; it only calls through
//! this trait. That keeps the fetch-decode-execute loop pure and lets tests
//! substitute an in-memory terminal instead of a real TTY.

use libc::STDIN_FILENO;
use nix::sys::select::{select, FdSet};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};
use std::io::{self, Read, Write};
use std::sync::Mutex;

/// Non-blocking keyboard polling plus blocking character I/O, as required by
/// the KBSR/KBDR memory-mapped registers and the trap service routines.
pub trait Terminal {
    /// True iff at least one byte is readable from stdin without blocking.
    fn check_key(&mut self) -> bool;
    /// Blocking read of one byte.
    fn read_char(&mut self) -> io::Result<u8>;
    fn write_char(&mut self, byte: u8) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    /// Lets tests downcast to a concrete terminal to inspect captured output.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

/// The real terminal: stdin/stdout of the host process.
pub struct StdioTerminal;

impl Terminal for StdioTerminal {
    fn check_key(&mut self) -> bool {
        let mut readfds = FdSet::new();
        readfds.insert(STDIN_FILENO);

        match select(
            None,
            &mut readfds,
            None,
            None,
            &mut nix::sys::time::TimeVal::zero(),
        ) {
            Ok(n) => n == 1,
            Err(_) => false,
        }
    }

    fn read_char(&mut self) -> io::Result<u8> {
        let mut buffer = [0u8; 1];
        io::stdin().read_exact(&mut buffer)?;
        Ok(buffer[0])
    }

    fn write_char(&mut self, byte: u8) -> io::Result<()> {
        io::stdout().write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }

    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

lazy_static::lazy_static! {
    static ref ORIGINAL_TERMIOS: Mutex<Option<Termios>> = Mutex::new(None);
}

extern "C" fn restore_and_reraise(_: nix::libc::c_int) {
    if let Ok(guard) = ORIGINAL_TERMIOS.lock() {
        if let Some(termios) = guard.as_ref() {
            let _ = tcsetattr(STDIN_FILENO, SetArg::TCSANOW, termios);
        }
    }
    unsafe {
        let _ = nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGINT,
            nix::sys::signal::SigHandler::SigDfl,
        );
        let _ = nix::libc::raise(nix::sys::signal::Signal::SIGINT as nix::libc::c_int);
    }
}

/// Puts stdin into unbuffered, no-echo mode for the lifetime of the value,
/// restoring the prior mode on drop — including on a fatal `SIGINT`, via a
/// handler installed alongside the raw-mode switch.
pub struct TerminalGuard {
    original: Termios,
}

impl TerminalGuard {
    pub fn enable() -> io::Result<Self> {
        let original = tcgetattr(STDIN_FILENO).map_err(nix_to_io_error)?;

        let mut raw = original.clone();
        raw.local_flags &= !(LocalFlags::ICANON | LocalFlags::ECHO);
        tcsetattr(STDIN_FILENO, SetArg::TCSANOW, &raw).map_err(nix_to_io_error)?;

        if let Ok(mut guard) = ORIGINAL_TERMIOS.lock() {
            *guard = Some(original.clone());
        }
        unsafe {
            let _ = nix::sys::signal::signal(
                nix::sys::signal::Signal::SIGINT,
                nix::sys::signal::SigHandler::Handler(restore_and_reraise),
            );
        }

        Ok(TerminalGuard { original })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = tcsetattr(STDIN_FILENO, SetArg::TCSANOW, &self.original);
    }
}

fn nix_to_io_error(err: nix::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

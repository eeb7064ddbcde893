mod config;
mod error;
mod executor;
mod instruction;
mod loader;
mod machine;
mod memory;
mod registers;
mod sign_extend;
mod terminal;
mod trap_vector;

pub use crate::config::Config;
pub use crate::error::VmError;
pub use crate::machine::Machine;
pub use crate::terminal::{StdioTerminal, TerminalGuard};

/// Puts the terminal into raw mode, loads every image in order, and runs the
/// machine until `HALT` or a fatal error. The terminal guard's `Drop` restores
/// cooked mode on every exit path, including an `Err` return.
pub fn run(config: Config) -> Result<(), VmError> {
    if config.images.is_empty() {
        return Err(VmError::NoImage);
    }

    let _guard = TerminalGuard::enable()?;

    let mut machine = Machine::new(Box::new(StdioTerminal));
    loader::load_images(&mut machine, &config.images)?;
    machine.run()
}

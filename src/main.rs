use lc3vm::{Config, VmError};
use std::process;

fn main() {
    let config = Config::from_args();
    init_logging(config.verbosity);

    if let Err(err) = lc3vm::run(config) {
        eprintln!("lc3: {}", err);
        process::exit(exit_code(&err));
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// Maps the error taxonomy to the exit codes in the CLI contract: `NoImage`
/// is the "nothing to run" case (2), everything else that stops the VM before
/// a clean `HALT` groups under 1.
fn exit_code(err: &VmError) -> i32 {
    match err {
        VmError::NoImage => 2,
        VmError::Load { .. } | VmError::IllegalInstruction { .. } | VmError::UnknownTrap { .. } => 1,
        VmError::Io(_) => 1,
    }
}

use std::process;

pub mod ask;
pub mod config;

/// Prints a command error on stderr and exits with status 1.
pub fn exit_on_error(result: Result<(), String>) {
    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}

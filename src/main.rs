//! Command-line entrypoint for importance recompute and ad-hoc queries.

use std::process::ExitCode;

fn main() -> ExitCode {
    neuromem::cli::run()
}

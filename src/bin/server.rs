//! Neuromem HTTP server binary.
//! Run with: cargo run --bin neuromem-server

use std::process::ExitCode;

use neuromem::start_server;

fn main() -> ExitCode {
    start_server::run()
}

//! Run the microphone probe once and print the result.
//!
//! Usage: probe-once [os-name]

use std::env;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let os_name = env::args()
        .nth(1)
        .unwrap_or_else(|| env::consts::OS.to_owned());

    let start = Instant::now();
    let outcome = micwatch_probe::probe_os(&os_name);
    let elapsed = start.elapsed();

    match outcome {
        Ok(result) => {
            println!("os     : {}", os_name);
            println!("mic    : ({}, {:?})", result.active, result.label);
            println!("took   : {:.1}ms", elapsed.as_secs_f64() * 1000.0);
            ExitCode::SUCCESS
        }
        Err(unsupported) => {
            eprintln!("{}", unsupported);
            ExitCode::from(2)
        }
    }
}

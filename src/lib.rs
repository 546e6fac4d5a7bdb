//! Interpreter library for the IPPcode21 three-address XML intermediate
//! language: an XML loader, a typed value/frame memory model, and a
//! dispatch-loop engine that executes a loaded program to completion.

pub mod constants;
pub mod engine;
pub mod error;
pub mod frame;
pub mod instructions;
pub mod loader;
pub mod memory;
pub mod operand;
pub mod stats;
pub mod value;

use std::io::{BufRead, Write};

pub use engine::{Engine, RunOutcome};
pub use error::{Error, Result};

/// Loads `xml` and runs it to completion against `input`/`output`. The
/// convenience entry point used by the CLI binary and integration tests;
/// `Engine`/`loader::load` remain available directly for callers that need
/// to inspect the loaded program before running it.
pub fn run_str(xml: &str, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<RunOutcome> {
    let program = loader::load(xml)?;
    Engine::new(program).run(input, output)
}

//! modweave driver library
//!
//! Builds the modules of an annotated transcript in dependency waves, hands
//! entry-point arguments to the final wave only, and verifies what every
//! module generated against the transcript's expected region.

pub mod backends;
pub mod dep_graph;
pub mod error;
pub mod index_processor;
pub mod output;
pub mod runner;
pub mod unit;
pub mod verify;

pub use dep_graph::{BuildReport, BuildStatus, ModuleGraph, ModuleId, Wave};
pub use error::{BuildError, DriverError, ProcessorError, UnitError};
pub use index_processor::{default_final_args, IndexProcessor, MAIN_ARG};
pub use runner::{
    run_file, run_transcript, CommandFactory, IndexProcessorFactory, RunConfig, RunReport,
    UnitFactory, WORK_DIR_ENV,
};
pub use unit::{BuildArgs, CompileUnit, ExitStatus};
pub use verify::{Mismatch, Verification};

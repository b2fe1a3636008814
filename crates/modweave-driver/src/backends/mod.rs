//! Interchangeable [`CompileUnit`](crate::unit::CompileUnit) implementations

pub mod command;
pub mod processor;

pub use command::CommandUnit;
pub use processor::{Filer, ProcessingEnv, Processor, ProcessorUnit};

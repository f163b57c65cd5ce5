mod atomic_io;
pub(crate) mod bootstrap;
pub(crate) mod cli;
pub(crate) mod loop_runner;
mod publish;
mod roster;
mod scenario;
mod transcript;

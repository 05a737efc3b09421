//! Command line front-end for the Oberon-0 compiler.

pub mod cli;
pub mod logger;

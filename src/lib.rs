//! Run a hydrodynamic engine, follow its progress and tune Manning roughness zones.
pub mod calibrate;
pub mod cli;
pub mod config;
pub mod io;
pub mod log;
pub mod manning;
pub mod pfs;
pub mod plot;
pub mod process;
pub mod progress;
pub mod runner;
pub mod suggest;
pub mod trial;
pub mod zones;

//! File formats read and written by the tool.
pub mod csv;
pub mod netcdf;

//! Hardware capabilities the core depends on.
pub mod strip;

//! Build-time configuration constants.
//!
//! Generated into `config_gen.rs` by `build.rs` from `slabpool.toml`
//! (override the file path with the `SLABPOOL_CONFIG` environment
//! variable). A missing config file yields the documented defaults.

include!(concat!(env!("OUT_DIR"), "/config_gen.rs"));

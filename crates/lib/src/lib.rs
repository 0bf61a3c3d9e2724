//! socgen-lib: build orchestration for SoC FPGA boot media
//!
//! The pipeline turns a Quartus project into the files an SD card needs:
//! - `bootloader`: u-boot from source acquisition to placement
//! - `bitstream`: the FPGA configuration the boot script loads
//! - `scanner`: which configuration file the boot script references
//! - `layout`: the partition folders everything is staged into
//!
//! Per-family parameters come from the `profile` registry; vendor tools run
//! through the `shell` seam and are verified on disk afterwards.

pub mod artifact;
pub mod bitstream;
pub mod bootloader;
pub mod config;
pub mod consts;
pub mod context;
pub mod error;
pub mod fetch;
pub mod handoff;
pub mod layout;
pub mod lock;
pub mod platform;
pub mod profile;
pub mod scanner;
pub mod shell;
pub mod toolchain;
#[cfg(test)]
pub(crate) mod util;

//! CLI integration tests against a scratch Quartus project.

mod common;

mod bitstream_tests;
mod bootloader_tests;
mod scan_tests;

//! Logger bootstrap.
//!
//! The core logs through the `log` facade only; this module wires up the
//! `env_logger` backend for embedders and tests that want output without
//! writing their own bootstrap.

mod init;

pub use init::{DEFAULT_FILTER, init_logging, init_test_logging};

//! Unit test harness for optosigma-shot.
//!
//! This module organizes tests for each component of the library.

mod codec_properties;
mod config_parsing;
mod config_validation;

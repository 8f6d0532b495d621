//! Tests for configuration validation through the TOML entry point.

use optosigma_shot::error::ConfigError;
use optosigma_shot::{parse_config, Error};

/// Test that more stages than controller axes are rejected.
#[test]
fn test_too_many_stages() {
    let toml_str = r#"
controller = "SHOT-702"
stages = ["HST-50", "HST-50", "HST-50"]

[serial]
port = "COM1"
"#;

    assert_eq!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::TooManyAxes { limit: 2 }))
    );
}

/// Test that a custom stage with an empty travel range is rejected.
#[test]
fn test_invalid_custom_travel() {
    let toml_str = r#"
controller = "SHOT-302GS"

[[stages]]
name = "broken"
kind = "linear"
pulses_per_unit = 100.0
min_travel = 500
max_travel = 100

[serial]
port = "COM1"
"#;

    assert_eq!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::InvalidTravel { min: 500, max: 100 }))
    );
}

/// Test that a custom stage with a zero resolution is rejected.
#[test]
fn test_invalid_custom_resolution() {
    let toml_str = r#"
controller = "SHOT-302GS"

[[stages]]
name = "broken"
kind = "rotation"
pulses_per_unit = 0.0
min_travel = -100
max_travel = 100

[serial]
port = "COM1"
"#;

    assert!(matches!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::InvalidResolution(_)))
    ));
}

/// Test that a custom controller with too many axes is rejected.
#[test]
fn test_invalid_axis_count() {
    let toml_str = r#"
[controller]
name = "wide"
axis_count = 9
baud_rate = 9600

[serial]
port = "COM1"
"#;

    assert_eq!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::InvalidAxisCount(9)))
    );
}

/// Test that unusable serial timings are rejected.
#[test]
fn test_invalid_timing() {
    let toml_str = r#"
controller = "SHOT-302GS"

[serial]
port = "COM1"
poll_interval_ms = 500
motion_timeout_ms = 100
"#;

    assert_eq!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::InvalidTiming))
    );
}

/// Test that an unknown stage name fails parsing.
#[test]
fn test_unknown_stage() {
    let toml_str = r#"
controller = "SHOT-302GS"
stages = ["SGSP99-1"]

[serial]
port = "COM1"
"#;

    assert!(matches!(
        parse_config(toml_str),
        Err(Error::Config(ConfigError::ParseError(_)))
    ));
}

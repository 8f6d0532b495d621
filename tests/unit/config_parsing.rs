//! Tests for loading session configuration from TOML.

use embedded_hal_mock::eh1::delay::NoopDelay;
use optosigma_shot::error::ConfigError;
use optosigma_shot::transport::{SimConnector, Simulator};
use optosigma_shot::{
    load_config, parse_config, ControllerModel, ControllerProfile, Error, Pulses, SessionBuilder,
    StageModel, StageProfile, Unit,
};

const BENCH_TOML: &str = r#"
controller = "SHOT-302GS"
stages = ["SGSP46-500", "SGSP-60YAW"]

[serial]
port = "/dev/ttyUSB0"
baud_rate = 38400
poll_interval_ms = 50
motion_timeout_ms = 30000
"#;

/// Test loading a configuration file from disk.
#[test]
fn test_load_config_file() {
    let path = std::env::temp_dir().join("optosigma_shot_load_config.toml");
    std::fs::write(&path, BENCH_TOML).unwrap();

    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.controller, ControllerProfile::Known(ControllerModel::Shot302Gs));
    assert_eq!(config.stages.len(), 2);
    assert_eq!(config.stages[1], StageProfile::Known(StageModel::Sgsp60Yaw));
    assert_eq!(config.serial.baud_rate, Some(38400));
    assert_eq!(config.serial.poll_interval_ms, 50);
    assert_eq!(config.serial.response_timeout_ms, 1000);
}

/// Test that a missing file reports an I/O error.
#[test]
fn test_load_missing_file() {
    let result = load_config("/nonexistent/optosigma/stages.toml");
    assert!(matches!(result, Err(Error::Config(ConfigError::IoError(_)))));
}

/// Test that OSMS aliases and case-insensitive names resolve.
#[test]
fn test_parse_model_aliases() {
    let toml_str = r#"
controller = "shot-304gs"
stages = ["OSMS26-100", "sgsp_120yaw"]

[serial]
port = "COM3"
"#;

    let config = parse_config(toml_str).unwrap();
    assert_eq!(config.controller, ControllerProfile::Known(ControllerModel::Shot304Gs));
    assert_eq!(config.stages[0], StageProfile::Known(StageModel::Sgsp26_100));
    assert_eq!(config.stages[1], StageProfile::Known(StageModel::Sgsp120Yaw));
}

/// Test building a working session from a parsed configuration.
#[test]
fn test_builder_from_config() {
    let config = parse_config(BENCH_TOML).unwrap();
    let sim = Simulator::for_model(ControllerModel::Shot302Gs);

    let mut session = SessionBuilder::<SimConnector, NoopDelay>::new()
        .from_config(&config)
        .unwrap()
        .connector(sim.connector())
        .delay(NoopDelay::new())
        .build()
        .unwrap();

    assert_eq!(session.axes().len(), 2);
    assert_eq!(session.axis(0).unwrap().stage().name.as_str(), "SGSP46-500");

    session.connect(&config.serial).unwrap();
    assert!(sim.is_open());

    // 10 um per pulse
    assert_eq!(session.move_axis(0, 1.5, Unit::Millimeters), Ok(Pulses(150)));
    // 400 pulses per degree
    assert_eq!(session.move_axis(1, -2.0, Unit::Degrees), Ok(Pulses(-800)));
}

/// Test that the builder reports missing parts.
#[test]
fn test_builder_requires_connector() {
    let result = SessionBuilder::<SimConnector, NoopDelay>::new()
        .controller(ControllerModel::Shot702)
        .delay(NoopDelay::new())
        .build();

    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));
}

/// Test that the builder rejects more stages than axes.
#[test]
fn test_builder_too_many_stages() {
    let sim = Simulator::for_model(ControllerModel::Shot702);
    let result = SessionBuilder::new()
        .controller(ControllerModel::Shot702)
        .stage(StageModel::Hst50)
        .stage(StageModel::Hst50)
        .stage(StageModel::Hst50)
        .connector(sim.connector())
        .delay(NoopDelay::new())
        .build();

    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::TooManyAxes { limit: 2 }))
    ));
}

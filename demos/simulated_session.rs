//! Example: drive a simulated SHOT-302GS.
//!
//! This example demonstrates how to:
//! - Build a session from a TOML configuration
//! - Move axes in physical units, alone and together
//! - Recover from a controller that stops answering
//!
//! Run with: `cargo run --example simulated_session`

use optosigma_shot::{
    parse_config,
    transport::{Simulator, StdDelay},
    ControllerModel, Error, Result, SessionBuilder, Unit,
};

const CONFIG: &str = r#"
controller = "SHOT-302GS"
stages = ["SGSP46-500", "SGSP-60YAW"]

[serial]
port = "sim"
poll_interval_ms = 10
motion_timeout_ms = 2000
"#;

fn main() -> Result<()> {
    println!("=== Simulated SHOT session ===\n");

    let config = parse_config(CONFIG)?;
    let sim = Simulator::for_model(ControllerModel::Shot302Gs);
    sim.set_motion_polls(3);

    let mut session = SessionBuilder::new()
        .from_config(&config)?
        .connector(sim.connector())
        .delay(StdDelay)
        .build()?;
    session.connect(&config.serial)?;

    for axis in session.axes() {
        println!(
            "Axis {}: {} ({:?}, {} pulses/unit)",
            axis.index(),
            axis.stage().name,
            axis.stage().kind,
            axis.stage().pulses_per_unit
        );
    }

    println!("\n--- Single-axis moves ---");
    let position = session.move_axis(0, 12.5, Unit::Millimeters)?;
    println!("Axis 0 at {} pulses", position.0);
    let position = session.move_axis(1, 90.0, Unit::Degrees)?;
    println!("Axis 1 at {} pulses", position.0);

    println!("\n--- Combined move ---");
    session.move_axes(&[(0, -2.5), (1, -45.0)], Unit::Pulses)?;
    for axis in session.axes() {
        println!(
            "Axis {}: {:.3} ({} pulses)",
            axis.index(),
            axis.position_physical(),
            axis.position().0
        );
    }

    println!("\n--- Out of travel ---");
    match session.move_axis(0, 400.0, Unit::Millimeters) {
        Err(Error::Encoding(e)) => println!("Rejected locally: {}", e),
        other => println!("Unexpected: {:?}", other),
    }

    println!("\n--- Lost controller ---");
    sim.go_silent();
    if let Err(e) = session.move_axis(0, 1.0, Unit::Millimeters) {
        println!("Move failed: {}", e);
    }
    println!("Axis 0 state: {}", session.axis(0).map_or("?", |a| a.state().name()));

    sim.resume();
    session.clear_fault(0)?;
    println!("Axis 0 state after clear: {}", session.axis(0).map_or("?", |a| a.state().name()));

    session.home_all()?;
    println!("\nHomed. Frames sent: {}", sim.frames().len());

    session.disconnect();
    Ok(())
}

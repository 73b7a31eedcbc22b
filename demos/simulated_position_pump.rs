// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Position-report pump example
//!
//! Replays the built-in GPX route and broadcasts a position report every
//! second, the way a vehicle-mounted client reports its own track.
//!
//! Run with: cargo run --example simulated_position_pump

use geomessage_broadcast::{
    LocationProvider, LocationSimulator, MessageController, PositionReporter, ReportIdentity,
};

const PORT: u16 = 45678;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let controller = MessageController::bind(PORT).await?;
    controller.set_sender_identity(Some("Honey Badgers 42G".into()));

    let reporter = PositionReporter::new(
        controller,
        ReportIdentity {
            callsign: "Honey Badgers 42G".into(),
            vehicle_type: "HMMWV".into(),
            unique_id: uuid::Uuid::new_v4().to_string(),
            symbol_code: "SFGPEVCAH------".into(),
        },
    );

    let simulator = LocationSimulator::new();
    simulator.set_speed_multiplier(2.0);
    simulator.add_listener(reporter.clone());
    simulator.start();
    reporter.set_enabled(true)?;

    println!("Broadcasting position reports on UDP port {PORT} for 30 seconds");
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;

    reporter.set_enabled(false)?;
    simulator.stop();
    Ok(())
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Blocking chem light example
//!
//! This example demonstrates using the blocking API to send Geomessages
//! without an async runtime in your main code.
//!
//! Run with: cargo run --example blocking_chem_light --features blocking

use geomessage_broadcast::blocking::MessageController;

const PORT: u16 = 45678;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let controller = MessageController::bind(PORT)?;
    controller.set_sender_identity(Some("DEMO-BLOCKING".into()));

    let light = controller.send_chem_light(70.447, 34.425, 4326, 0xFF0000FF)?;
    println!("sent blue chem light {}", light.id());

    // mark it for removal again after a moment
    std::thread::sleep(std::time::Duration::from_secs(2));
    controller.send_removal("chemlight", light.id())?;
    println!("sent removal for {}", light.id());

    Ok(())
}

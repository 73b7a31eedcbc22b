// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Chem light sender example
//!
//! Drops a ring of chem lights around a point, cycling through the four
//! protocol colors. Run a `broadcast_listener` on another host (or another
//! terminal) to watch them arrive.
//!
//! Run with: cargo run --example send_chem_light

use geomessage_broadcast::MessageController;

const PORT: u16 = 45678;

// red, green, blue, yellow
const COLORS: [u32; 4] = [0xFFFF0000, 0xFF00FF00, 0xFF0000FF, 0xFFFFFF00];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let controller = MessageController::bind(PORT).await?;
    controller.set_sender_identity(Some("DEMO-SENDER".into()));

    let (center_lon, center_lat) = (70.447, 34.425);
    for (i, color) in COLORS.iter().enumerate() {
        let angle = (i as f64) * std::f64::consts::FRAC_PI_2;
        let lon = center_lon + 0.002 * angle.cos();
        let lat = center_lat + 0.002 * angle.sin();
        let light = controller.send_chem_light(lon, lat, 4326, *color).await?;
        println!(
            "sent chem light {} color={} at {:.4},{:.4}",
            light.id(),
            light.field("color").unwrap_or("?"),
            lon,
            lat
        );
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    Ok(())
}

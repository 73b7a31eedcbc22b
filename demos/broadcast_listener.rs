// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Geomessage broadcast listener example
//!
//! This example binds the messaging port and prints every datagram and
//! decoded Geomessage received from peers on the local network.
//!
//! Run with: cargo run --example broadcast_listener

use std::sync::Arc;

use geomessage_broadcast::{Geomessage, GeomessageListener, MessageController};

const PORT: u16 = 45678;

struct ConsoleFeed;

impl GeomessageListener for ConsoleFeed {
    fn on_raw(&self, contents: &str) {
        println!("datagram ({} bytes)", contents.len());
    }

    fn on_geomessage(&self, message: &Geomessage) {
        println!(
            "  record id={} type={} action={:?}",
            message.id(),
            message.message_type().unwrap_or("?"),
            message.action()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let controller = MessageController::bind(PORT).await?;
    controller.set_sender_identity(Some("DEMO-LISTENER".into()));
    controller.add_listener(Arc::new(ConsoleFeed));
    controller.start_receiving()?;

    println!("Listening for geomessage broadcasts on UDP port {PORT} for 60 seconds");
    tokio::time::sleep(std::time::Duration::from_secs(60)).await;

    controller.stop_receiving();
    Ok(())
}

// In demos/producer.rs
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shmq::{CallbackStatus, Channel, ChannelConfig};
use tracing_subscriber::EnvFilter;

fn main() -> shmq::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let count: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(10);

    let channel = Channel::create_outbound("demo", ChannelConfig::default())?;
    println!("producer: created channel 'demo', waiting for a reader...");
    channel.wait_client_connected(Some(Duration::from_secs(30)), None)?;
    println!("producer: reader connected");

    let keep_alive = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&keep_alive);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .expect("failed to install Ctrl+C handler");

    for i in 0..count {
        if !keep_alive.load(Ordering::SeqCst) {
            break;
        }
        let line = format!("line {i}\n");
        let bytes = line.as_bytes();
        let outcome = channel.write(
            bytes.len() as i64,
            Some(Duration::from_secs(5)),
            None,
            |window| {
                window.copy_from_slice(bytes);
                CallbackStatus::Completed
            },
        )?;
        println!(
            "producer: wrote message {i} ({:?}, active_nodes={})",
            outcome.status, outcome.state.active_nodes
        );
    }

    println!("producer: done sending, press Ctrl+C to exit");
    while keep_alive.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }
    println!("producer: shutting down");
    Ok(())
}

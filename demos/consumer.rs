// In demos/consumer.rs
use std::env;
use std::time::Duration;

use shmq::{Channel, Error, OpStatus, Scope};
use tracing_subscriber::EnvFilter;

fn main() -> shmq::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let expected: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(10);

    println!("consumer: waiting for channel 'demo'...");
    let channel = Channel::open_inbound("demo", Scope::Local)?;
    println!("consumer: opened channel 'demo'");

    let start = std::time::Instant::now();
    let mut received = 0usize;
    while received < expected {
        match channel.wait_has_messages(Some(Duration::from_secs(5)), None) {
            Ok(()) => {}
            Err(Error::Timeout) => {
                eprintln!("consumer: timed out waiting for messages");
                break;
            }
            Err(e) => return Err(e),
        }

        let mut line = String::new();
        let outcome = channel.read(Some(Duration::from_secs(5)), None, |window| {
            line = String::from_utf8_lossy(window).into_owned();
            shmq::CallbackStatus::Completed
        })?;

        match outcome.status {
            OpStatus::QueueIsEmpty => continue,
            OpStatus::Completed => {
                print!("{line}");
                received += 1;
            }
            other => eprintln!("consumer: unexpected status {other:?}"),
        }
    }

    let elapsed = start.elapsed();
    println!(
        "consumer: received {received} messages in {:.2?} ({:.2} messages/sec)",
        elapsed,
        received as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}

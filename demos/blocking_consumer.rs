use shmq::{CallbackStatus, Channel, OpStatus, Scope};

fn main() -> shmq::Result<()> {
    println!("blocking consumer: connecting to channel 'demo'");
    let channel = Channel::open_inbound("demo", Scope::Local)?;

    println!("blocking consumer: waiting for messages...");
    loop {
        channel.wait_has_messages(None, None)?;

        let mut line = String::new();
        let outcome = channel.read(None, None, |window| {
            line = String::from_utf8_lossy(window).into_owned();
            CallbackStatus::Completed
        })?;

        if matches!(outcome.status, OpStatus::Completed) {
            print!("received: {line}");
        }
    }
}

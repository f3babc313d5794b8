//! Publish a heartbeat and echo side-channel requests.

use std::thread;
use std::time::Duration;

use skynet::zmq::prelude::*;

fn main() -> Result<()> {
    skynet::dev_tracing::init_tracing();

    let app = Application::from_env();
    let heartbeat = app.publisher::<u64>(
        "heartbeat",
        DataType::scalar("int"),
        &ServiceOptions::default(),
    )?;

    let _console = app.interaction::<String, _>(|line| {
        tracing::info!(%line, "interaction");
    })?;

    for beat in 0.. {
        heartbeat.set_value(beat)?;
        thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}

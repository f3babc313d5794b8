//! Join both wheel encoders into one odometry estimate.
//!
//! Run next to a broker that serves `wheels/left` and `wheels/right` and
//! accepts `odometry/speed`:
//!
//! ```text
//! SKYNET_SOCKETS_DIR=/tmp/skynet/sockets cargo run --example wheel_odometry
//! ```

use skynet::zmq::prelude::*;

fn main() -> Result<()> {
    let config = Config::from_env();
    skynet::dev_tracing::init_tracing_for(&config);

    let app = Application::new(config);
    let ticks = DataType::scalar("float");
    let opts = ServiceOptions::default();

    let left = app.subscriber::<f64>("wheels/left", ticks.clone(), &opts)?;
    let right = app.subscriber::<f64>("wheels/right", ticks.clone(), &opts)?;
    let speed = app.publisher::<f64>("odometry/speed", ticks, &opts)?;

    let wheels = Synchronizer::new(&[&left, &right], SyncMode::Pull)?;
    for round in wheels.messages()? {
        let (l, r) = (&round[0], &round[1]);
        let skew = (l.timestamp() - r.timestamp()).abs();
        tracing::debug!(skew, "wheel round");
        speed.set_value((l.data + r.data) / 2.0)?;
    }
    Ok(())
}

use std::path::Path;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use skynet::zmq::prelude::*;
use skynet::{join, ServiceKind};
use skynet_core::endpoint::service_path;
use skynet_core::message::{self, Header};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

fn app(dir: &TempDir) -> Application {
    skynet::dev_tracing::init_tracing();
    let config = Config::default()
        .with_application_id("sync-test")
        .with_sockets_dir(dir.path())
        .with_poll_interval(Duration::from_millis(10));
    Application::with_control_plane(config, |_: &str, _: Value| Some(Value::Null))
}

/// Fake broker for one subscription: answers each poll with the next value.
fn broker<T>(ctx: &zmq::Context, path: &Path, values: Vec<T>) -> thread::JoinHandle<()>
where
    T: serde::Serialize + Send + 'static,
{
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let rep = ctx.socket(zmq::REP).unwrap();
    rep.set_rcvtimeo(5_000).unwrap();
    rep.bind(&format!("ipc://{}", path.display())).unwrap();

    thread::spawn(move || {
        for (i, value) in values.into_iter().enumerate() {
            rep.recv_multipart(0).unwrap();
            let frames = message::encode(&Message::with_header(Header::at(i as f64), value)).unwrap();
            rep.send_multipart(frames.iter().map(|f| f.to_vec()), 0).unwrap();
        }
    })
}

fn subscribe<T>(app: &Application, name: &str) -> Subscriber<T>
where
    T: serde::de::DeserializeOwned + Clone + Send + 'static,
{
    let opts = ServiceOptions::default().with_buffer_size(4);
    app.subscriber::<T>(name, DataType::scalar("any"), &opts).unwrap()
}

#[test]
fn pull_rounds_are_ordered_by_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let ctx = zmq::Context::new();

    let left = subscribe::<i64>(&app, "wheels/left");
    let right = subscribe::<i64>(&app, "wheels/right");
    let sync = Synchronizer::new(&[&left, &right], SyncMode::Pull).unwrap();
    assert_eq!(sync.width(), 2);

    // Right arrives before left; the round is still [left, right].
    let r = broker(&ctx, &service_path(dir.path(), ServiceKind::Sub, "wheels/right"), vec![20]);
    r.join().unwrap();
    let l = broker(&ctx, &service_path(dir.path(), ServiceKind::Sub, "wheels/left"), vec![10]);

    assert_eq!(sync.value_timeout(WAIT).unwrap(), Some(vec![10, 20]));
    assert_eq!(sync.rounds(), 1);
    l.join().unwrap();

    // Joined subscribers no longer serve pull access.
    assert!(left.value_timeout(Duration::from_millis(1)).is_err());
}

#[test]
fn callback_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let ctx = zmq::Context::new();

    let a = subscribe::<String>(&app, "a");
    let b = subscribe::<String>(&app, "b");
    let c = subscribe::<String>(&app, "c");

    let (tx, rx) = flume::unbounded();
    let sync = Synchronizer::new(
        &[&a, &b, &c],
        SyncMode::messages(move |round: Vec<Message<String>>| {
            tx.send(round).unwrap();
        }),
    )
    .unwrap();

    let brokers: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            broker(
                &ctx,
                &service_path(dir.path(), ServiceKind::Sub, name),
                vec![name.to_uppercase()],
            )
        })
        .collect();

    let round = rx.recv_timeout(WAIT).unwrap();
    let values: Vec<_> = round.into_iter().map(Message::into_data).collect();
    assert_eq!(values, vec!["A", "B", "C"]);

    assert!(sync.value_timeout(Duration::from_millis(1)).is_err());
    for broker in brokers {
        broker.join().unwrap();
    }
}

#[test]
fn heterogeneous_streams_join_as_cbor_values() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let ctx = zmq::Context::new();

    let name = subscribe::<ciborium::Value>(&app, "robot/name");
    let battery = subscribe::<ciborium::Value>(&app, "robot/battery");
    let n = broker(&ctx, &service_path(dir.path(), ServiceKind::Sub, "robot/name"), vec!["r2"]);
    let b = broker(&ctx, &service_path(dir.path(), ServiceKind::Sub, "robot/battery"), vec![0.75]);

    let mut rounds = join(&[&name, &battery]).unwrap();
    let round = rounds.next().unwrap();
    assert_eq!(round[0].as_text(), Some("r2"));
    assert_eq!(round[1].as_float(), Some(0.75));

    n.join().unwrap();
    b.join().unwrap();
}

#[test]
fn subscriber_with_callback_cannot_be_joined() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let free = subscribe::<i64>(&app, "free");
    let taken = subscribe::<i64>(&app, "taken");
    taken.register_callback(|_| {}).unwrap();

    let err = Synchronizer::new(&[&free, &taken], SyncMode::Pull).unwrap_err();
    assert!(matches!(err, SkynetError::CallbackAlreadySet { ref service } if service == "taken"));
    // Nothing was installed on the free subscriber.
    assert!(!free.has_callback());

    let empty: [&Subscriber<i64>; 0] = [];
    assert!(Synchronizer::new(&empty, SyncMode::Pull).is_err());
}

#[test]
fn messages_received_before_the_join_make_the_first_round() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let ctx = zmq::Context::new();

    let left = subscribe::<i64>(&app, "early/left");
    let right = subscribe::<i64>(&app, "early/right");
    let l = broker(&ctx, &service_path(dir.path(), ServiceKind::Sub, "early/left"), vec![1]);
    let r = broker(&ctx, &service_path(dir.path(), ServiceKind::Sub, "early/right"), vec![2]);
    l.join().unwrap();
    r.join().unwrap();

    // Both values are already sitting in the pull buffers.
    assert!(left.wait_last(Some(WAIT)).is_some());
    assert!(right.wait_last(Some(WAIT)).is_some());

    let sync = Synchronizer::new(&[&left, &right], SyncMode::Pull).unwrap();
    assert_eq!(sync.value_timeout(WAIT).unwrap(), Some(vec![1, 2]));
    assert_eq!(left.dropped(), 0);
}

#[test]
fn join_ends_when_a_subscriber_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let left = subscribe::<i64>(&app, "stop/left");
    let right = subscribe::<i64>(&app, "stop/right");
    let mut rounds = join(&[&left, &right]).unwrap();

    let (tx, rx) = flume::bounded(1);
    let consumer = thread::spawn(move || {
        tx.send(rounds.next().is_none()).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    drop(left);
    drop(right);

    assert!(rx.recv_timeout(WAIT).unwrap());
    consumer.join().unwrap();
}

#[test]
fn failed_join_removes_installed_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let twice = subscribe::<i64>(&app, "twice");
    let err = Synchronizer::new(&[&twice, &twice], SyncMode::Pull).unwrap_err();
    assert!(matches!(err, SkynetError::CallbackAlreadySet { ref service } if service == "twice"));
    assert!(!twice.has_callback());

    // Free again for pull access and for a proper join.
    assert_eq!(twice.value_timeout(Duration::from_millis(1)).unwrap(), None);
    assert!(Synchronizer::new(&[&twice], SyncMode::Pull).is_ok());
}

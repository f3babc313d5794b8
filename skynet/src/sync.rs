//! Multi-service synchronizer.
//!
//! Joins N subscriptions into rounds: a round completes once every stream has
//! delivered at least one message since the previous round, and is emitted as
//! one `Vec` ordered by stream index (not by arrival).
//!
//! ```text
//! stream 1 ──▶ [ _ , b , _ ]
//! stream 0 ──▶ [ a , b , _ ]
//! stream 0 ──▶ [ a', b , _ ]   later message replaces the earlier one
//! stream 2 ──▶ [ a', b , c ] ──emit──▶ [a', b, c]   slots cleared
//! ```
//!
//! The synchronizer takes over the message callback of every subscriber it
//! joins, so it runs on their worker threads and needs no thread of its own.
//! Messages a subscriber buffered before the join count toward the first
//! round. Once any joined subscriber shuts down no round can complete, so
//! pull consumers are released as if [`Synchronizer::close`] had been called.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use skynet_core::buffer::OverwriteBuffer;
use skynet_core::error::{Result, SkynetError};
use skynet_core::message::Message;
use skynet_zmq::Subscriber;
use tracing::{debug, trace};

type ValuesCallback<T> = Box<dyn Fn(Vec<T>) + Send + Sync>;
type MessagesCallback<T> = Box<dyn Fn(Vec<Message<T>>) + Send + Sync>;

/// How completed rounds are consumed.
pub enum SyncMode<T> {
    /// Rounds are kept for [`Synchronizer::value`] and friends (latest round wins).
    Pull,
    /// Each round's values are passed to a callback.
    Values(ValuesCallback<T>),
    /// Each round's messages, headers included, are passed to a callback.
    Messages(MessagesCallback<T>),
}

impl<T> SyncMode<T> {
    /// Deliver rounds of values to `callback`.
    pub fn values(callback: impl Fn(Vec<T>) + Send + Sync + 'static) -> Self {
        Self::Values(Box::new(callback))
    }

    /// Deliver rounds of messages to `callback`.
    pub fn messages(callback: impl Fn(Vec<Message<T>>) + Send + Sync + 'static) -> Self {
        Self::Messages(Box::new(callback))
    }
}

impl<T> fmt::Debug for SyncMode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pull => "Pull",
            Self::Values(_) => "Values",
            Self::Messages(_) => "Messages",
        })
    }
}

enum Emit<T> {
    Buffer(OverwriteBuffer<Vec<Message<T>>>),
    Values(ValuesCallback<T>),
    Messages(MessagesCallback<T>),
}

struct Rounds<T> {
    slots: Vec<Option<Message<T>>>,
    filled: usize,
    completed: u64,
}

struct Join<T> {
    name: String,
    rounds: Mutex<Rounds<T>>,
    emit: Emit<T>,
}

impl<T> Join<T> {
    fn new(name: String, width: usize, mode: SyncMode<T>) -> Self {
        let emit = match mode {
            SyncMode::Pull => Emit::Buffer(OverwriteBuffer::new(1)),
            SyncMode::Values(cb) => Emit::Values(cb),
            SyncMode::Messages(cb) => Emit::Messages(cb),
        };
        Self {
            name,
            rounds: Mutex::new(Rounds {
                slots: (0..width).map(|_| None).collect(),
                filled: 0,
                completed: 0,
            }),
            emit,
        }
    }

    /// Store the message of stream `index`, emitting the round once full.
    ///
    /// Emission happens under the lock, so rounds are handed out strictly
    /// one at a time.
    fn deliver(&self, index: usize, message: Message<T>) {
        let mut rounds = self.rounds.lock();
        let Some(slot) = rounds.slots.get_mut(index) else {
            return;
        };
        if slot.replace(message).is_none() {
            rounds.filled += 1;
        }
        trace!(sync = %self.name, index, filled = rounds.filled, "slot filled");
        if rounds.filled < rounds.slots.len() {
            return;
        }

        let joined: Vec<Message<T>> = rounds.slots.iter_mut().filter_map(Option::take).collect();
        rounds.filled = 0;
        rounds.completed += 1;

        match &self.emit {
            Emit::Buffer(buffer) => buffer.push(joined),
            Emit::Values(callback) => callback(joined.into_iter().map(Message::into_data).collect()),
            Emit::Messages(callback) => callback(joined),
        }
    }

    fn close(&self) {
        if let Emit::Buffer(buffer) = &self.emit {
            buffer.close();
        }
    }

    fn buffer(&self) -> Result<&OverwriteBuffer<Vec<Message<T>>>> {
        match &self.emit {
            Emit::Buffer(buffer) => Ok(buffer),
            _ => Err(SkynetError::callback_registered(self.name.as_str())),
        }
    }
}

/// Barrier over several subscribers of the same value type.
///
/// For streams of different types, subscribe with `ciborium::Value` as `T`.
///
/// ```no_run
/// use skynet::sync::{SyncMode, Synchronizer};
/// use skynet::zmq::Application;
/// use skynet::{DataType, ServiceOptions};
///
/// let app = Application::from_env();
/// let opts = ServiceOptions::default();
/// let left = app.subscriber::<f64>("wheels/left", DataType::scalar("float"), &opts)?;
/// let right = app.subscriber::<f64>("wheels/right", DataType::scalar("float"), &opts)?;
///
/// let wheels = Synchronizer::new(&[&left, &right], SyncMode::Pull)?;
/// let speeds = wheels.value()?;
/// println!("left={} right={}", speeds[0], speeds[1]);
/// # Ok::<(), skynet::SkynetError>(())
/// ```
pub struct Synchronizer<T> {
    join: Arc<Join<T>>,
}

impl<T> Synchronizer<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    /// Join `subscribers`, in order, taking over their message callbacks.
    ///
    /// Fails if the list is empty or any subscriber already has a callback
    /// (including one listed twice). On failure, callbacks installed by this
    /// call are removed again.
    pub fn new(subscribers: &[&Subscriber<T>], mode: SyncMode<T>) -> Result<Self> {
        if subscribers.is_empty() {
            return Err(SkynetError::InvalidConfig(
                "a synchronizer needs at least one subscriber".to_string(),
            ));
        }
        if let Some(taken) = subscribers.iter().find(|s| s.has_callback()) {
            return Err(SkynetError::CallbackAlreadySet {
                service: taken.name().to_string(),
            });
        }

        let names: Vec<&str> = subscribers.iter().map(|s| s.name()).collect();
        let name = format!("sync({})", names.join(","));
        let join = Arc::new(Join::new(name, subscribers.len(), mode));

        for (index, subscriber) in subscribers.iter().enumerate() {
            let hooked = Arc::clone(&join);
            let installed =
                subscriber.register_message_callback(move |message| hooked.deliver(index, message));
            if let Err(e) = installed {
                for earlier in &subscribers[..index] {
                    earlier.unregister_callback();
                }
                return Err(e);
            }
        }
        for subscriber in subscribers {
            let join: Weak<Join<T>> = Arc::downgrade(&join);
            subscriber.on_shutdown(move || {
                if let Some(join) = join.upgrade() {
                    debug!(sync = %join.name, "joined subscriber stopped");
                    join.close();
                }
            });
        }
        debug!(sync = %join.name, width = subscribers.len(), "synchronizer ready");

        Ok(Self { join })
    }
}

impl<T> Synchronizer<T> {
    /// Number of joined streams.
    pub fn width(&self) -> usize {
        self.join.rounds.lock().slots.len()
    }

    /// Rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.join.rounds.lock().completed
    }

    /// Block until the next round and return its values.
    pub fn value(&self) -> Result<Vec<T>> {
        Ok(into_values(self.message()?))
    }

    /// Block until the next round and return its messages.
    ///
    /// Fails with [`SkynetError::ShutDown`] after [`close`](Self::close).
    pub fn message(&self) -> Result<Vec<Message<T>>> {
        self.join.buffer()?.pop().ok_or(SkynetError::ShutDown)
    }

    /// Like [`value`](Self::value), giving up after `timeout`.
    pub fn value_timeout(&self, timeout: Duration) -> Result<Option<Vec<T>>> {
        Ok(self.message_timeout(timeout)?.map(into_values))
    }

    /// Like [`message`](Self::message), giving up after `timeout`.
    pub fn message_timeout(&self, timeout: Duration) -> Result<Option<Vec<Message<T>>>> {
        Ok(self.join.buffer()?.pop_timeout(timeout))
    }

    /// Endless stream of rounds; ends after [`close`](Self::close).
    pub fn values(&self) -> Result<impl Iterator<Item = Vec<T>> + '_> {
        Ok(self.messages()?.map(into_values))
    }

    /// Endless stream of rounds with headers.
    pub fn messages(&self) -> Result<impl Iterator<Item = Vec<Message<T>>> + '_> {
        let buffer = self.join.buffer()?;
        Ok(std::iter::from_fn(move || buffer.pop()))
    }

    /// Release pull consumers. Later rounds are discarded.
    ///
    /// Also happens when a joined subscriber shuts down.
    pub fn close(&self) {
        self.join.close();
    }
}

impl<T> fmt::Debug for Synchronizer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("name", &self.join.name)
            .field("rounds", &self.rounds())
            .finish()
    }
}

fn into_values<T>(messages: Vec<Message<T>>) -> Vec<T> {
    messages.into_iter().map(Message::into_data).collect()
}

/// Iterate over joined rounds of values from `subscribers`.
///
/// The iterator ends once any of the subscribers shuts down.
pub fn join<T>(subscribers: &[&Subscriber<T>]) -> Result<impl Iterator<Item = Vec<T>>>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    let sync = Synchronizer::new(subscribers, SyncMode::Pull)?;
    Ok(std::iter::from_fn(move || sync.value().ok()))
}

/// Iterate over joined rounds of messages from `subscribers`.
pub fn join_messages<T>(
    subscribers: &[&Subscriber<T>],
) -> Result<impl Iterator<Item = Vec<Message<T>>>>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    let sync = Synchronizer::new(subscribers, SyncMode::Pull)?;
    Ok(std::iter::from_fn(move || sync.message().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skynet_core::message::Header;

    fn msg(ts: f64, v: &str) -> Message<String> {
        Message::with_header(Header::at(ts), v.to_string())
    }

    fn recording(width: usize) -> (Join<String>, flume::Receiver<Vec<String>>) {
        let (tx, rx) = flume::unbounded();
        let join = Join::new(
            "test".to_string(),
            width,
            SyncMode::values(move |round: Vec<String>| {
                tx.send(round).unwrap();
            }),
        );
        (join, rx)
    }

    #[test]
    fn rounds_are_ordered_by_stream_index() {
        let (join, rx) = recording(3);

        join.deliver(1, msg(1.0, "b"));
        join.deliver(0, msg(2.0, "a"));
        assert!(rx.try_recv().is_err());

        join.deliver(2, msg(3.0, "c"));
        assert_eq!(rx.try_recv().unwrap(), vec!["a", "b", "c"]);

        // Partial round after a reset does not emit.
        join.deliver(0, msg(4.0, "a2"));
        join.deliver(2, msg(5.0, "c2"));
        assert!(rx.try_recv().is_err());

        join.deliver(1, msg(6.0, "b2"));
        assert_eq!(rx.try_recv().unwrap(), vec!["a2", "b2", "c2"]);
        assert_eq!(join.rounds.lock().completed, 2);
    }

    #[test]
    fn latest_message_per_stream_wins() {
        let (join, rx) = recording(2);

        join.deliver(0, msg(1.0, "old"));
        join.deliver(0, msg(2.0, "new"));
        assert_eq!(join.rounds.lock().filled, 1);

        join.deliver(1, msg(3.0, "other"));
        assert_eq!(rx.try_recv().unwrap(), vec!["new", "other"]);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let (join, rx) = recording(1);
        join.deliver(5, msg(1.0, "x"));
        assert!(rx.try_recv().is_err());
        assert_eq!(join.rounds.lock().filled, 0);
    }

    #[test]
    fn pull_mode_keeps_latest_round() {
        let sync = Synchronizer {
            join: Arc::new(Join::new("pull".to_string(), 2, SyncMode::Pull)),
        };

        for round in 0..3 {
            let ts = f64::from(round);
            sync.join.deliver(0, msg(ts, "l"));
            sync.join.deliver(1, msg(ts, "r"));
        }
        assert_eq!(sync.rounds(), 3);

        let latest = sync.message_timeout(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(latest[0].timestamp(), 2.0);
        assert!(sync.value_timeout(Duration::from_millis(10)).unwrap().is_none());

        sync.close();
        assert!(matches!(sync.value(), Err(SkynetError::ShutDown)));
    }

    #[test]
    fn pull_access_in_callback_mode_always_fails() {
        let sync = Synchronizer {
            join: Arc::new(Join::new(
                "cb".to_string(),
                2,
                SyncMode::messages(|_: Vec<Message<String>>| {}),
            )),
        };
        for _ in 0..3 {
            let err = sync.value_timeout(Duration::from_millis(1)).unwrap_err();
            assert!(matches!(err, SkynetError::CallbackRegistered { .. }));
        }
        assert!(sync.values().is_err());
        assert!(sync.message().is_err());
    }
}

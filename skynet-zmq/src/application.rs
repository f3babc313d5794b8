//! Application registry.
//!
//! One `Application` per process owns everything that used to be ambient:
//! the ZeroMQ context, the configuration, the table of exposed services and
//! the control-plane client. Services borrow it at construction and keep what
//! they need; the registry itself is cheap to clone.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use skynet_core::config::Config;
use skynet_core::error::{Result, SkynetError};
use skynet_core::options::ServiceOptions;
use skynet_core::service::{DataType, ServiceDescriptor};
use skynet_core::service_kind::ServiceKind;
use tracing::{debug, info, warn};

use crate::interaction::Interaction;
use crate::node::{ControlPlane, NodeClient, EXPOSE_RESOURCE};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

struct Inner {
    config: Config,
    context: zmq::Context,
    services: Mutex<HashMap<(ServiceKind, String), ServiceDescriptor>>,
    control: Box<dyn ControlPlane>,
}

/// Process-wide registry of services.
///
/// ```no_run
/// use skynet_core::config::Config;
/// use skynet_core::options::ServiceOptions;
/// use skynet_core::service::DataType;
/// use skynet_zmq::Application;
///
/// let app = Application::new(Config::from_env());
/// let heading = app.publisher::<f64>("imu/heading", DataType::scalar("float"), &ServiceOptions::default())?;
/// heading.set_value(90.0)?;
/// # Ok::<(), skynet_core::error::SkynetError>(())
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

impl Application {
    /// Registry talking to the broker's node endpoint under the sockets root.
    pub fn new(config: Config) -> Self {
        let context = zmq::Context::new();
        let control = NodeClient::new(context.clone(), &config);
        Self::build(config, context, Box::new(control))
    }

    /// Registry configured from the process environment.
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    /// Registry with a custom control plane.
    pub fn with_control_plane(config: Config, control: impl ControlPlane + 'static) -> Self {
        Self::build(config, zmq::Context::new(), Box::new(control))
    }

    fn build(config: Config, context: zmq::Context, control: Box<dyn ControlPlane>) -> Self {
        info!(
            application = %config.application_id,
            sockets = %config.sockets_dir.display(),
            "application started"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                context,
                services: Mutex::new(HashMap::new()),
                control,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn context(&self) -> &zmq::Context {
        &self.inner.context
    }

    /// Record `descriptor` and announce it to the broker.
    ///
    /// Exposing the same `(kind, name)` twice is an error. A failed
    /// announcement is only logged.
    pub fn expose(&self, descriptor: &ServiceDescriptor) -> Result<()> {
        self.launch(descriptor, true, || Ok(()))
    }

    /// Reserve `descriptor`, run `start`, then announce when `announce` is set.
    ///
    /// The reservation is released again if `start` fails, so the name can
    /// be retried.
    pub(crate) fn launch<S>(
        &self,
        descriptor: &ServiceDescriptor,
        announce: bool,
        start: impl FnOnce() -> Result<S>,
    ) -> Result<S> {
        self.reserve(descriptor)?;
        let service = match start() {
            Ok(service) => service,
            Err(e) => {
                self.release(descriptor);
                return Err(e);
            }
        };
        debug!(service = %descriptor.name, kind = %descriptor.kind, announce, "service registered");

        if announce {
            self.announce(descriptor);
        }
        Ok(service)
    }

    fn reserve(&self, descriptor: &ServiceDescriptor) -> Result<()> {
        let mut services = self.inner.services.lock();
        let key = (descriptor.kind, descriptor.name.clone());
        if services.contains_key(&key) {
            return Err(SkynetError::DuplicateService {
                kind: descriptor.kind,
                name: descriptor.name.clone(),
            });
        }
        services.insert(key, descriptor.clone());
        Ok(())
    }

    fn release(&self, descriptor: &ServiceDescriptor) {
        self.inner
            .services
            .lock()
            .remove(&(descriptor.kind, descriptor.name.clone()));
    }

    fn announce(&self, descriptor: &ServiceDescriptor) {
        let body = match serde_json::to_value(descriptor) {
            Ok(body) => body,
            Err(e) => {
                warn!(service = %descriptor.name, error = %e, "service descriptor is not valid JSON");
                return;
            }
        };
        if self.inner.control.call(EXPOSE_RESOURCE, body).is_none() {
            warn!(
                service = %descriptor.name,
                kind = %descriptor.kind,
                "broker did not acknowledge the service; continuing unexposed"
            );
        }
    }

    /// True when `(kind, name)` has been registered.
    pub fn is_exposed(&self, kind: ServiceKind, name: &str) -> bool {
        self.inner
            .services
            .lock()
            .contains_key(&(kind, name.to_string()))
    }

    /// Every registered service, sorted by kind then name.
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let mut services: Vec<_> = self.inner.services.lock().values().cloned().collect();
        services.sort_by(|a, b| (a.kind.as_str(), &a.name).cmp(&(b.kind.as_str(), &b.name)));
        services
    }

    pub fn publisher<T>(
        &self,
        name: &str,
        data: DataType,
        options: &ServiceOptions,
    ) -> Result<Publisher<T>>
    where
        T: Serialize + Send + 'static,
    {
        Publisher::new(self, name, data, options)
    }

    pub fn subscriber<T>(
        &self,
        name: &str,
        data: DataType,
        options: &ServiceOptions,
    ) -> Result<Subscriber<T>>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        Subscriber::new(self, name, data, options)
    }

    pub fn interaction<T, F>(&self, callback: F) -> Result<Interaction<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) + Send + 'static,
    {
        Interaction::new(self, callback)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.inner.config)
            .field("services", &self.inner.services.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn recording() -> (Application, flume::Receiver<(String, Value)>) {
        let (tx, rx) = flume::unbounded();
        let app = Application::with_control_plane(
            Config::default().with_application_id("test"),
            move |resource: &str, body: Value| {
                tx.send((resource.to_string(), body)).ok()?;
                Some(Value::Null)
            },
        );
        (app, rx)
    }

    #[test]
    fn expose_announces_descriptor() {
        let (app, calls) = recording();
        let descriptor =
            ServiceDescriptor::new("camera", ServiceKind::Pub, DataType::new("uint8", [480, 640, 3]));
        app.expose(&descriptor).unwrap();

        let (resource, body) = calls.try_recv().unwrap();
        assert_eq!(resource, "service/expose");
        assert_eq!(body["name"], "camera");
        assert_eq!(body["type"], "pub");
        assert_eq!(body["data"]["shape"], serde_json::json!([480, 640, 3]));
        assert!(app.is_exposed(ServiceKind::Pub, "camera"));
    }

    #[test]
    fn same_name_twice_is_rejected_per_kind() {
        let (app, _calls) = recording();
        let data = DataType::scalar("float");
        app.expose(&ServiceDescriptor::new("speed", ServiceKind::Pub, data.clone()))
            .unwrap();

        let err = app
            .expose(&ServiceDescriptor::new("speed", ServiceKind::Pub, data.clone()))
            .unwrap_err();
        assert!(matches!(err, SkynetError::DuplicateService { kind: ServiceKind::Pub, .. }));

        // Same name, other kind.
        app.expose(&ServiceDescriptor::new("speed", ServiceKind::Sub, data))
            .unwrap();
        let kinds: Vec<_> = app.services().into_iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![ServiceKind::Pub, ServiceKind::Sub]);
    }

    #[test]
    fn silent_registration_skips_the_broker() {
        let (app, calls) = recording();
        let descriptor = ServiceDescriptor::new("local", ServiceKind::Sub, DataType::scalar("int"));
        app.launch(&descriptor, false, || Ok(())).unwrap();
        assert!(calls.try_recv().is_err());
        assert!(app.launch(&descriptor, false, || Ok(())).is_err());
    }

    #[test]
    fn failed_start_releases_the_name() {
        let (app, calls) = recording();
        let descriptor = ServiceDescriptor::new("odom", ServiceKind::Pub, DataType::scalar("float"));

        let err = app
            .launch(&descriptor, true, || -> Result<()> {
                Err(SkynetError::InvalidConfig("no thread".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, SkynetError::InvalidConfig(_)));
        assert!(!app.is_exposed(ServiceKind::Pub, "odom"));
        assert!(calls.try_recv().is_err());

        // The retry is not a duplicate.
        let started = app.launch(&descriptor, true, || Ok(7)).unwrap();
        assert_eq!(started, 7);
        assert!(app.is_exposed(ServiceKind::Pub, "odom"));
        assert_eq!(calls.try_recv().unwrap().0, "service/expose");
    }

    #[test]
    fn failed_announcement_is_not_fatal() {
        let app = Application::with_control_plane(Config::default(), |_: &str, _: Value| None);
        let descriptor = ServiceDescriptor::new("lidar", ServiceKind::Pub, DataType::scalar("float"));
        assert!(app.expose(&descriptor).is_ok());
    }
}

//! Service identity and registration metadata.
//!
//! A [`DataType`] describes what a service is *expected* to carry. It is sent
//! to the broker at registration time and is never checked against traffic.

use serde::{Deserialize, Serialize};

use crate::service_kind::ServiceKind;

/// Expected value shape of a service.
///
/// # Examples
///
/// ```
/// use skynet_core::service::DataType;
///
/// let image = DataType::new("uint8", [480, 640, 3]);
/// assert_eq!(image, DataType::new("uint8", vec![480, 640, 3]));
/// assert_ne!(image, DataType::new("uint8", [480, 640]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    /// Type name, e.g. `"float64"`
    pub name: String,

    /// Expected dimensions; empty for scalars
    #[serde(default)]
    pub shape: Vec<usize>,
}

impl DataType {
    /// Create a descriptor with the given name and shape.
    pub fn new(name: impl Into<String>, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
        }
    }

    /// Create a descriptor for a scalar value.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }
}

/// Everything the broker needs to know about a service.
///
/// Serializes as `{name, type, data: {name, shape}}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub data: DataType,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, kind: ServiceKind, data: DataType) -> Self {
        Self {
            name: name.into(),
            kind,
            data,
        }
    }
}

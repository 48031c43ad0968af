//! Socket hints: the immutable description of a socket.
//!
//! A hint names a socket, fixes the type of value it carries and knows how to
//! produce a fresh initial value. Operations build their hints once with
//! [`SocketHint::builder`] and hand them to [`Socket::input`] /
//! [`Socket::output`].
//!
//! [`Socket::input`]: crate::pipeline::socket::Socket::input
//! [`Socket::output`]: crate::pipeline::socket::Socket::output

use crate::error::{PipeflowError, Result};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A socket value. Cloning is cheap and shares the payload.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Runtime type tag of a socket value.
#[derive(Clone, Copy)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `value` holds exactly this type.
    pub fn matches(&self, value: &Value) -> bool {
        let any: &dyn Any = value.as_ref();
        any.type_id() == self.id
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Presentation hint for an editor. Has no effect on the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    None,
    Text,
    Slider,
    Range,
    Select,
    Checkbox,
}

type Supplier = Arc<dyn Fn() -> Value + Send + Sync>;

/// Immutable socket descriptor.
#[derive(Clone)]
pub struct SocketHint {
    identifier: String,
    value_type: ValueType,
    initial: Option<Supplier>,
    view: View,
    domain: Option<Vec<Value>>,
    publishable: bool,
}

impl SocketHint {
    pub fn builder<T>(identifier: impl Into<String>) -> SocketHintBuilder<T>
    where
        T: Any + Clone + Send + Sync,
    {
        SocketHintBuilder {
            identifier: identifier.into(),
            initial: None,
            view: View::None,
            domain: None,
            publishable: false,
            _marker: PhantomData,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn domain(&self) -> Option<&[Value]> {
        self.domain.as_deref()
    }

    /// Typed view of the domain; `None` if there is none or `T` is the wrong type.
    pub fn domain_of<T: Any + Clone>(&self) -> Option<Vec<T>> {
        self.domain
            .as_ref()?
            .iter()
            .map(|v| v.downcast_ref::<T>().cloned())
            .collect()
    }

    pub fn is_publishable(&self) -> bool {
        self.publishable
    }

    pub fn has_initial_value(&self) -> bool {
        self.initial.is_some()
    }

    /// A fresh initial value, if the hint has one.
    pub fn initial_value(&self) -> Option<Value> {
        self.initial.as_ref().map(|supply| supply())
    }

    /// A socket described by `self` can receive values from one described by `other`.
    pub fn is_compatible_with(&self, other: &SocketHint) -> bool {
        self.value_type == other.value_type
    }
}

impl fmt::Debug for SocketHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHint")
            .field("identifier", &self.identifier)
            .field("type", &self.value_type)
            .field("view", &self.view)
            .field("has_initial_value", &self.initial.is_some())
            .field("publishable", &self.publishable)
            .finish()
    }
}

/// Typed builder for [`SocketHint`].
pub struct SocketHintBuilder<T> {
    identifier: String,
    initial: Option<Supplier>,
    view: View,
    domain: Option<Vec<Value>>,
    publishable: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SocketHintBuilder<T>
where
    T: Any + Clone + Send + Sync,
{
    /// Every socket built from the hint starts with a clone of `value`.
    pub fn initial_value(mut self, value: T) -> Self {
        self.initial = Some(Arc::new(move || Arc::new(value.clone()) as Value));
        self
    }

    /// Produce initial values with `supplier`, e.g. for values that must not be shared.
    pub fn initial_value_supplier<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.initial = Some(Arc::new(move || Arc::new(supplier()) as Value));
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    pub fn domain(mut self, domain: Vec<T>) -> Self {
        self.domain = Some(
            domain
                .into_iter()
                .map(|v| Arc::new(v) as Value)
                .collect(),
        );
        self
    }

    pub fn publishable(mut self, publishable: bool) -> Self {
        self.publishable = publishable;
        self
    }

    pub fn build(self) -> Result<SocketHint> {
        if self.identifier.is_empty() {
            return Err(PipeflowError::InvalidHint {
                identifier: self.identifier,
                message: "identifier must not be empty".into(),
            });
        }
        if self.view != View::None && self.initial.is_none() {
            return Err(PipeflowError::InvalidHint {
                identifier: self.identifier,
                message: format!("a {:?} view requires an initial value", self.view),
            });
        }
        Ok(SocketHint {
            identifier: self.identifier,
            value_type: ValueType::of::<T>(),
            initial: self.initial,
            view: self.view,
            domain: self.domain,
            publishable: self.publishable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let hint = SocketHint::builder::<f64>("value").build().unwrap();
        assert_eq!(hint.identifier(), "value");
        assert_eq!(hint.view(), View::None);
        assert!(!hint.has_initial_value());
        assert!(hint.initial_value().is_none());
        assert!(!hint.is_publishable());
    }

    #[test]
    fn test_initial_value_is_fresh_each_time() {
        let hint = SocketHint::builder::<Vec<u8>>("bytes")
            .initial_value_supplier(Vec::new)
            .build()
            .unwrap();
        let a = hint.initial_value().unwrap();
        let b = hint.initial_value().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.downcast_ref::<Vec<u8>>(), Some(&Vec::new()));
    }

    #[test]
    fn test_view_requires_initial_value() {
        let err = SocketHint::builder::<f64>("threshold")
            .view(View::Slider)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipeflowError::InvalidHint { .. }));

        let ok = SocketHint::builder::<f64>("threshold")
            .view(View::Slider)
            .initial_value(0.5)
            .domain(vec![0.0, 1.0])
            .build()
            .unwrap();
        assert_eq!(ok.domain_of::<f64>(), Some(vec![0.0, 1.0]));
        assert_eq!(ok.domain_of::<i32>(), None);
    }

    #[test]
    fn test_empty_identifier_rejected() {
        assert!(SocketHint::builder::<bool>("").build().is_err());
    }

    #[test]
    fn test_compatibility_is_by_type() {
        let a = SocketHint::builder::<f64>("a").build().unwrap();
        let b = SocketHint::builder::<f64>("b").build().unwrap();
        let c = SocketHint::builder::<i64>("c").build().unwrap();
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }

    #[test]
    fn test_value_type_matches() {
        let v: Value = Arc::new(1.0f64);
        assert!(ValueType::of::<f64>().matches(&v));
        assert!(!ValueType::of::<f32>().matches(&v));
    }
}

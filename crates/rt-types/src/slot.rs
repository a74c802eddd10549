//! Capabilities through which the engine reads from and writes into the
//! host application.
//!
//! A [`Provider`] reads a value *from* the application, an [`Applier`] writes
//! a value *into* it. Both are either a shared storage [`Slot`] or a closure;
//! the variant says which, so nothing has to be inferred.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// A storage location shared between the host and the engine.
#[derive(Debug, Clone)]
pub struct Slot(Arc<RwLock<Value>>);

impl Slot {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self(Arc::new(RwLock::new(initial.into())))
    }

    pub fn get(&self) -> Value {
        *self.0.read()
    }

    pub fn set(&self, value: impl Into<Value>) {
        *self.0.write() = value.into();
    }
}

/// Reads a live value from the application.
pub enum Provider {
    Slot(Slot),
    Callable(Box<dyn FnMut() -> Value + Send>),
}

impl Provider {
    pub fn slot(slot: Slot) -> Self {
        Self::Slot(slot)
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: FnMut() -> Value + Send + 'static,
    {
        Self::Callable(Box::new(f))
    }

    pub fn read(&mut self) -> Value {
        match self {
            Self::Slot(slot) => slot.get(),
            Self::Callable(f) => f(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot(slot) => f.debug_tuple("Provider::Slot").field(slot).finish(),
            Self::Callable(_) => f.write_str("Provider::Callable"),
        }
    }
}

/// Writes a chosen value into the application.
pub enum Applier {
    Slot(Slot),
    Callable(Box<dyn FnMut(Value) + Send>),
}

impl Applier {
    pub fn slot(slot: Slot) -> Self {
        Self::Slot(slot)
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: FnMut(Value) + Send + 'static,
    {
        Self::Callable(Box::new(f))
    }

    pub fn apply(&mut self, value: Value) {
        match self {
            Self::Slot(slot) => slot.set(value),
            Self::Callable(f) => f(value),
        }
    }
}

impl fmt::Debug for Applier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot(slot) => f.debug_tuple("Applier::Slot").field(slot).finish(),
            Self::Callable(_) => f.write_str("Applier::Callable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_provider_reads_host_writes() {
        let slot = Slot::new(1.0);
        let mut provider = Provider::slot(slot.clone());
        assert_eq!(provider.read(), Value::Double(1.0));
        slot.set(4.5);
        assert_eq!(provider.read(), Value::Double(4.5));
    }

    #[test]
    fn callable_provider_is_invoked_each_read() {
        let mut n = 0i64;
        let mut provider = Provider::callable(move || {
            n += 10;
            Value::Long(n)
        });
        assert_eq!(provider.read(), Value::Long(10));
        assert_eq!(provider.read(), Value::Long(20));
    }

    #[test]
    fn appliers_write_through() {
        let slot = Slot::new(0i32);
        let mut applier = Applier::slot(slot.clone());
        applier.apply(Value::Int(8));
        assert_eq!(slot.get(), Value::Int(8));

        let seen = Slot::new(0i32);
        let sink = seen.clone();
        let mut applier = Applier::callable(move |v| sink.set(v));
        applier.apply(Value::Int(3));
        assert_eq!(seen.get(), Value::Int(3));
        assert_eq!(format!("{applier:?}"), "Applier::Callable");
    }
}

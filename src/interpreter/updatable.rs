//! Shared mutable cells with change listeners.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::context::Context;
use super::value::Value;

/// Observer of an updatable cell
pub trait ValueListener: Send + Sync + fmt::Debug {
    fn changed(&self, value: &Value);
}

#[derive(Debug)]
struct Cell {
    id: u64,
    value: RwLock<Value>,
    listeners: RwLock<Vec<Arc<dyn ValueListener>>>,
}

/// A state variable or instance variable.
///
/// Clones share the cell. Inside an atomic section listener notifications
/// are deferred until the section ends.
#[derive(Debug, Clone)]
pub struct UpdatableValue {
    cell: Arc<Cell>,
}

impl UpdatableValue {
    pub fn new(value: Value) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            cell: Arc::new(Cell {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                value: RwLock::new(value),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.cell.id
    }

    pub fn get(&self) -> Value {
        self.cell
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the content and notify listeners
    pub fn set(&self, value: Value, ctx: &Context<'_>) {
        *self.cell.value.write().unwrap_or_else(PoisonError::into_inner) = value.clone();
        let thread = ctx.thread();
        if thread.in_atomic() {
            thread.defer_notification(self.clone());
        } else {
            self.notify(&value);
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ValueListener>) {
        self.cell
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub(crate) fn notify_current(&self) {
        self.notify(&self.get());
    }

    fn notify(&self, value: &Value) {
        let listeners = self
            .cell
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.changed(value);
        }
    }
}

//! In-process publish/subscribe hub announcing that a cell was written.
//!
//! Handlers run synchronously, in registration order, on the publishing thread. A handler that
//! fails or panics is logged and skipped; the remaining handlers still run. Every subscription
//! is tied to a [`Subscription`] guard and is removed when the guard is dropped, so an event
//! stream that goes away for any reason takes its handler with it.

use leptos::logging::warn;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::HandlerError;

/// A cell that was just upserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellChange {
    pub room_id: String,
    pub cell_id: String,
    pub row: i32,
    pub col: i32,
    pub value: String,
}

type Handler = Arc<dyn Fn(&CellChange) -> Result<(), HandlerError> + Send + Sync>;

struct Registration {
    id: u64,
    // None receives changes from every room.
    room_id: Option<String>,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    // Ids are monotonic so removal stays exact even after earlier handlers are gone.
    next_id: u64,
    handlers: Vec<Registration>,
}

/// Outcome of one [`ChangeNotifier::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Process-wide change hub. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Mutex<Registry>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Handlers never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for changes in every room.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CellChange) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    /// Registers a handler that only sees changes made in `room_id`.
    pub fn subscribe_room<F>(&self, room_id: &str, handler: F) -> Subscription
    where
        F: Fn(&CellChange) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(Some(room_id.to_string()), Arc::new(handler))
    }

    fn register(&self, room_id: Option<String>, handler: Handler) -> Subscription {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.push(Registration {
            id,
            room_id,
            handler,
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invokes every matching handler once, in registration order.
    pub fn publish(&self, change: &CellChange) -> PublishOutcome {
        // Snapshot first: handlers may subscribe or unsubscribe while running.
        let handlers: Vec<(u64, Handler)> = lock(&self.registry)
            .handlers
            .iter()
            .filter(|registration| {
                registration
                    .room_id
                    .as_deref()
                    .map_or(true, |room_id| room_id == change.room_id)
            })
            .map(|registration| (registration.id, Arc::clone(&registration.handler)))
            .collect();

        let mut outcome = PublishOutcome::default();
        for (id, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(change)))
                .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&payload))));
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    warn!("Change handler {} failed for cell {}: {}", id, change.cell_id, e);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// Removes a handler by id. Unknown ids are ignored. Returns whether anything was removed.
    pub fn unsubscribe(&self, id: u64) -> bool {
        remove(&self.registry, id)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).handlers.len()
    }
}

fn remove(registry: &Mutex<Registry>, id: u64) -> bool {
    let mut registry = lock(registry);
    let before = registry.handlers.len();
    registry.handlers.retain(|registration| registration.id != id);
    registry.handlers.len() != before
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Keeps a handler registered. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, self.id);
        }
    }
}

//! Typed pub/sub used by [`crate::roster::Roster`] and [`crate::device::DeviceSession`] to
//! notify subscribers without coupling them to a concrete channel type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::errors::Error;
use crate::utils::task;

type Callback =
    dyn FnMut(Arc<dyn Any + Send + Sync>) -> BoxFuture<'static, Result<(), Error>> + Send;
pub type EventHandler = usize;

struct CallbackWrapper {
    id: EventHandler,
    callback: Box<Callback>,
}

type SyncedCallbackMap = Mutex<HashMap<String, Vec<CallbackWrapper>>>;

/// A cloneable, type-erased event bus: handlers registered with [`EventManager::on`] are
/// matched against the payload type given to [`EventManager::emit`], and silently skipped
/// on mismatch.
#[derive(Clone, Default)]
pub struct EventManager {
    callbacks: Arc<SyncedCallbackMap>,
    next_id: Arc<AtomicUsize>,
}

impl EventManager {
    /// Registers a handler for `event`. The callback's argument type determines which
    /// `emit` calls it will receive: only payloads of the exact same type are dispatched.
    pub fn on<S, F, T, Fut>(&self, event: S, mut callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
    {
        let event_name = event.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let boxed_callback =
            Box::new(
                move |arg: Arc<dyn Any + Send + Sync>| match arg.downcast::<T>() {
                    Ok(arg) => callback((*arg).clone()).boxed(),
                    Err(_) => Box::pin(async { Ok(()) }),
                },
            );

        self.callbacks
            .lock()
            .entry(event_name)
            .or_default()
            .push(CallbackWrapper {
                id,
                callback: boxed_callback,
            });

        id
    }

    /// Invokes every handler registered for `event` whose payload type matches, each on its
    /// own spawned task so a slow subscriber never blocks the emitter.
    pub fn emit<S, T>(&self, event: S, payload: T)
    where
        S: Into<String>,
        T: 'static + Send + Sync,
    {
        let payload_any: Arc<dyn Any + Send + Sync> = Arc::new(payload);
        if let Some(callbacks) = self.callbacks.lock().get_mut(&event.into()) {
            for wrapper in callbacks.iter_mut() {
                let future = (wrapper.callback)(payload_any.clone());
                task::fire(async move {
                    let _ = future.await;
                });
            }
        }
    }

    /// Removes a previously registered handler. No-op if it's already gone.
    pub fn unregister(&self, handler: EventHandler) {
        self.callbacks
            .lock()
            .values_mut()
            .for_each(|v| v.retain(|cb| cb.id != handler));
    }
}

impl Debug for EventManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.callbacks.lock().len() {
            1 => write!(f, "EventManager: 1 registered callback"),
            count => write!(f, "EventManager: {count} registered callbacks"),
        }
    }
}

//! A small many-to-many callback multicast, standing in for the source's signal/slot mechanism.
// (c) 2026 nuke-ms contributors

use std::sync::Mutex;

/// A list of subscriber callbacks for one signal, with thread-safe emission.
///
/// Emission may happen from the reactor thread (when a background task completes and reports a
/// result) or from an application thread (for the synchronous `InvalidLocation` case in
/// [`ClientNode::connect_to`](super::ClientNode::connect_to)); callers are expected to be
/// thread-safe, exactly as the source's signal emission contract requires.
pub struct SignalHub<T> {
    subscribers: Mutex<Vec<Box<dyn Fn(T) + Send + Sync>>>,
}

impl<T> Default for SignalHub<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> SignalHub<T> {
    /// Registers a new subscriber. Subscribers are never unregistered individually; the whole
    /// hub is dropped with its owner.
    pub fn subscribe(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Invokes every subscriber with a clone of `payload`, in subscription order.
    pub fn emit(&self, payload: T) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for callback in subscribers.iter() {
            callback(payload.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emits_to_every_subscriber_in_order() {
        let hub: SignalHub<u32> = SignalHub::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |v| seen.lock().unwrap().push(v));
        }
        hub.emit(42);
        assert_eq!(*seen.lock().unwrap(), vec![42, 42, 42]);
    }

    #[test]
    fn counts_emissions() {
        let hub: SignalHub<()> = SignalHub::default();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        hub.subscribe(move |()| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        hub.emit(());
        hub.emit(());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}

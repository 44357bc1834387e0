use std::sync::Mutex;

/// One-way subscription point. Observers are invoked in registration order
/// on the notifying thread.
pub struct ObserverSet<T> {
    observers: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> ObserverSet<T> {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, observer: impl Fn(&T) + Send + Sync + 'static) {
        self.observers.lock().unwrap().push(Box::new(observer));
    }

    pub fn notify(&self, value: &T) {
        let observers = self.observers.lock().unwrap();
        for observer in observers.iter() {
            observer(value);
        }
    }
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notify_all_observers() {
        let observers = ObserverSet::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_l = calls.clone();
        observers.add(move |value| {
            assert_eq!(*value, 7);
            calls_l.fetch_add(1, Ordering::SeqCst);
        });
        let calls_l = calls.clone();
        observers.add(move |_| {
            calls_l.fetch_add(1, Ordering::SeqCst);
        });

        observers.notify(&7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

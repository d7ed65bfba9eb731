use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// A shared mutex, without the poisoning.
#[derive(Debug)]
pub struct Lock<T> {
	inner: Arc<Mutex<T>>,
}

impl<T> Lock<T> {
	pub fn new(value: T) -> Self {
		Self {
			inner: Arc::new(Mutex::new(value)),
		}
	}

	pub fn lock(&self) -> MutexGuard<'_, T> {
		self.inner.lock().unwrap()
	}

	pub fn downgrade(&self) -> LockWeak<T> {
		LockWeak {
			inner: Arc::downgrade(&self.inner),
		}
	}
}

impl<T> Clone for Lock<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Default> Default for Lock<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

/// A weak reference to a [Lock], used to break ownership cycles.
#[derive(Debug)]
pub struct LockWeak<T> {
	inner: Weak<Mutex<T>>,
}

impl<T> LockWeak<T> {
	pub fn upgrade(&self) -> Option<Lock<T>> {
		self.inner.upgrade().map(|inner| Lock { inner })
	}
}

impl<T> Clone for LockWeak<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

use std::{collections::VecDeque, sync::Arc};

use tokio::sync::Notify;

use super::Lock;

/// An unbounded queue that can be closed with an error.
///
/// Once closed, every [Queue::push] and [Queue::pop] returns the error.
#[derive(Debug)]
pub struct Queue<T, E: Clone> {
	state: Lock<State<T, E>>,
	notify: Arc<Notify>,
}

#[derive(Debug)]
struct State<T, E: Clone> {
	queue: VecDeque<T>,
	closed: Result<(), E>,
}

impl<T, E: Clone> Clone for Queue<T, E> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
			notify: self.notify.clone(),
		}
	}
}

impl<T, E: Clone> Default for Queue<T, E> {
	fn default() -> Self {
		Self {
			state: Lock::new(State {
				queue: VecDeque::new(),
				closed: Ok(()),
			}),
			notify: Default::default(),
		}
	}
}

impl<T, E: Clone> Queue<T, E> {
	pub fn push(&self, item: T) -> Result<(), E> {
		let mut state = self.state.lock();
		state.closed.clone()?;
		state.queue.push_back(item);
		drop(state);

		self.notify.notify_waiters();
		Ok(())
	}

	pub async fn pop(&self) -> Result<T, E> {
		loop {
			let notify = self.notify.notified();
			tokio::pin!(notify);

			// Register interest before checking, so a concurrent push is not lost.
			notify.as_mut().enable();

			{
				let mut state = self.state.lock();
				if let Some(item) = state.queue.pop_front() {
					return Ok(item);
				}
				state.closed.clone()?;
			}

			notify.await;
		}
	}

	pub fn close(&self, err: E) -> Result<(), E> {
		let mut state = self.state.lock();
		state.closed.clone()?;
		state.closed = Err(err);
		drop(state);

		self.notify.notify_waiters();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn push_pop() {
		let queue = Queue::<u32, String>::default();
		queue.push(1).unwrap();
		queue.push(2).unwrap();

		assert_eq!(queue.pop().await, Ok(1));
		assert_eq!(queue.pop().await, Ok(2));
	}

	#[tokio::test]
	async fn closed() {
		let queue = Queue::<u32, String>::default();
		queue.close("broken".to_string()).unwrap();

		assert!(queue.push(1).is_err());
		assert_eq!(queue.pop().await, Err("broken".to_string()));
	}

	#[tokio::test]
	async fn pop_waits_for_push() {
		let queue = Queue::<u32, String>::default();

		let popper = queue.clone();
		let handle = tokio::spawn(async move { popper.pop().await });

		tokio::task::yield_now().await;
		queue.push(7).unwrap();

		assert_eq!(handle.await.unwrap(), Ok(7));
	}
}

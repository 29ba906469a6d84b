//! Bounded observer lists for decoded broadcasts.
use heapless::Vec;

use crate::error::SubscribeError;

/// Default number of observers per event type.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 4;

/// Callbacks run in the receive context after the state lock is released.
/// They must return quickly and must not block.
pub type Callback<'a, T> = &'a (dyn Fn(&T) + Sync);

pub struct Subscribers<'a, T, const N: usize = DEFAULT_MAX_SUBSCRIBERS> {
    list: Vec<Callback<'a, T>, N>,
}

impl<'a, T, const N: usize> Default for Subscribers<'a, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, const N: usize> Subscribers<'a, T, N> {
    pub const fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn subscribe(&mut self, callback: Callback<'a, T>) -> Result<(), SubscribeError> {
        self.list
            .push(callback)
            .map_err(|_| SubscribeError::ListFull { max: N })
    }

    /// Call every observer in registration order.
    pub fn notify(&self, value: &T) {
        for callback in &self.list {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

//! # Borrowed handle to a managed value.

use std::any::type_name;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::caller::Caller;
use crate::managed::lease::Lease;

/// A lease on a managed value, or an invalid handle if borrowing failed.
///
/// Call [`release`](Borrowed::release) when done; releasing twice is a no-op.
/// A valid handle dropped without release is released anyway and reported
/// through [`Caller::reference_leaked`].
pub struct Borrowed<T> {
    lease: Option<Arc<Lease<T>>>,
    released: AtomicBool,
    caller: Arc<dyn Caller>,
    stack: Option<Arc<Backtrace>>,
}

impl<T> Borrowed<T> {
    pub(crate) fn valid(lease: Arc<Lease<T>>, caller: Arc<dyn Caller>, capture_stack: bool) -> Self {
        Self {
            lease: Some(lease),
            released: AtomicBool::new(false),
            caller,
            stack: capture_stack.then(|| Arc::new(Backtrace::force_capture())),
        }
    }

    pub(crate) fn invalid(caller: Arc<dyn Caller>) -> Self {
        Self {
            lease: None,
            released: AtomicBool::new(true),
            caller,
            stack: None,
        }
    }

    /// Returns `true` while the handle holds an unreleased lease.
    pub fn is_valid(&self) -> bool {
        self.lease.is_some() && !self.released.load(Ordering::Acquire)
    }

    /// The borrowed value, or `None` if the handle is invalid or released.
    pub fn get(&self) -> Option<&T> {
        if self.released.load(Ordering::Acquire) {
            return None;
        }
        self.lease.as_deref().map(Lease::value)
    }

    /// Gives the lease back. Only the first call has an effect.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(lease) = &self.lease {
            lease.release();
        }
    }
}

impl<T> Drop for Borrowed<T> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(lease) = &self.lease {
            lease.release();
            let reference = format!("Borrowed<{}>", type_name::<T>());
            self.caller.reference_leaked(&reference, self.stack.take());
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Borrowed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Borrowed")
            .field("value", &self.get())
            .field("valid", &self.is_valid())
            .finish()
    }
}

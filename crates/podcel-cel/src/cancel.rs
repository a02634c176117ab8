use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation checked before each rule.
///
/// [`CancelHandle::never`] carries no flag, so checking it is a branch on
/// `None`.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Option<Arc<AtomicBool>>,
}

impl CancelHandle {
    /// A handle that is never cancelled.
    pub fn never() -> Self {
        Self { flag: None }
    }

    /// A cancellable handle; clones share the same flag.
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ApplicationError;

/// Cooperative cancellation flag shared between a job and whoever started it.
/// Jobs poll it between phases; an in-flight pixel operation is never
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ApplicationError> {
        if self.is_cancelled() {
            return Err(ApplicationError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());

        token.cancel();

        assert!(observer.is_cancelled());
        assert!(matches!(observer.check(), Err(ApplicationError::Cancelled)));
    }
}

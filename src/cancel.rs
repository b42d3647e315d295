use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lets another thread abandon an in-flight store or resync.
///
/// Cancellation is checked around the transport exchange. A cancelled call returns
/// [`Error::Cancelled`](crate::error::Error::Cancelled) and leaves the session's local state as
/// it was before the call. Whether the server already acted on the command is up to the
/// transport.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone of this token observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(crate::error::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(crate::error::Error::Cancelled)));
    }
}

use anyhow::{Result, anyhow};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared flag that abandons an in-flight chapter load.
///
/// Clones observe the same flag, so the reader can cancel a load it handed to
/// a worker when the user navigates away.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Error out when cancelled; `stage` names the pipeline step for logs.
    pub fn check_cancelled(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(anyhow!("chapter load cancelled at stage={stage}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_cancel_flag() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(worker.check_cancelled("fetch").is_ok());

        token.cancel();
        assert!(worker.is_cancelled());
        let err = worker.check_cancelled("normalize").expect_err("cancelled");
        assert!(err.to_string().contains("stage=normalize"));
    }
}

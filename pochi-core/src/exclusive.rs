use std::future::Future;

use tokio::sync::Mutex;

/// Runs async sections one at a time, in the order they asked to run.
///
/// Every operation that reads or reshapes the editor grid goes through the
/// same group so a validation can never observe a half-applied layout.
#[derive(Debug, Default)]
pub struct ExclusiveGroup {
    lock: Mutex<()>,
}

impl ExclusiveGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, T>(&self, section: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        section.await
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

//! Background work with a surfaced result
//!
//! Cache regeneration and exports run on their own thread. The caller keeps
//! a [`BackgroundTask`] and decides when to wait for it; failures come back
//! through [`BackgroundTask::join`] instead of being dropped.

use std::thread::{self, JoinHandle};

use crate::CloudError;

/// Handle to a named worker thread producing `Result<T, CloudError>`
#[derive(Debug)]
pub struct BackgroundTask<T> {
    name: String,
    handle: JoinHandle<Result<T, CloudError>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Start `work` on a new named thread
    pub fn spawn<F>(name: impl Into<String>, work: F) -> Result<Self, CloudError>
    where
        F: FnOnce() -> Result<T, CloudError> + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new()
            .name(format!("cloudproj-{}", name))
            .spawn(work)?;
        log::debug!("Started background task '{}'", name);
        Ok(Self { name, handle })
    }
}

impl<T> BackgroundTask<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the worker has returned (successfully or not)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker finishes and return its result
    pub fn join(self) -> Result<T, CloudError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(CloudError::TaskPanicked(self.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_returns_value() {
        let task = BackgroundTask::spawn("sum", || Ok(1 + 2)).unwrap();
        assert_eq!(task.name(), "sum");
        assert_eq!(task.join().unwrap(), 3);
    }

    #[test]
    fn test_join_surfaces_error() {
        let task: BackgroundTask<()> =
            BackgroundTask::spawn("fail", || Err(CloudError::Parse("broken".into()))).unwrap();
        assert!(matches!(task.join(), Err(CloudError::Parse(_))));
    }

    #[test]
    fn test_join_surfaces_panic() {
        let task: BackgroundTask<()> =
            BackgroundTask::spawn("panics", || panic!("worker died")).unwrap();
        match task.join() {
            Err(CloudError::TaskPanicked(name)) => assert_eq!(name, "panics"),
            other => panic!("Expected TaskPanicked, got {:?}", other),
        }
    }

    #[test]
    fn test_is_finished_after_join_point() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let task = BackgroundTask::spawn("wait", move || {
            rx.recv().ok();
            Ok(())
        })
        .unwrap();
        assert!(!task.is_finished());
        tx.send(()).unwrap();
        task.join().unwrap();
    }
}

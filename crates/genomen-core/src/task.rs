//! Task bookkeeping in the backing store.

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::request::TaskState;

/// Records tasks and the samples they own so task-scoped data can be
/// released afterwards.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn task_exists(&self, task_id: &str) -> genomen_common::Result<bool>;

    async fn create_task(&self, task_id: &str) -> genomen_common::Result<()>;

    async fn change_state(&self, task_id: &str, state: TaskState) -> genomen_common::Result<()>;

    async fn add_sample(&self, task_id: &str, sample_id: &str) -> genomen_common::Result<()>;

    /// Drop the task together with every sample and attribute it imported.
    async fn clear_task_data(&self, task_id: &str) -> genomen_common::Result<()>;

    /// Drop only the task record; imported samples stay available.
    async fn remove_task(&self, task_id: &str) -> genomen_common::Result<()>;
}

/// Random id of uppercase ASCII letters.
pub fn random_task_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect()
}

/// Generate ids until the repository reports one as unused.
pub async fn generate_task_id(repo: &dyn TaskRepository, length: usize) -> genomen_common::Result<String> {
    loop {
        let candidate = random_task_id(length);
        if !repo.task_exists(&candidate).await? {
            return Ok(candidate);
        }
        debug!(task_id = %candidate, "Task id collision, retrying");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports the first `collisions` candidates as taken.
    struct Colliding {
        collisions: usize,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl TaskRepository for Colliding {
        async fn task_exists(&self, _task_id: &str) -> genomen_common::Result<bool> {
            let n = self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(n < self.collisions)
        }
        async fn create_task(&self, _: &str) -> genomen_common::Result<()> { Ok(()) }
        async fn change_state(&self, _: &str, _: TaskState) -> genomen_common::Result<()> { Ok(()) }
        async fn add_sample(&self, _: &str, _: &str) -> genomen_common::Result<()> { Ok(()) }
        async fn clear_task_data(&self, _: &str) -> genomen_common::Result<()> { Ok(()) }
        async fn remove_task(&self, _: &str) -> genomen_common::Result<()> { Ok(()) }
    }

    #[test]
    fn test_random_id_shape() {
        let id = random_task_id(10);
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_retries_until_unused() {
        let repo = Colliding { collisions: 25, asked: AtomicUsize::new(0) };
        let id = tokio_test::block_on(generate_task_id(&repo, 10)).unwrap();
        assert_eq!(id.len(), 10);
        assert_eq!(repo.asked.load(Ordering::SeqCst), 26);
    }
}

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    task::{JoinError, JoinHandle},
    time::Duration,
};

/// A future spawned now but held back until a point in time.
///
/// Once that time arrives it runs to completion on its own. Before then it
/// can be cancelled.
pub struct ScheduledTask<T> {
    task: JoinHandle<T>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Run `task` at `run_at`, or straight away if that is in the past.
    pub fn at<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let delay = until(run_at);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await
        });
        Self { task }
    }

    /// Abort the task. Returns true iff it had already finished.
    pub async fn cancel(self) -> bool {
        self.task.abort();
        self.task.await.is_ok()
    }
}

impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx)
    }
}

/// Time left until `at`, zero if it has passed.
fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;

    #[test]
    fn past_times_are_due_immediately() {
        assert_eq!(until(Utc::now() - ChronoDuration::hours(1)), Duration::ZERO);
        assert!(until(Utc::now() + ChronoDuration::hours(1)) > Duration::from_secs(3500));
    }

    #[rocket::async_test]
    async fn runs_at_the_scheduled_time() {
        let task = ScheduledTask::at(async { 7 }, Utc::now() + ChronoDuration::milliseconds(20));
        assert_eq!(task.await.unwrap(), 7);
    }

    #[rocket::async_test]
    async fn cancelled_tasks_never_run() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::at(
            async move { flag.store(true, Ordering::SeqCst) },
            Utc::now() + ChronoDuration::milliseconds(50),
        );
        assert!(!task.cancel().await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}

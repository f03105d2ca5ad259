use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use super::{EndCause, PhaseEnd};

/// The single timer of the current phase instance.
///
/// Arming replaces any running timer. Cancelling aborts the sleeping task, so
/// a cancelled timer never posts; a timer that already posted is filtered out
/// by the generation check in the controller.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    task: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

impl PhaseTimer {
    pub fn arm(&mut self, generation: u64, duration: Duration, tx: mpsc::UnboundedSender<PhaseEnd>) {
        self.cancel();
        let deadline = Instant::now() + duration;
        self.deadline = Some(deadline);
        self.task = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            trace!(generation, "phase timer fired");
            let _ = tx.send(PhaseEnd { generation, cause: EndCause::Timer });
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Time left before the timer fires, if one is armed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once_with_its_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PhaseTimer::default();
        timer.arm(7, Duration::from_secs(5), tx);
        assert_eq!(timer.remaining(), Some(Duration::from_secs(5)));

        let end = rx.recv().await.unwrap();
        assert_eq!(end, PhaseEnd { generation: 7, cause: EndCause::Timer });
        drop(timer);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_posts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PhaseTimer::default();
        timer.arm(1, Duration::from_secs(5), tx.clone());
        timer.cancel();
        assert!(!timer.is_armed());
        assert_eq!(timer.remaining(), None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PhaseTimer::default();
        timer.arm(1, Duration::from_secs(5), tx.clone());
        timer.arm(2, Duration::from_secs(8), tx);

        let end = rx.recv().await.unwrap();
        assert_eq!(end.generation, 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}

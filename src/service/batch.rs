//! Bounded worker pool for bulk QR generation.
//!
//! At most `concurrency` tasks are in flight. Whenever one finishes, successful or not, the
//! next one is launched until `count` tasks have run. Failures are counted and logged but
//! never cancel siblings.

use crate::error::app_error::AppError;
use crate::models::qr_code::{GeneratedQrCode, QrCodeFields};
use crate::service::qr_code::QrCodeFactory;
use std::future::Future;
use tokio::task::JoinSet;
use uuid::Uuid;

#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Completion order, not launch order.
    pub items: Vec<T>,
    pub failed: usize,
}

impl<T> BatchOutcome<T> {
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }
}

pub async fn run_bounded<T, F, Fut>(count: usize, concurrency: usize, mut make_task: F) -> BatchOutcome<T>
where
    T: Send + 'static,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AppError>> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let mut in_flight = JoinSet::new();
    let mut launched = 0;
    let mut outcome = BatchOutcome {
        items: Vec::with_capacity(count),
        failed: 0,
    };

    while launched < count.min(concurrency) {
        in_flight.spawn(make_task(launched));
        launched += 1;
    }

    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok(Ok(item)) => outcome.items.push(item),
            Ok(Err(e)) => {
                outcome.failed += 1;
                tracing::error!(error = %e, detail = ?e, "batch task failed");
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::error!(error = %e, "batch task panicked or was cancelled");
            }
        }

        if launched < count {
            in_flight.spawn(make_task(launched));
            launched += 1;
        }
    }

    outcome
}

pub async fn generate_batch(
    factory: &QrCodeFactory,
    count: usize,
    concurrency: usize,
    owner: Option<Uuid>,
    template: &QrCodeFields,
) -> BatchOutcome<GeneratedQrCode> {
    let outcome = run_bounded(count, concurrency, |_| {
        let factory = factory.clone();
        let fields = template.clone();
        async move { factory.create(owner, fields).await }
    })
    .await;

    tracing::info!(requested = count, generated = outcome.items.len(), failed = outcome.failed, "qr batch finished");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockQrCodeRepository, MockStorage, test_factory};
    use crate::database::qr_code::QrCodeRepository;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct TaskCounters {
        launched: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    async fn counted_run(count: usize, concurrency: usize, failing: &'static [usize]) -> (BatchOutcome<usize>, Arc<TaskCounters>) {
        let counters = Arc::new(TaskCounters::default());
        let outcome = run_bounded(count, concurrency, |index| {
            let counters = counters.clone();
            async move {
                counters.launched.fetch_add(1, Ordering::SeqCst);
                let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

                // uneven latencies so completions interleave
                tokio::time::sleep(Duration::from_millis(5 + (index as u64 * 7) % 13)).await;

                counters.in_flight.fetch_sub(1, Ordering::SeqCst);
                if failing.contains(&index) {
                    Err(AppError::storage(format!("upload {} failed", index)))
                } else {
                    Ok(index)
                }
            }
        })
        .await;
        (outcome, counters)
    }

    #[tokio::test]
    async fn seven_tasks_three_at_a_time_with_two_failures() {
        let (outcome, counters) = counted_run(7, 3, &[1, 4]).await;

        assert_eq!(counters.launched.load(Ordering::SeqCst), 7);
        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.items.len(), 5);
        assert_eq!(outcome.failed, 2);
        assert!(!outcome.is_complete_success());

        let mut items = outcome.items.clone();
        items.sort_unstable();
        assert_eq!(items, vec![0, 2, 3, 5, 6]);
    }

    #[tokio::test]
    async fn fewer_tasks_than_workers() {
        let (outcome, counters) = counted_run(2, 10, &[]).await;
        assert_eq!(counters.launched.load(Ordering::SeqCst), 2);
        assert!(counters.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert!(outcome.is_complete_success());
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let (outcome, counters) = counted_run(3, 0, &[]).await;
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_survives_individual_upload_failures() {
        let repo = Arc::new(MockQrCodeRepository::default());
        let storage = Arc::new(MockStorage::failing_every(3));
        let factory = test_factory(repo.clone(), storage.clone());
        let template = QrCodeFields {
            category: Some("Hund".to_string()),
            ..QrCodeFields::default()
        };

        let outcome = generate_batch(&factory, 9, 4, None, &template).await;

        assert_eq!(outcome.items.len() + outcome.failed, 9);
        assert_eq!(outcome.failed, 3);
        assert_eq!(repo.len(), 6);
        for item in &outcome.items {
            assert_eq!(item.password.len(), 6);
            let stored = repo.get_qr_code(&item.id).await.unwrap().unwrap();
            assert_eq!(stored.category.as_deref(), Some("Hund"));
        }

        let response = crate::models::dashboard::BatchResponse::from_outcome(outcome, 9);
        assert!(!response.success);
        assert_eq!(response.count, 6);
        assert_eq!(response.message, "6 von 9 QR-Codes erstellt, 3 fehlgeschlagen");
    }
}

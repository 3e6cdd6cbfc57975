use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use cosdesk_core::AppResult;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct FetchState<T> {
    sequence: u64,
    token: Option<CancellationToken>,
    rows: Vec<T>,
    loading: bool,
}

/// Latest-wins fetch coordinator for a table screen.
///
/// Each [`issue`](Self::issue) cancels the previous fetch and takes a new
/// sequence number. Only the fetch holding the latest number may write rows
/// or clear the loading flag, so a late response never overwrites newer state.
#[derive(Debug)]
pub struct LatestFetch<T> {
    state: Arc<Mutex<FetchState<T>>>,
}

impl<T> Clone for LatestFetch<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for LatestFetch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestFetch<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FetchState {
                sequence: 0,
                token: None,
                rows: Vec::new(),
                loading: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FetchState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `fetch` as the newest request.
    ///
    /// Returns `Ok(true)` when the rows were replaced and `Ok(false)` when a
    /// newer request superseded this one (its outcome, error or not, is
    /// dropped). Errors of the latest request are returned and leave the
    /// previous rows in place.
    pub async fn issue<F, Fut>(&self, fetch: F) -> AppResult<bool>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = AppResult<Vec<T>>>,
    {
        let (sequence, token) = {
            let mut state = self.lock();
            if let Some(previous) = state.token.take() {
                previous.cancel();
            }
            state.sequence += 1;
            state.loading = true;
            let token = CancellationToken::new();
            state.token = Some(token.clone());
            (state.sequence, token)
        };

        let result = fetch(token).await;

        let mut state = self.lock();
        if state.sequence != sequence {
            tracing::debug!(sequence, latest = state.sequence, "Dropping superseded fetch");
            return Ok(false);
        }
        state.loading = false;
        state.token = None;
        let rows = result?;
        state.rows = rows;
        Ok(true)
    }

    /// Cancel the in-flight fetch; its result will be dropped.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.sequence += 1;
        state.loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }
}

impl<T: Clone> LatestFetch<T> {
    pub fn rows(&self) -> Vec<T> {
        self.lock().rows.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosdesk_core::AppError;
    use std::time::Duration;

    async fn respond(rows: Vec<u32>, delay_ms: u64) -> AppResult<Vec<u32>> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(rows)
    }

    #[tokio::test]
    async fn latest_wins_when_earlier_response_arrives_last() {
        let fetch = LatestFetch::new();

        // The first fetch ignores its token and answers after the second.
        let first = fetch.issue(|_token| respond(vec![1], 100));
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fetch.issue(|_token| respond(vec![2], 10)).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(!first.unwrap());
        assert_eq!(second.unwrap(), true);
        assert_eq!(fetch.rows(), vec![2]);
        assert!(!fetch.is_loading());
    }

    #[tokio::test]
    async fn latest_wins_when_responses_arrive_in_order() {
        let fetch = LatestFetch::new();

        let first = fetch.issue(|_token| respond(vec![1], 5));
        let second = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            fetch.issue(|_token| respond(vec![2], 5)).await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.unwrap());
        assert!(second.unwrap());
        assert_eq!(fetch.rows(), vec![2]);
    }

    #[tokio::test]
    async fn new_issue_cancels_previous_token() {
        let fetch = LatestFetch::<u32>::new();

        let first = fetch.issue(|token| async move {
            token.cancelled().await;
            Err(AppError::Cancelled)
        });
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fetch.issue(|_token| respond(vec![7], 0)).await
        };
        let (first, second) = tokio::join!(first, second);

        // The cancelled fetch is superseded, so its error is swallowed.
        assert!(!first.unwrap());
        assert!(second.unwrap());
        assert_eq!(fetch.rows(), vec![7]);
    }

    #[tokio::test]
    async fn latest_error_keeps_rows_and_clears_loading() {
        let fetch = LatestFetch::new();
        fetch.issue(|_| respond(vec![1, 2], 0)).await.unwrap();

        let err = fetch
            .issue(|_| async { Err::<Vec<u32>, _>(AppError::backend(500, "boom")) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(fetch.rows(), vec![1, 2]);
        assert!(!fetch.is_loading());
    }

    #[tokio::test]
    async fn cancel_drops_in_flight_result() {
        let fetch = LatestFetch::new();
        let handle = {
            let fetch = fetch.clone();
            tokio::spawn(async move { fetch.issue(|_| respond(vec![9], 50)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        fetch.cancel();

        assert!(!handle.await.unwrap().unwrap());
        assert!(fetch.rows().is_empty());
        assert!(!fetch.is_loading());
    }
}

use std::ops::Range;

use serde::Serialize;

pub const DEFAULT_BATCH_SIZE: usize = 256;
pub const DEFAULT_LOG_TOP_N: usize = 10;
pub const UNKNOWN_FAILURE: &str = "unknown_failure";

#[derive(Debug, Clone, Copy, Default, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ScanControllerError {
    #[error("batch_size must be >= 1")]
    InvalidBatchSize,
    #[error("scan is not running")]
    NotRunning,
    #[error("retry context is unavailable")]
    RetryUnavailable,
}

#[derive(Debug, Clone)]
struct ScanRequest<T> {
    items: Vec<T>,
    batch_size: usize,
    log_top_n: usize,
}

/// Batches a scan over `items` for a single driving caller.
///
/// The last accepted request is kept so a finished, cancelled or failed scan
/// can be replayed with [`ScanController::retry`].
#[derive(Debug, Clone)]
pub struct ScanController<T> {
    phase: ScanPhase,
    items: Vec<T>,
    batch_size: usize,
    log_top_n: usize,
    next_index: usize,
    last_failure_reason: String,
    retry_request: Option<ScanRequest<T>>,
}

impl<T> Default for ScanController<T> {
    fn default() -> Self {
        Self {
            phase: ScanPhase::Idle,
            items: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            log_top_n: DEFAULT_LOG_TOP_N,
            next_index: 0,
            last_failure_reason: String::new(),
            retry_request: None,
        }
    }
}

impl<T: Clone> ScanController<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns an error when `batch_size` is zero.
    pub fn start(
        &mut self,
        items: Vec<T>,
        batch_size: usize,
        log_top_n: usize,
    ) -> Result<(), ScanControllerError> {
        if batch_size == 0 {
            return Err(ScanControllerError::InvalidBatchSize);
        }
        let request = ScanRequest {
            items,
            batch_size,
            log_top_n,
        };
        self.retry_request = Some(request.clone());
        self.run(request);
        Ok(())
    }

    /// Replay the last accepted request from the beginning.
    ///
    /// # Errors
    /// Returns an error while a scan is running or when nothing was started
    /// since the retry context was last cleared.
    pub fn retry(&mut self) -> Result<(), ScanControllerError> {
        if !self.can_retry() {
            return Err(ScanControllerError::RetryUnavailable);
        }
        let Some(request) = self.retry_request.clone() else {
            return Err(ScanControllerError::RetryUnavailable);
        };
        self.run(request);
        Ok(())
    }

    fn run(&mut self, request: ScanRequest<T>) {
        self.items = request.items;
        self.batch_size = request.batch_size;
        self.log_top_n = request.log_top_n;
        self.next_index = 0;
        self.phase = ScanPhase::Running;
        self.last_failure_reason.clear();
    }

    /// # Errors
    /// Returns an error unless a scan is running.
    pub fn cancel(&mut self) -> Result<(), ScanControllerError> {
        if self.phase != ScanPhase::Running {
            return Err(ScanControllerError::NotRunning);
        }
        self.phase = ScanPhase::Cancelled;
        Ok(())
    }

    /// Next index range to process, or `None` when not running or drained.
    pub fn dequeue_batch(&mut self) -> Option<Range<usize>> {
        if self.phase != ScanPhase::Running || self.next_index >= self.items.len() {
            return None;
        }
        let start = self.next_index;
        let end = (start + self.batch_size).min(self.items.len());
        self.next_index = end;
        Some(start..end)
    }

    pub fn complete(&mut self) {
        self.phase = ScanPhase::Completed;
        self.last_failure_reason.clear();
    }

    pub fn fail(&mut self, reason: &str) {
        self.phase = ScanPhase::Failed;
        self.last_failure_reason = if reason.is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            reason.to_string()
        };
    }

    pub fn reset(&mut self, clear_retry: bool) {
        let retry_request = if clear_retry {
            None
        } else {
            self.retry_request.take()
        };
        *self = Self {
            retry_request,
            ..Self::default()
        };
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.phase != ScanPhase::Running
            && self
                .retry_request
                .as_ref()
                .is_some_and(|request| !request.items.is_empty())
    }

    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == ScanPhase::Running
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn log_top_n(&self) -> usize {
        self.log_top_n
    }

    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    #[must_use]
    pub fn last_failure_reason(&self) -> &str {
        &self.last_failure_reason
    }

    /// Floor of processed/total as a percentage; 100 for an empty scan.
    #[must_use]
    pub fn progress_percent(&self) -> u32 {
        if self.items.is_empty() {
            return 100;
        }
        let percent = self.next_index.saturating_mul(100) / self.items.len();
        u32::try_from(percent).unwrap_or(100)
    }
}

//! Scroll-driven pagination for infinite-scroll pages.
//!
//! The controller scrolls a [`ScrollSurface`] until enough records are
//! loaded, the page stops growing, or a step ceiling is reached. Growth
//! stalls are debounced: an unchanged height triggers one deliberate scroll
//! to the bottom and a longer pause before the controller gives up.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::FetchError;

/// Pagination tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Stop once this many records are visible.
    #[serde(default = "default_target_records")]
    pub target_records: usize,
    /// Hard ceiling on scroll steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Pause after each scroll, in milliseconds.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    /// Pause multiplier for the confirm-retry scroll.
    #[serde(default = "default_confirm_multiplier")]
    pub confirm_multiplier: u32,
    /// Lightweight selector used to estimate loaded records.
    #[serde(default = "default_record_probe_selector")]
    pub record_probe_selector: String,
}

fn default_target_records() -> usize {
    200
}

fn default_max_steps() -> u32 {
    20
}

fn default_pause_ms() -> u64 {
    1_500
}

fn default_confirm_multiplier() -> u32 {
    2
}

fn default_record_probe_selector() -> String {
    "div.record-item, tr.data-row, div.case-item".to_string()
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            target_records: default_target_records(),
            max_steps: default_max_steps(),
            pause_ms: default_pause_ms(),
            confirm_multiplier: default_confirm_multiplier(),
            record_probe_selector: default_record_probe_selector(),
        }
    }
}

impl PaginationConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn confirm_pause(&self) -> Duration {
        self.pause() * self.confirm_multiplier.max(1)
    }
}

/// A scrollable document whose height and record count can be probed.
#[async_trait]
pub trait ScrollSurface: Send {
    /// Height of one scroll step (usually the screen height).
    async fn viewport_height(&mut self) -> Result<u64, FetchError>;
    /// Current document height.
    async fn page_height(&mut self) -> Result<u64, FetchError>;
    /// Scroll to an absolute vertical offset.
    async fn scroll_to(&mut self, offset: u64) -> Result<(), FetchError>;
    /// Scroll to the very bottom of the document.
    async fn scroll_to_bottom(&mut self) -> Result<(), FetchError>;
    /// Estimate of records currently loaded.
    async fn record_count(&mut self) -> Result<usize, FetchError>;
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Enough records are loaded.
    TargetReached,
    /// Height stayed the same even after the confirm-retry.
    Stalled,
    /// The step ceiling was exceeded. Best effort, not an error.
    StepCeiling,
    /// The page could not be probed; extraction proceeds with what loaded.
    ProbeFailed,
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Scrolling,
    ConfirmingStall,
    Stopped(StopReason),
}

/// Summary of a pagination run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationReport {
    pub reason: StopReason,
    pub steps: u32,
    pub records_seen: usize,
    pub final_height: u64,
}

/// Drives a [`ScrollSurface`] until loading is done.
pub struct PaginationController {
    config: PaginationConfig,
}

impl PaginationController {
    pub fn new(config: PaginationConfig) -> Self {
        Self { config }
    }

    /// Scroll until the target is met, growth stalls, or the ceiling is hit.
    pub async fn run<S: ScrollSurface + ?Sized>(&self, surface: &mut S) -> PaginationReport {
        let mut steps: u32 = 0;
        let mut records_seen: usize = 0;

        let (viewport, mut last_height) =
            match (surface.viewport_height().await, surface.page_height().await) {
                (Ok(v), Ok(h)) => (v.max(1), h),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Could not probe page dimensions: {}", e);
                    return PaginationReport {
                        reason: StopReason::ProbeFailed,
                        steps,
                        records_seen,
                        final_height: 0,
                    };
                }
            };

        let mut state = if records_seen >= self.config.target_records {
            PaginationState::Stopped(StopReason::TargetReached)
        } else {
            PaginationState::Scrolling
        };

        loop {
            state = match state {
                PaginationState::Scrolling => {
                    steps += 1;
                    let offset = viewport.saturating_mul(u64::from(steps));
                    match self.scroll_and_measure(surface, Some(offset)).await {
                        Ok(height) if height == last_height => PaginationState::ConfirmingStall,
                        Ok(height) => {
                            last_height = height;
                            self.after_growth(surface, steps, &mut records_seen).await
                        }
                        Err(e) => {
                            warn!("Scroll step {} failed: {}", steps, e);
                            PaginationState::Stopped(StopReason::ProbeFailed)
                        }
                    }
                }
                PaginationState::ConfirmingStall => {
                    debug!("Height unchanged at {}, confirming stall", last_height);
                    match self.scroll_and_measure(surface, None).await {
                        Ok(height) if height == last_height => {
                            info!("Reached bottom of page, no more content loading");
                            PaginationState::Stopped(StopReason::Stalled)
                        }
                        Ok(height) => {
                            last_height = height;
                            self.after_growth(surface, steps, &mut records_seen).await
                        }
                        Err(e) => {
                            warn!("Confirm scroll failed: {}", e);
                            PaginationState::Stopped(StopReason::ProbeFailed)
                        }
                    }
                }
                PaginationState::Stopped(reason) => {
                    info!(
                        "Pagination stopped ({:?}) after {} steps, ~{} records loaded",
                        reason, steps, records_seen
                    );
                    return PaginationReport {
                        reason,
                        steps,
                        records_seen,
                        final_height: last_height,
                    };
                }
            };
        }
    }

    /// Scroll (to an offset, or to the bottom for a confirm-retry), pause, re-measure.
    async fn scroll_and_measure<S: ScrollSurface + ?Sized>(
        &self,
        surface: &mut S,
        offset: Option<u64>,
    ) -> Result<u64, FetchError> {
        match offset {
            Some(offset) => {
                surface.scroll_to(offset).await?;
                tokio::time::sleep(self.config.pause()).await;
            }
            None => {
                surface.scroll_to_bottom().await?;
                tokio::time::sleep(self.config.confirm_pause()).await;
            }
        }
        surface.page_height().await
    }

    /// After the page grew: refresh the record estimate and pick the next state.
    async fn after_growth<S: ScrollSurface + ?Sized>(
        &self,
        surface: &mut S,
        steps: u32,
        records_seen: &mut usize,
    ) -> PaginationState {
        match surface.record_count().await {
            Ok(count) => {
                *records_seen = count;
                debug!("Loaded {} records after {} steps", count, steps);
            }
            Err(e) => warn!("Record count probe failed: {}", e),
        }

        if *records_seen >= self.config.target_records {
            PaginationState::Stopped(StopReason::TargetReached)
        } else if steps >= self.config.max_steps {
            PaginationState::Stopped(StopReason::StepCeiling)
        } else {
            PaginationState::Scrolling
        }
    }
}

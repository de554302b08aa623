//! Rotating visual challenge.
//!
//! The provider hands out one challenge image reference per transaction. The
//! companion app expects a fresh image on every refresh, so each token carries a
//! strictly increasing freshness marker appended as the `t` query parameter.

use crate::error::FlowError;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use url::Url;

pub const REFRESH_INTERVAL: Duration = Duration::from_millis(2_000);

const MARKER_PARAM: &str = "t";

/// One rendering of the challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeToken {
    pub url: String,
    pub marker: i64,
}

/// Lazy, restartable sequence of [`ChallengeToken`]s.
///
/// The timer only exists while the renderer is alive; dropping it stops the
/// refresh cadence.
#[derive(Debug)]
pub struct ChallengeRenderer {
    base: Url,
    period: Duration,
    interval: Option<Interval>,
    last_marker: Option<i64>,
}

impl ChallengeRenderer {
    /// # Errors
    /// `InvalidResponse` when the challenge reference is empty or not a URL.
    pub fn new(base: &str) -> Result<Self, FlowError> {
        Self::with_period(base, REFRESH_INTERVAL)
    }

    /// # Errors
    /// Same as [`ChallengeRenderer::new`].
    pub fn with_period(base: &str, period: Duration) -> Result<Self, FlowError> {
        let base = base.trim();
        if base.is_empty() {
            return Err(FlowError::InvalidResponse(
                "empty challenge reference".to_string(),
            ));
        }
        let base = Url::parse(base).map_err(|err| {
            FlowError::InvalidResponse(format!("invalid challenge reference: {err}"))
        })?;

        Ok(Self {
            base,
            period,
            interval: None,
            last_marker: None,
        })
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Produce a token immediately, without waiting for the cadence.
    pub fn current(&mut self) -> ChallengeToken {
        let marker = self.next_marker();
        ChallengeToken {
            url: annotate(&self.base, marker).into(),
            marker,
        }
    }

    /// Wait for the next refresh tick and produce its token.
    pub async fn next(&mut self) -> ChallengeToken {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
        self.current()
    }

    /// Rewind the cadence so the next tick is one full period away.
    pub fn restart(&mut self) {
        self.interval = None;
    }

    // Wall-clock millis, bumped when the clock has not moved since the last token.
    fn next_marker(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let marker = match self.last_marker {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_marker = Some(marker);
        marker
    }
}

/// Append the freshness marker to a challenge reference, keeping any existing
/// query pairs.
#[must_use]
pub fn annotate(base: &Url, marker: i64) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair(MARKER_PARAM, &marker.to_string());
    url
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Background task animating simulated points.

use std::time::Duration;

use rpio_core::{CancelToken, PointId};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::endpoint::SimEndpoint;
use crate::waveform::Waveform;

/// Periodically sets points of a [`SimEndpoint`] from waveforms.
///
/// Each update goes through [`SimEndpoint::set_value`], so subscribers see
/// it as a pushed notification from the publisher's thread.
#[derive(Debug)]
pub struct WaveformPublisher {
    endpoint: SimEndpoint,
    interval: Duration,
    tracks: Vec<(PointId, Waveform)>,
}

impl WaveformPublisher {
    /// Creates a publisher with no tracks.
    pub fn new(endpoint: SimEndpoint, interval: Duration) -> Self {
        Self {
            endpoint,
            interval: interval.max(Duration::from_millis(1)),
            tracks: Vec::new(),
        }
    }

    /// Adds a point driven by `waveform`.
    pub fn track(mut self, point_id: PointId, waveform: Waveform) -> Self {
        self.tracks.push((point_id, waveform));
        self
    }

    /// Returns the number of tracked points.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns `true` if no point is tracked.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Publishes one sample of every track.
    ///
    /// Points that do not exist or are currently bad are skipped.
    pub fn publish(&self, elapsed: Duration) -> usize {
        let mut published = 0;
        for (point_id, waveform) in &self.tracks {
            let Some(current) = self.endpoint.value(point_id) else {
                continue;
            };
            let Some(template) = current.usable_value() else {
                continue;
            };
            let next = waveform.sample_like(elapsed, template);
            if self.endpoint.set_value(point_id, next) {
                published += 1;
            }
        }
        trace!(endpoint = %self.endpoint.url(), published, "Waveforms published");
        published
    }

    /// Runs until `cancel` fires.
    pub async fn run(self, cancel: CancelToken) {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        debug!(
            endpoint = %self.endpoint.url(),
            tracks = self.tracks.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Waveform publisher started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.publish(start.elapsed());
                }
            }
        }
        debug!(endpoint = %self.endpoint.url(), "Waveform publisher stopped");
    }

    /// Spawns [`run`](Self::run) on `runtime`.
    pub fn spawn(self, runtime: &Handle, cancel: CancelToken) -> JoinHandle<()> {
        runtime.spawn(self.run(cancel))
    }
}

//! Simulated resource telemetry for the status dashboard.
//!
//! The numbers are fabricated: a bounded random walk that only exists to
//! make the dashboard look alive.

use std::time::Duration;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const CPU_START: f32 = 12.0;
const CPU_RANGE: (f32, f32) = (5.0, 100.0);
const CPU_STEP: f32 = 5.0;
const RAM_START: f32 = 45.0;
const RAM_RANGE: (f32, f32) = (30.0, 80.0);
const RAM_STEP: f32 = 2.0;

/// One synthesized sample, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    pub cpu_percent: f32,
    pub ram_percent: f32,
}

/// Bounded random walk over CPU and RAM usage.
pub struct TelemetrySimulator {
    current: TelemetrySnapshot,
    rng: StdRng,
}

impl Default for TelemetrySimulator {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl TelemetrySimulator {
    /// Simulator driven by a caller-supplied RNG (seed it for reproducible walks).
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            current: TelemetrySnapshot {
                cpu_percent: CPU_START,
                ram_percent: RAM_START,
            },
            rng,
        }
    }

    /// The latest sample.
    pub fn current(&self) -> TelemetrySnapshot {
        self.current
    }

    /// Advance the walk by one step and return the new sample.
    pub fn tick(&mut self) -> TelemetrySnapshot {
        let cpu_delta = self.rng.gen_range(-CPU_STEP..CPU_STEP);
        let ram_delta = self.rng.gen_range(-RAM_STEP..RAM_STEP);
        self.current = TelemetrySnapshot {
            cpu_percent: (self.current.cpu_percent + cpu_delta).clamp(CPU_RANGE.0, CPU_RANGE.1),
            ram_percent: (self.current.ram_percent + ram_delta).clamp(RAM_RANGE.0, RAM_RANGE.1),
        };
        self.current
    }
}

/// Publish a new sample every `interval` until `cancel` fires.
pub fn spawn_telemetry(
    interval: Duration,
    cancel: CancellationToken,
) -> watch::Receiver<TelemetrySnapshot> {
    let mut sim = TelemetrySimulator::default();
    let (tx, rx) = watch::channel(sim.current());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately; the initial sample is already published.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(sim.tick()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

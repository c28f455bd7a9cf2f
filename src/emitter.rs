//! Background runtime chatter.
//!
//! The emitter ticks on a fixed period. On each tick, if anything is running, one
//! running project is picked at random and, with a fixed probability, gets a runtime
//! line requested for it.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::Event;
use crate::project::ProjectId;

/// Process-wide activity shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    Running,
}

/// What a single tick decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    /// Nothing is running.
    Idle,
    /// A project was picked but the roll said no.
    Quiet(ProjectId),
    /// Request a runtime line for this project.
    Emit(ProjectId),
}

impl TickDecision {
    pub fn activity(&self) -> Activity {
        match self {
            TickDecision::Idle => Activity::Idle,
            TickDecision::Quiet(_) | TickDecision::Emit(_) => Activity::Running,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    interval: Duration,
    probability: f64,
}

impl Emitter {
    pub fn new(interval: Duration, probability: f64) -> Self {
        Self {
            interval,
            probability: if probability.is_nan() {
                0.0
            } else {
                probability.clamp(0.0, 1.0)
            },
        }
    }

    /// Spawns the ticker that posts `Event::EmitterTick` every interval.
    pub fn spawn(&self, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        let period = self.interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Event::EmitterTick).await.is_err() {
                    break;
                }
            }
        })
    }

    /// Picks a running project uniformly, then rolls against the emit probability.
    pub fn decide<R: Rng>(&self, running: &[ProjectId], rng: &mut R) -> TickDecision {
        if running.is_empty() {
            return TickDecision::Idle;
        }
        let picked = running[rng.random_range(0..running.len())].clone();
        if rng.random_bool(self.probability) {
            TickDecision::Emit(picked)
        } else {
            TickDecision::Quiet(picked)
        }
    }
}

/// Lookahead step scheduler
///
/// A coarse poll (every `poll_interval` of wall time) commits every step whose
/// audio-clock deadline falls inside the lookahead window. Each committed step
/// becomes a timer due at the matching wall-clock instant, so delivery timing
/// follows the audio clock while the poll itself may jitter freely.
///
/// Everything runs on the host's thread: the host calls `run_pending()` from
/// its loop and may sleep until `next_wakeup()`.
use log::{debug, trace, warn};

use super::playback::{Hit, TriggerSink};
use super::timer::{TimerId, TimerQueue};
use super::{step_duration, StepSource};
use crate::clock::Clock;
use crate::config::{PendingPolicy, SchedulerConfig};
use crate::error::{positive_finite, Error, Result, TriggerError};

/// Upper bound on steps committed by a single poll. Any remainder is picked
/// up by the next poll.
pub const MAX_STEPS_PER_POLL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Timer {
    Poll,
    Step { step: usize, deadline: f64 },
    Hit(Hit),
}

#[derive(Debug)]
pub struct TriggerFailure {
    pub hit: Hit,
    pub error: TriggerError,
}

/// What one `run_pending()` call did.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub polls: usize,
    pub steps: usize,
    pub hits: usize,
    pub failures: Vec<TriggerFailure>,
}

impl DispatchReport {
    pub fn is_idle(&self) -> bool {
        self.polls == 0 && self.steps == 0 && self.hits == 0 && self.failures.is_empty()
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    audio_clock: Box<dyn Clock>,
    wall_clock: Box<dyn Clock>,
    timers: TimerQueue<Timer>,
    poll_timer: Option<TimerId>,
    source: Option<Box<dyn StepSource>>,
    sink: Option<Box<dyn TriggerSink>>,
    running: bool,
    tempo: f64,
    step_count: usize,
    current_step: usize,
    next_deadline: f64,
    // `stopped` is owed to the sink once the pending deliveries drain.
    stop_pending: bool,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        audio_clock: impl Clock + 'static,
        wall_clock: impl Clock + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            audio_clock: Box::new(audio_clock),
            wall_clock: Box::new(wall_clock),
            timers: TimerQueue::new(),
            poll_timer: None,
            source: None,
            sink: None,
            running: false,
            tempo: 120.0,
            step_count: super::DEFAULT_STEPS,
            current_step: 0,
            next_deadline: 0.0,
            stop_pending: false,
        })
    }

    /// Same clock for musical deadlines and timer due times.
    pub fn with_clock(config: SchedulerConfig, clock: impl Clock + Clone + 'static) -> Result<Self> {
        Self::new(config, clock.clone(), clock)
    }

    /// Arguments are validated before the running check, so a call with bad
    /// arguments fails even while running. Starting while running changes nothing.
    ///
    /// Deliveries left over from a previous run under `PendingPolicy::Deliver`
    /// go to the new sink.
    pub fn start(
        &mut self,
        tempo_bpm: f64,
        step_count: usize,
        source: impl StepSource + 'static,
        sink: impl TriggerSink + 'static,
    ) -> Result<()> {
        let tempo = positive_finite("tempo", tempo_bpm)?;
        if step_count == 0 {
            return Err(Error::InvalidArgument(
                "step count must be at least 1".to_string(),
            ));
        }
        if self.running {
            return Ok(());
        }
        self.notify_stopped();

        self.tempo = tempo;
        self.step_count = step_count;
        self.source = Some(Box::new(source));
        self.sink = Some(Box::new(sink));
        self.current_step = 0;
        self.next_deadline = self.audio_clock.now();
        self.running = true;
        debug!(
            "Scheduler started: {} BPM, {} steps, first deadline {:.4}s",
            tempo, step_count, self.next_deadline
        );

        self.poll();
        Ok(())
    }

    /// Under `PendingPolicy::Deliver` the sink hears `stopped` only after the
    /// last pending delivery has fired.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(id) = self.poll_timer.take() {
            self.timers.cancel(id);
        }
        match self.config.on_stop {
            PendingPolicy::Discard => self.timers.clear(),
            PendingPolicy::Deliver => self.timers.retain(|t| !matches!(t, Timer::Poll)),
        }
        debug!(
            "Scheduler stopped at step {}, {} deliveries pending",
            self.current_step,
            self.timers.len()
        );
        self.stop_pending = true;
        if self.timers.is_empty() {
            self.notify_stopped();
        }
    }

    fn notify_stopped(&mut self) {
        if !self.stop_pending {
            return;
        }
        self.stop_pending = false;
        if let Some(sink) = self.sink.as_mut() {
            sink.stopped();
        }
    }

    /// Takes effect from the next step computed; committed deadlines keep their spacing.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        self.tempo = positive_finite("tempo", bpm)?;
        debug!("Tempo set to {} BPM", self.tempo);
        Ok(())
    }

    /// One scheduling pass. Normally driven by the poll timer; does nothing
    /// while stopped.
    pub fn poll(&mut self) {
        if !self.running {
            return;
        }

        let step_duration = step_duration(self.tempo, self.config.steps_per_beat);
        let audio_now = self.audio_clock.now();
        let wall_now = self.wall_clock.now();
        let horizon = audio_now + self.config.lookahead;
        let mut late = 0;
        let mut committed = 0;

        while self.next_deadline < horizon {
            if committed == MAX_STEPS_PER_POLL {
                warn!(
                    "Step limit reached: {} steps committed in one poll at {} BPM",
                    committed, self.tempo
                );
                break;
            }
            let step = self.current_step;
            let deadline = self.next_deadline;
            let delay = deadline - audio_now;
            if delay < 0.0 {
                late += 1;
            }
            let due = wall_now + delay.max(0.0);

            self.timers.schedule(due, Timer::Step { step, deadline });
            if let Some(source) = self.source.as_ref() {
                for lane in 0..source.lanes() {
                    if source.is_active(lane, step) {
                        self.timers
                            .schedule(due, Timer::Hit(Hit { lane, step, deadline }));
                    }
                }
            }
            trace!("Step {} committed for {:.4}s", step, deadline);

            committed += 1;
            self.current_step = (self.current_step + 1) % self.step_count;
            let next = self.next_deadline + step_duration;
            if next <= self.next_deadline {
                warn!(
                    "Step duration {}s is below clock resolution at {:.4}s; holding deadline",
                    step_duration, self.next_deadline
                );
                break;
            }
            self.next_deadline = next;
        }

        if late > 0 {
            warn!("Scheduler fell behind: {} step(s) committed after their deadline", late);
        }

        if let Some(id) = self.poll_timer.take() {
            self.timers.cancel(id);
        }
        self.poll_timer = Some(
            self.timers
                .schedule(wall_now + self.config.poll_interval, Timer::Poll),
        );
    }

    /// Fire every timer that is due on the wall clock, in due order.
    pub fn run_pending(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();

        while let Some((id, timer)) = self.timers.pop_due(self.wall_clock.now()) {
            match timer {
                Timer::Poll => {
                    if self.poll_timer == Some(id) {
                        self.poll_timer = None;
                    }
                    report.polls += 1;
                    self.poll();
                }
                Timer::Step { step, deadline } => {
                    report.steps += 1;
                    if let Some(sink) = self.sink.as_mut() {
                        sink.step(step, deadline);
                    }
                }
                Timer::Hit(hit) => {
                    let Some(sink) = self.sink.as_mut() else {
                        continue;
                    };
                    match sink.hit(hit) {
                        Ok(()) => report.hits += 1,
                        Err(error) => {
                            warn!(
                                "Trigger failed for lane {} step {}: {}",
                                hit.lane, hit.step, error
                            );
                            report.failures.push(TriggerFailure { hit, error });
                        }
                    }
                }
            }
        }

        if self.stop_pending && self.timers.is_empty() {
            self.notify_stopped();
        }
        report
    }

    /// Wall-clock time of the next timer, if any.
    pub fn next_wakeup(&mut self) -> Option<f64> {
        self.timers.next_due()
    }

    pub fn pending_triggers(&self) -> usize {
        self.timers
            .iter()
            .filter(|t| matches!(t, Timer::Hit(_)))
            .count()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn next_deadline(&self) -> f64 {
        self.next_deadline
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

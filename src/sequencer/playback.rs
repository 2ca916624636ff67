/// Trigger delivery - what the scheduler hands back to the host
use log::warn;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::error::TriggerError;

/// One active lane at one step, due at `deadline` on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub lane: usize,
    pub step: usize,
    pub deadline: f64,
}

/// Host side effects. Implementations must not block.
pub trait TriggerSink {
    /// Play the sound for an active lane.
    fn hit(&mut self, hit: Hit) -> Result<(), TriggerError>;

    /// Every step is reported once, active lanes or not.
    fn step(&mut self, _step: usize, _deadline: f64) {}

    /// Called once per `stop()`, after any deliveries it lets through have fired.
    fn stopped(&mut self) {}
}

impl<F> TriggerSink for F
where
    F: FnMut(Hit) -> Result<(), TriggerError>,
{
    fn hit(&mut self, hit: Hit) -> Result<(), TriggerError> {
        self(hit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    StepAdvanced { step: usize, deadline: f64 },
    Hit(Hit),
    Stopped,
}

/// Forwards deliveries over a channel, for hosts that consume them on another thread.
pub struct ChannelSink {
    sender: Sender<PlaybackEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = channel();
        (Self { sender }, EventReceiver { receiver })
    }
}

impl TriggerSink for ChannelSink {
    fn hit(&mut self, hit: Hit) -> Result<(), TriggerError> {
        self.sender
            .send(PlaybackEvent::Hit(hit))
            .map_err(|e| format!("Event receiver dropped: {}", e).into())
    }

    fn step(&mut self, step: usize, deadline: f64) {
        if let Err(e) = self
            .sender
            .send(PlaybackEvent::StepAdvanced { step, deadline })
        {
            warn!("Step {} not forwarded, event receiver dropped: {}", step, e);
        }
    }

    fn stopped(&mut self) {
        if let Err(e) = self.sender.send(PlaybackEvent::Stopped) {
            warn!("Stop not forwarded, event receiver dropped: {}", e);
        }
    }
}

pub struct EventReceiver {
    receiver: Receiver<PlaybackEvent>,
}

impl EventReceiver {
    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |hit: Hit| -> Result<(), TriggerError> {
                seen.push(hit.step);
                Ok(())
            };
            sink.hit(Hit { lane: 0, step: 3, deadline: 0.0 }).unwrap();
            sink.step(3, 0.0);
        }
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn test_channel_sink() {
        let (mut sink, events) = ChannelSink::new();
        sink.step(0, 0.5);
        let hit = Hit { lane: 1, step: 0, deadline: 0.5 };
        sink.hit(hit).unwrap();
        sink.stopped();
        assert_eq!(
            events.poll_events(),
            vec![
                PlaybackEvent::StepAdvanced { step: 0, deadline: 0.5 },
                PlaybackEvent::Hit(hit),
                PlaybackEvent::Stopped,
            ]
        );
        assert!(events.poll_events().is_empty());
    }

    #[test]
    fn test_channel_sink_reports_dropped_receiver() {
        let (mut sink, events) = ChannelSink::new();
        drop(events);
        assert!(sink.hit(Hit { lane: 0, step: 0, deadline: 0.0 }).is_err());
        // Notifications without a receiver are logged, not fatal.
        sink.step(1, 0.125);
        sink.stopped();
    }
}

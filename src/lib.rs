/// stepahead - lookahead step scheduling for drum sequencers
///
/// Steps are committed ahead of time against an audio clock and delivered at
/// their exact deadlines, independent of how coarsely the host polls:
/// - Scheduler with start/stop/tempo control and burst catch-up
/// - Pattern sources and trigger sinks supplied by the host
/// - Audio output whose sample counter serves as the audio clock
/// - MIDI output for General MIDI drum kits

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, StreamClock};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PendingPolicy, SchedulerConfig};
pub use error::{DeviceError, Error, Result, TriggerError};
pub use midi::{drum_note, midi_note_name, MidiOutputDevice};
pub use sequencer::playback::{ChannelSink, EventReceiver, Hit, PlaybackEvent, TriggerSink};
pub use sequencer::scheduler::{DispatchReport, Scheduler, TriggerFailure};
pub use sequencer::{step_duration, FnSource, Pattern, PatternSpec, StepSource};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use log::{info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use stepahead::{
    drum_note, midi_note_name, AudioOutput, Clock, Hit, MidiOutputDevice, Pattern, PatternSpec,
    PendingPolicy, Scheduler, SchedulerConfig, SystemClock, TriggerError, TriggerSink,
};

/// Longest single sleep, so the loop notices the end of the run promptly.
const MAX_SLEEP_SECONDS: f64 = 0.05;

#[derive(Parser)]
#[command(name = "stepahead", version, about = "Play a drum pattern on the lookahead step scheduler", long_about = None)]
struct Cli {
    /// Tempo in beats per minute
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,

    /// Switch to this tempo halfway through the run
    #[arg(long, value_name = "BPM")]
    tempo_change: Option<f64>,

    /// Steps per cycle (defaults to the pattern's length)
    #[arg(long)]
    steps: Option<usize>,

    /// How long to play, in seconds
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,

    /// JSON pattern: { "steps": 16, "lanes": [{ "name": "kick", "active": [0, 8] }] }
    #[arg(long, value_name = "FILE")]
    pattern: Option<PathBuf>,

    #[arg(long, default_value_t = 100.0)]
    lookahead_ms: f64,

    #[arg(long, default_value_t = 25.0)]
    poll_ms: f64,

    /// Let already scheduled hits play out after stopping
    #[arg(long, action = ArgAction::SetTrue)]
    keep_pending: bool,

    /// Send drum notes to this MIDI output port
    #[arg(long, value_name = "INDEX")]
    midi_port: Option<usize>,

    /// List MIDI output ports and exit
    #[arg(long, action = ArgAction::SetTrue)]
    list_ports: bool,

    /// Do not open an audio device
    #[arg(long, action = ArgAction::SetTrue)]
    no_audio: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

/// Prints one row per step and plays each hit on the available outputs.
struct ConsoleSink {
    names: Vec<String>,
    notes: Vec<u8>,
    audio: Option<AudioOutput>,
    midi: MidiOutputDevice,
    row: Option<String>,
}

impl ConsoleSink {
    fn flush(&mut self) {
        if let Some(row) = self.row.take() {
            println!("{}", row);
        }
    }
}

impl TriggerSink for ConsoleSink {
    fn hit(&mut self, hit: Hit) -> Result<(), TriggerError> {
        let note = self.notes.get(hit.lane).copied().unwrap_or(37);
        if let Some(row) = self.row.as_mut() {
            let name = self.names.get(hit.lane).map(String::as_str).unwrap_or("?");
            row.push(' ');
            row.push_str(name);
        }
        if let Some(audio) = &self.audio {
            audio.trigger_note(note);
        }
        self.midi.send_note_on(note, 100)?;
        self.midi.send_note_off(note)?;
        Ok(())
    }

    fn step(&mut self, step: usize, deadline: f64) {
        self.flush();
        self.row = Some(format!("{:>8.3}s  step {:>2} |", deadline, step));
    }

    fn stopped(&mut self) {
        self.flush();
        if let Some(audio) = &self.audio {
            audio.silence();
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_pattern(path: Option<&PathBuf>) -> anyhow::Result<Pattern> {
    let Some(path) = path else {
        return Ok(Pattern::demo());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pattern {}", path.display()))?;
    let spec: PatternSpec = serde_json::from_str(&text)
        .with_context(|| format!("Invalid pattern file {}", path.display()))?;
    if spec.lanes.is_empty() {
        bail!("Pattern {} has no lanes", path.display());
    }
    Ok(Pattern::from(&spec))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list_ports {
        let ports = MidiOutputDevice::available_ports();
        if ports.is_empty() {
            println!("No MIDI output ports available");
        }
        for (i, name) in ports.iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let pattern = load_pattern(cli.pattern.as_ref())?;
    let steps = cli.steps.unwrap_or(pattern.steps());
    let config = SchedulerConfig::default()
        .with_lookahead(cli.lookahead_ms / 1000.0)
        .with_poll_interval(cli.poll_ms / 1000.0)
        .with_pending_policy(if cli.keep_pending {
            PendingPolicy::Deliver
        } else {
            PendingPolicy::Discard
        });

    let mut midi = MidiOutputDevice::new();
    if let Some(port) = cli.midi_port {
        let name = midi.connect(port).context("Failed to open MIDI output")?;
        info!("Sending drum notes to {}", name);
    }

    let wall = SystemClock::new();
    let audio = if cli.no_audio {
        None
    } else {
        match AudioOutput::new() {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("Audio unavailable, timing against the system clock: {}", e);
                None
            }
        }
    };
    let mut scheduler = match &audio {
        Some(audio) => Scheduler::new(config, audio.clock(), wall)?,
        None => Scheduler::new(config, wall, wall)?,
    };

    let notes: Vec<u8> = pattern.lane_names().iter().map(|n| drum_note(n)).collect();
    for (name, note) in pattern.lane_names().iter().zip(&notes) {
        info!("Lane {} -> note {} ({})", name, note, midi_note_name(*note));
    }
    let sink = ConsoleSink {
        names: pattern.lane_names().to_vec(),
        notes,
        audio,
        midi,
        row: None,
    };

    scheduler.start(cli.bpm, steps, pattern, sink)?;
    let started = wall.now();
    let end = started + cli.seconds;
    let mut tempo_change = cli.tempo_change;

    while wall.now() < end {
        scheduler.run_pending();

        if wall.now() >= started + cli.seconds / 2.0 {
            if let Some(bpm) = tempo_change.take() {
                scheduler.set_tempo(bpm)?;
                info!("Tempo changed to {} BPM", bpm);
            }
        }

        let wake = scheduler
            .next_wakeup()
            .unwrap_or(end)
            .min(end)
            .min(wall.now() + MAX_SLEEP_SECONDS);
        let wait = wake - wall.now();
        if wait > 0.0 {
            thread::sleep(Duration::from_secs_f64(wait));
        }
    }

    scheduler.stop();
    if cli.keep_pending {
        while scheduler.next_wakeup().is_some() {
            scheduler.run_pending();
            thread::sleep(Duration::from_millis(1));
        }
    }
    Ok(())
}

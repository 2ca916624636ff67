/// Pattern data and musical timing
/// The scheduler only ever asks a `StepSource` whether a lane is active at a step
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

pub mod playback;
pub mod scheduler;
pub mod timer;

pub const DEFAULT_STEPS: usize = 16;

/// Host-owned pattern lookup.
pub trait StepSource {
    fn lanes(&self) -> usize;
    fn is_active(&self, lane: usize, step: usize) -> bool;
}

/// Seconds per step for a tempo and subdivision.
pub fn step_duration(tempo_bpm: f64, steps_per_beat: u32) -> f64 {
    60.0 / tempo_bpm / steps_per_beat as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub name: String,
    /// Indices of active steps.
    #[serde(default)]
    pub active: Vec<usize>,
}

/// Serialized form of a pattern: `{ "steps": 16, "lanes": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    #[serde(default = "default_steps")]
    pub steps: usize,
    pub lanes: Vec<Lane>,
}

fn default_steps() -> usize {
    DEFAULT_STEPS
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    names: Vec<String>,
    cells: Vec<Vec<bool>>,
    steps: usize,
}

impl Pattern {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, steps: usize) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self {
            cells: vec![vec![false; steps]; names.len()],
            names,
            steps,
        }
    }

    /// Four-lane drum groove: kick, snare, hihat and bass.
    pub fn demo() -> Self {
        let spec = PatternSpec {
            steps: DEFAULT_STEPS,
            lanes: vec![
                Lane {
                    name: "kick".into(),
                    active: vec![0, 4, 8, 12],
                },
                Lane {
                    name: "snare".into(),
                    active: vec![4, 12],
                },
                Lane {
                    name: "hihat".into(),
                    active: vec![0, 2, 4, 6, 8, 10, 12, 14],
                },
                Lane {
                    name: "bass".into(),
                    active: vec![0, 3, 7, 10],
                },
            ],
        };
        Self::from(&spec)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn lane_names(&self) -> &[String] {
        &self.names
    }

    pub fn lane_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, lane: usize, step: usize) -> bool {
        self.cells
            .get(lane)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, lane: usize, step: usize, value: bool) {
        if let Some(row) = self.cells.get_mut(lane) {
            if let Some(cell) = row.get_mut(step) {
                *cell = value;
            }
        }
    }

    pub fn toggle(&mut self, lane: usize, step: usize) {
        let current = self.get(lane, step);
        self.set(lane, step, !current);
    }

    pub fn clear(&mut self) {
        for row in &mut self.cells {
            row.fill(false);
        }
    }

    pub fn fill(&mut self) {
        for row in &mut self.cells {
            row.fill(true);
        }
    }

    pub fn to_spec(&self) -> PatternSpec {
        PatternSpec {
            steps: self.steps,
            lanes: self
                .names
                .iter()
                .zip(&self.cells)
                .map(|(name, row)| Lane {
                    name: name.clone(),
                    active: row
                        .iter()
                        .enumerate()
                        .filter_map(|(i, on)| on.then_some(i))
                        .collect(),
                })
                .collect(),
        }
    }
}

impl From<&PatternSpec> for Pattern {
    /// Out-of-range step indices are ignored.
    fn from(spec: &PatternSpec) -> Self {
        let mut pattern = Pattern::new(spec.lanes.iter().map(|l| l.name.clone()), spec.steps);
        for (lane, l) in spec.lanes.iter().enumerate() {
            for &step in &l.active {
                pattern.set(lane, step, true);
            }
        }
        pattern
    }
}

impl StepSource for Pattern {
    fn lanes(&self) -> usize {
        self.cells.len()
    }

    fn is_active(&self, lane: usize, step: usize) -> bool {
        self.get(lane, step)
    }
}

impl<P: StepSource + ?Sized> StepSource for Rc<RefCell<P>> {
    fn lanes(&self) -> usize {
        self.borrow().lanes()
    }

    fn is_active(&self, lane: usize, step: usize) -> bool {
        self.borrow().is_active(lane, step)
    }
}

/// A poisoned lock reads as an empty pattern.
impl<P: StepSource + ?Sized> StepSource for Arc<Mutex<P>> {
    fn lanes(&self) -> usize {
        self.lock().map(|p| p.lanes()).unwrap_or(0)
    }

    fn is_active(&self, lane: usize, step: usize) -> bool {
        self.lock().map(|p| p.is_active(lane, step)).unwrap_or(false)
    }
}

/// Adapts a closure `(lane, step) -> bool` over a fixed number of lanes.
pub struct FnSource<F> {
    lanes: usize,
    f: F,
}

impl<F: Fn(usize, usize) -> bool> FnSource<F> {
    pub fn new(lanes: usize, f: F) -> Self {
        Self { lanes, f }
    }
}

impl<F: Fn(usize, usize) -> bool> StepSource for FnSource<F> {
    fn lanes(&self) -> usize {
        self.lanes
    }

    fn is_active(&self, lane: usize, step: usize) -> bool {
        (self.f)(lane, step)
    }
}

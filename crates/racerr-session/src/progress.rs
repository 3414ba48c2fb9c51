//! Checkpoint progress: per-participant passed sets, track layout, pass
//! ordering and the ranking comparator used by the leaderboard.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;

// ---------------------------------------------------------------------------
// CheckpointId
// ---------------------------------------------------------------------------

/// Identifies a checkpoint collider on the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointId(pub u32);

// ---------------------------------------------------------------------------
// ProgressInfo
// ---------------------------------------------------------------------------

/// Progress of one participant through the current race.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Session time the participant started racing.
    pub start_time: f64,
    /// Session time the participant crossed the finish line.
    pub finish_time: Option<f64>,
    /// Latest engine-supplied distance to the next checkpoint.
    pub distance_to_next: Option<f32>,
    /// Distinct checkpoints passed, in first-arrival order.
    checkpoints: Vec<CheckpointId>,
}

impl ProgressInfo {
    /// Fresh progress starting at `start_time`.
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time,
            finish_time: None,
            distance_to_next: None,
            checkpoints: Vec::new(),
        }
    }

    /// Appends `checkpoint` unless already passed. Returns `true` if it was new.
    pub fn record_checkpoint(&mut self, checkpoint: CheckpointId) -> bool {
        if self.has_passed(checkpoint) {
            return false;
        }
        self.checkpoints.push(checkpoint);
        true
    }

    /// Sets the finish time the first time it is called. Returns `true` if it
    /// did so.
    pub fn mark_finished(&mut self, now: f64) -> bool {
        if self.finish_time.is_some() {
            return false;
        }
        self.finish_time = Some(now);
        true
    }

    /// Passed checkpoints in first-arrival order.
    pub fn passed(&self) -> &[CheckpointId] {
        &self.checkpoints
    }

    /// Number of distinct checkpoints passed.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether `checkpoint` has been passed.
    pub fn has_passed(&self, checkpoint: CheckpointId) -> bool {
        self.checkpoints.contains(&checkpoint)
    }

    /// A participant is finished once it has passed the finish line.
    pub fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }
}

/// Ranking order: finished before unfinished (earliest finish first), then
/// more checkpoints first, then closer to the next checkpoint first. Unknown
/// distances sort after known ones. Equal entries compare equal so a stable
/// sort keeps join order.
pub fn compare_progress(a: &ProgressInfo, b: &ProgressInfo) -> Ordering {
    match (a.finish_time, b.finish_time) {
        (Some(fa), Some(fb)) => fa.total_cmp(&fb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b
            .checkpoint_count()
            .cmp(&a.checkpoint_count())
            .then_with(|| match (a.distance_to_next, b.distance_to_next) {
                (Some(da), Some(db)) => da.total_cmp(&db),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }),
    }
}

// ---------------------------------------------------------------------------
// TrackLayout
// ---------------------------------------------------------------------------

/// Problems with a track's checkpoint list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    /// The layout has no finish line at all.
    #[error("track has no finish line")]
    MissingFinishLine,
    /// The finish line is present but other checkpoints follow it.
    #[error("finish line {0:?} is not the last checkpoint")]
    FinishLineNotLast(CheckpointId),
    /// A checkpoint appears more than once.
    #[error("checkpoint {0:?} appears more than once")]
    DuplicateCheckpoint(CheckpointId),
}

/// Ordered checkpoints of the current track. The last one is the finish line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackLayout {
    checkpoints: Vec<CheckpointId>,
}

impl TrackLayout {
    /// Builds a layout whose last checkpoint is the finish line.
    pub fn new(checkpoints: Vec<CheckpointId>) -> Result<Self, TrackError> {
        if checkpoints.is_empty() {
            return Err(TrackError::MissingFinishLine);
        }
        for (i, checkpoint) in checkpoints.iter().enumerate() {
            if checkpoints[..i].contains(checkpoint) {
                return Err(TrackError::DuplicateCheckpoint(*checkpoint));
            }
        }
        Ok(Self { checkpoints })
    }

    /// Builds a layout with an explicitly named finish line, which must be
    /// the last entry.
    pub fn with_finish_line(
        checkpoints: Vec<CheckpointId>,
        finish_line: CheckpointId,
    ) -> Result<Self, TrackError> {
        match checkpoints.iter().position(|c| *c == finish_line) {
            None => Err(TrackError::MissingFinishLine),
            Some(i) if i + 1 != checkpoints.len() => {
                Err(TrackError::FinishLineNotLast(finish_line))
            }
            Some(_) => Self::new(checkpoints),
        }
    }

    /// `count` checkpoints numbered `0..count`; the last is the finish line.
    pub fn sequential(count: u32) -> Result<Self, TrackError> {
        Self::new((0..count).map(CheckpointId).collect())
    }

    /// The designated finish-line checkpoint.
    pub fn finish_line(&self) -> CheckpointId {
        // Constructors reject empty layouts.
        self.checkpoints[self.checkpoints.len() - 1]
    }

    /// Whether `checkpoint` belongs to this track.
    pub fn contains(&self, checkpoint: CheckpointId) -> bool {
        self.checkpoints.contains(&checkpoint)
    }

    /// All checkpoints in track order.
    pub fn checkpoints(&self) -> &[CheckpointId] {
        &self.checkpoints
    }
}

// ---------------------------------------------------------------------------
// SequenceGuard
// ---------------------------------------------------------------------------

/// Enforces per-participant ordering of checkpoint notifications. A pass is
/// applied only if its sequence number is greater than the last one applied
/// for that participant.
#[derive(Debug, Clone, Default)]
pub struct SequenceGuard {
    last_applied: HashMap<ParticipantId, u64>,
}

impl SequenceGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records `sequence` if it is newer than the last one
    /// applied for `participant`.
    pub fn accept(&mut self, participant: ParticipantId, sequence: u64) -> bool {
        match self.last_applied.get(&participant) {
            Some(&last) if sequence <= last => false,
            _ => {
                self.last_applied.insert(participant, sequence);
                true
            }
        }
    }

    /// Drops the record for a participant that left.
    pub fn forget(&mut self, participant: ParticipantId) {
        self.last_applied.remove(&participant);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

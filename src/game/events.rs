use crate::game::judgment::Grade;
use crate::game::timing::GridPosition;

/// Everything the engine reports outward. The player collects these in order
/// and hands them out through `BeatmapPlayer::drain_events`.
#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    BeatmapLoaded {
        map_name: String,
        note_count: usize,
    },
    PlayStarted,
    /// The playback cursor moved onto a new grid row.
    SequenceChanged {
        position: GridPosition,
        subline: usize,
    },
    NoteHit {
        column: usize,
        subline: usize,
        grade: Grade,
        distance: f32,
    },
    HoldStarted {
        column: usize,
        subline: usize,
        grade: Grade,
    },
    HoldFinished {
        column: usize,
        subline: usize,
        end_subline: usize,
        press_grade: Grade,
        end_grade: Grade,
        grade: Grade,
        released_early: bool,
    },
    NoteMissed {
        column: usize,
        subline: usize,
    },
    /// Every column is empty; EndPlay follows after the configured delay.
    PreEndPlay,
    EndPlay,
}

impl GameEvent {
    /// Final grade carried by a judged note, if this event resolves one.
    pub const fn resolved_grade(&self) -> Option<Grade> {
        match self {
            Self::NoteHit { grade, .. } | Self::HoldFinished { grade, .. } => Some(*grade),
            Self::NoteMissed { .. } => Some(Grade::Miss),
            _ => None,
        }
    }

    pub const fn column(&self) -> Option<usize> {
        match self {
            Self::NoteHit { column, .. }
            | Self::HoldStarted { column, .. }
            | Self::HoldFinished { column, .. }
            | Self::NoteMissed { column, .. } => Some(*column),
            _ => None,
        }
    }
}

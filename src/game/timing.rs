use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BPM: u32 = 130;
pub const BEATS_PER_SEQUENCE: f32 = 4.0;

// Absorbs f32 rounding when a time sits exactly on a grid line, so that
// `subline_at(time_at_subline(s)) == s` holds for every reachable subline.
const GRID_EPSILON: f32 = 1e-3;

/// Subdivision of one sequence (4 beats) into equal grid rows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Division {
    One,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl Division {
    pub const ALL: [Division; 5] = [
        Division::One,
        Division::Half,
        Division::Quarter,
        Division::Eighth,
        Division::Sixteenth,
    ];

    #[inline(always)]
    pub const fn slots(self) -> usize {
        match self {
            Self::One => 4,
            Self::Half => 8,
            Self::Quarter => 16,
            Self::Eighth => 32,
            Self::Sixteenth => 64,
        }
    }

    /// Picks the division whose slot count bracket contains `divide_by`.
    pub const fn from_slots(divide_by: usize) -> Self {
        if divide_by < 8 {
            Self::One
        } else if divide_by < 16 {
            Self::Half
        } else if divide_by < 32 {
            Self::Quarter
        } else if divide_by < 64 {
            Self::Eighth
        } else {
            Self::Sixteenth
        }
    }

    #[inline(always)]
    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::One),
            1 => Some(Self::Half),
            2 => Some(Self::Quarter),
            3 => Some(Self::Eighth),
            4 => Some(Self::Sixteenth),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::One => "One",
            Self::Half => "Half",
            Self::Quarter => "Quarter",
            Self::Eighth => "Eighth",
            Self::Sixteenth => "Sixteenth",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Division {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return Ok(Self::from_slots(n));
        }
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// Flattened sequence/sub-sequence coordinate pair.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridPosition {
    pub sequence: usize,
    pub sub_sequence: usize,
}

/// Time <-> grid conversions for a fixed BPM and slot count (4/4 only).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeGrid {
    bpm: u32,
    slots: usize,
}

impl TimeGrid {
    pub fn new(bpm: u32, division: Division) -> Self {
        Self::with_slots(bpm, division.slots())
    }

    pub fn with_slots(bpm: u32, slots: usize) -> Self {
        Self {
            bpm: bpm.max(1),
            slots: slots.max(1),
        }
    }

    #[inline(always)]
    pub const fn bpm(&self) -> u32 {
        self.bpm
    }

    #[inline(always)]
    pub const fn slots(&self) -> usize {
        self.slots
    }

    #[inline(always)]
    pub fn seconds_per_beat(&self) -> f32 {
        60.0 / self.bpm as f32
    }

    #[inline(always)]
    pub fn time_per_sequence(&self) -> f32 {
        self.seconds_per_beat() * BEATS_PER_SEQUENCE
    }

    #[inline(always)]
    pub fn time_per_sub_sequence(&self) -> f32 {
        self.time_per_sequence() / self.slots as f32
    }

    #[inline(always)]
    pub const fn subline_index(&self, sequence: usize, sub_sequence: usize) -> usize {
        sequence * self.slots + sub_sequence
    }

    #[inline(always)]
    pub const fn split_subline(&self, subline: usize) -> GridPosition {
        GridPosition {
            sequence: subline / self.slots,
            sub_sequence: subline % self.slots,
        }
    }

    pub fn time_at(&self, sequence: usize, sub_sequence: usize) -> f32 {
        sequence as f32 * self.time_per_sequence()
            + sub_sequence as f32 * self.time_per_sub_sequence()
    }

    #[inline(always)]
    pub fn time_at_subline(&self, subline: usize) -> f32 {
        let pos = self.split_subline(subline);
        self.time_at(pos.sequence, pos.sub_sequence)
    }

    /// Subline whose row is at or before `time`. Negative times clamp to 0.
    pub fn subline_at(&self, time: f32) -> usize {
        if !time.is_finite() || time <= 0.0 {
            return 0;
        }
        let sequence = (time / self.time_per_sequence() + GRID_EPSILON).floor();
        let within = (time - sequence * self.time_per_sequence()).max(0.0);
        let sub = ((within / self.time_per_sub_sequence()) + GRID_EPSILON).floor() as usize;
        self.subline_index(sequence as usize, sub.min(self.slots - 1))
    }

    #[inline(always)]
    pub fn sequence_index_at(&self, time: f32) -> usize {
        self.split_subline(self.subline_at(time)).sequence
    }

    #[inline(always)]
    pub fn sub_sequence_index_at(&self, time: f32) -> usize {
        self.split_subline(self.subline_at(time)).sub_sequence
    }

    #[inline(always)]
    pub fn grid_position_at(&self, time: f32) -> GridPosition {
        self.split_subline(self.subline_at(time))
    }

    /// `ceil(duration / secondsPerBeat / 4)`.
    pub fn sequence_count(&self, song_duration_seconds: f32) -> usize {
        if !song_duration_seconds.is_finite() || song_duration_seconds <= 0.0 {
            return 0;
        }
        (song_duration_seconds / self.seconds_per_beat() / BEATS_PER_SEQUENCE).ceil() as usize
    }
}

/// `mm:ss`, truncating.
pub fn format_song_time(seconds: f32) -> String {
    let seconds = seconds.max(0.0);
    let minute = (seconds / 60.0) as u32;
    let second = (seconds % 60.0) as u32;
    format!("{minute:02}:{second:02}")
}

/// `mm:ss.mmm`, the editor's perfect-line readout.
pub fn format_song_time_precise(seconds: f32) -> String {
    let seconds = seconds.max(0.0);
    let millis = (seconds * 1000.0 % 1000.0) as u32;
    format!("{}.{millis:03}", format_song_time(seconds))
}

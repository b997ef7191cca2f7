use crate::game::beatmap::{Beatmap, NoteMeta, NoteType};
use crate::game::judgment::Grade;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PressState {
    #[default]
    Released,
    Pressed { grade: Grade },
}

/// A grid note materialized into a live, judgeable object. Positions are
/// absolute distances along the drop axis (`time * drop_speed`); the
/// judgement line sits at `now * drop_speed`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NoteInstance {
    /// Per-sequence filler; never judged.
    Blank { subline: usize, position: f32 },
    Hit { subline: usize, position: f32 },
    Hold {
        subline: usize,
        end_subline: usize,
        position: f32,
        end_position: f32,
        press: PressState,
    },
}

impl NoteInstance {
    pub fn from_meta(beatmap: &Beatmap, subline: usize, meta: NoteMeta) -> Self {
        let position = beatmap.note_position(subline);
        match meta {
            NoteMeta::Hit => Self::Hit { subline, position },
            NoteMeta::Hold { end } => Self::Hold {
                subline,
                end_subline: end,
                position,
                end_position: beatmap.note_position(end),
                press: PressState::Released,
            },
        }
    }

    #[inline(always)]
    pub const fn subline(&self) -> usize {
        match *self {
            Self::Blank { subline, .. } | Self::Hit { subline, .. } | Self::Hold { subline, .. } => subline,
        }
    }

    #[inline(always)]
    pub const fn position(&self) -> f32 {
        match *self {
            Self::Blank { position, .. } | Self::Hit { position, .. } | Self::Hold { position, .. } => position,
        }
    }

    /// Trailing edge; equal to `position` for single-point notes.
    #[inline(always)]
    pub const fn end_position(&self) -> f32 {
        match *self {
            Self::Hold { end_position, .. } => end_position,
            _ => self.position(),
        }
    }

    #[inline(always)]
    pub const fn kind(&self) -> NoteType {
        match self {
            Self::Blank { .. } => NoteType::Blank,
            Self::Hit { .. } => NoteType::Hit,
            Self::Hold { .. } => NoteType::Hold,
        }
    }

    #[inline(always)]
    pub const fn is_judgeable(&self) -> bool {
        !matches!(self, Self::Blank { .. })
    }

    #[inline(always)]
    pub const fn is_pressed(&self) -> bool {
        matches!(self, Self::Hold { press: PressState::Pressed { .. }, .. })
    }
}

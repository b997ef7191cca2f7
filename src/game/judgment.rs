use std::fmt;

pub const PERFECT_DISTANCE: f32 = 0.05;
pub const GOOD_DISTANCE: f32 = 0.10;
pub const BAD_DISTANCE: f32 = 0.25;

/// Ordinals matter: hold results average them with integer truncation.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    Miss = 0,
    Bad = 1,
    Good = 2,
    Perfect = 3,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Perfect, Grade::Good, Grade::Bad, Grade::Miss];

    #[inline(always)]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    pub const fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 => Self::Miss,
            1 => Self::Bad,
            2 => Self::Good,
            _ => Self::Perfect,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Perfect => "Perfect",
            Self::Good => "Good",
            Self::Bad => "Bad",
            Self::Miss => "Miss",
        })
    }
}

/// Grades the absolute drop-axis offset between a note and the judgement
/// line. Each bound is exclusive, so a distance sitting exactly on it falls
/// into the next band down.
#[inline(always)]
pub fn grade_for_distance(distance: f32) -> Grade {
    let d = distance.abs();
    if d < PERFECT_DISTANCE {
        Grade::Perfect
    } else if d < GOOD_DISTANCE {
        Grade::Good
    } else if d < BAD_DISTANCE {
        Grade::Bad
    } else {
        // Also catches NaN.
        Grade::Miss
    }
}

#[inline(always)]
pub const fn average_hold_grade(press: Grade, end: Grade) -> Grade {
    Grade::from_ordinal((press.ordinal() + end.ordinal()) / 2)
}

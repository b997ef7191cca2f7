use crate::game::events::GameEvent;
use crate::game::judgment::Grade;

pub const MAX_SCORE: f64 = 1_000_000.0;

/// Share of a note's score value awarded per grade.
#[inline(always)]
pub const fn grade_weight(grade: Grade) -> f64 {
    match grade {
        Grade::Perfect => 1.0,
        Grade::Good => 0.8,
        Grade::Bad => 0.5,
        Grade::Miss => 0.0,
    }
}

/// Running tally for one play: per-grade counts plus a score scaled so that
/// an all-Perfect run reaches `MAX_SCORE`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreTracker {
    score_gain: f64,
    score: f64,
    perfect: u32,
    good: u32,
    bad: u32,
    miss: u32,
}

impl ScoreTracker {
    pub fn new(note_count: usize) -> Self {
        let mut tracker = Self::default();
        tracker.reset(note_count);
        tracker
    }

    pub fn reset(&mut self, note_count: usize) {
        *self = Self {
            score_gain: if note_count == 0 {
                0.0
            } else {
                MAX_SCORE / note_count as f64
            },
            ..Self::default()
        };
    }

    pub fn record(&mut self, grade: Grade) {
        match grade {
            Grade::Perfect => self.perfect += 1,
            Grade::Good => self.good += 1,
            Grade::Bad => self.bad += 1,
            Grade::Miss => self.miss += 1,
        }
        self.score += self.score_gain * grade_weight(grade);
    }

    /// Feeds any note-resolving event; everything else is ignored.
    pub fn observe(&mut self, event: &GameEvent) {
        if let Some(grade) = event.resolved_grade() {
            self.record(grade);
        }
    }

    #[inline(always)]
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn display_score(&self) -> u32 {
        self.score.ceil().min(MAX_SCORE) as u32
    }

    pub const fn count(&self, grade: Grade) -> u32 {
        match grade {
            Grade::Perfect => self.perfect,
            Grade::Good => self.good,
            Grade::Bad => self.bad,
            Grade::Miss => self.miss,
        }
    }

    pub const fn judged(&self) -> u32 {
        self.perfect + self.good + self.bad + self.miss
    }
}

use crate::game::beatmap::Beatmap;
use crate::game::events::GameEvent;
use crate::game::judgment::{Grade, average_hold_grade, grade_for_distance};
use crate::game::note::{NoteInstance, PressState};
use log::debug;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

/// How far (drop-axis units) from the judgement line a press may still reach
/// a note, and how far behind it a note travels before it counts as missed.
pub const DEFAULT_DETECTION_DISTANCE: f32 = 0.5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnState {
    Idle,
    Tracking,
    Holding,
}

/// Live notes and hit/miss state for one input lane.
///
/// Judgeable notes sit in `live` keyed by start subline until they are hit,
/// missed, or superseded by an edit. A pressed hold moves out of `live` into
/// `holding`, where it can only be resolved by release or by its end
/// crossing the line; it never falls through as a miss.
#[derive(Clone, Debug)]
pub struct ColumnRuntime {
    column: usize,
    detection_distance: f32,
    drop_speed: f32,
    authoring: bool,
    key_down: bool,
    live: FxHashMap<usize, NoteInstance>,
    fillers: Vec<NoteInstance>,
    holding: Option<NoteInstance>,
}

impl ColumnRuntime {
    pub fn new(column: usize, detection_distance: f32) -> Self {
        let detection_distance = if detection_distance.is_finite() && detection_distance > 0.0 {
            detection_distance
        } else {
            DEFAULT_DETECTION_DISTANCE
        };
        Self {
            column,
            detection_distance,
            drop_speed: 1.0,
            authoring: false,
            key_down: false,
            live: FxHashMap::default(),
            fillers: Vec::new(),
            holding: None,
        }
    }

    #[inline(always)]
    pub const fn column(&self) -> usize {
        self.column
    }

    pub fn state(&self) -> ColumnState {
        if self.holding.is_some() {
            ColumnState::Holding
        } else if self.live.is_empty() {
            ColumnState::Idle
        } else {
            ColumnState::Tracking
        }
    }

    /// Judgeable notes still waiting in this column.
    #[inline(always)]
    pub fn objects_leftover(&self) -> usize {
        self.live.len()
    }

    #[inline(always)]
    pub const fn is_holding(&self) -> bool {
        self.holding.is_some()
    }

    #[inline(always)]
    pub const fn is_key_down(&self) -> bool {
        self.key_down
    }

    #[inline(always)]
    pub const fn held_note(&self) -> Option<&NoteInstance> {
        self.holding.as_ref()
    }

    #[inline(always)]
    pub fn note_at(&self, subline: usize) -> Option<&NoteInstance> {
        self.live.get(&subline)
    }

    pub fn live_notes(&self) -> impl Iterator<Item = &NoteInstance> {
        self.live.values()
    }

    #[inline(always)]
    pub fn fillers(&self) -> &[NoteInstance] {
        &self.fillers
    }

    #[inline(always)]
    pub const fn is_authoring(&self) -> bool {
        self.authoring
    }

    /// Authoring columns keep every note alive and never report misses.
    pub fn set_authoring(&mut self, authoring: bool) {
        self.authoring = authoring;
    }

    #[inline(always)]
    fn miss_boundary(&self, now: f32) -> f32 {
        now * self.drop_speed - self.detection_distance
    }

    /// Rebuilds the live set from the beatmap's metadata as of `from_time`.
    /// Outside authoring, notes already past the miss boundary stay gone.
    pub fn materialize(&mut self, beatmap: &Beatmap, from_time: f32) {
        self.live.clear();
        self.fillers.clear();
        self.holding = None;
        self.key_down = false;
        self.drop_speed = beatmap.drop_speed();

        let boundary = self.miss_boundary(from_time);
        for (subline, meta) in beatmap.notes_in_column(self.column) {
            let note = NoteInstance::from_meta(beatmap, subline, meta);
            if !self.authoring && note.position() < boundary {
                continue;
            }
            self.live.insert(subline, note);
        }
        for sequence in 0..beatmap.sequence_count() {
            let subline = beatmap.subline_index(sequence, 0);
            let position = beatmap.note_position(subline);
            if self.authoring || position >= boundary {
                self.fillers.push(NoteInstance::Blank { subline, position });
            }
        }
        debug!(
            "Column {} materialized {} notes from {from_time:.3}s.",
            self.column,
            self.live.len()
        );
    }

    // Closest judgeable note within reach of the line; earlier subline wins ties.
    fn nearest_note(&self, line: f32) -> Option<usize> {
        self.live
            .values()
            .filter(|note| note.is_judgeable())
            .map(|note| (note.subline(), (note.position() - line).abs()))
            .filter(|&(_, distance)| distance <= self.detection_distance)
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            })
            .map(|(subline, _)| subline)
    }

    pub fn key_down(&mut self, event_time: f32, events: &mut Vec<GameEvent>) {
        self.key_down = true;
        if self.holding.is_some() {
            return;
        }
        let line = event_time * self.drop_speed;
        let Some(note) = self.nearest_note(line).and_then(|s| self.live.remove(&s)) else {
            return;
        };
        let distance = note.position() - line;
        let grade = grade_for_distance(distance);
        match note {
            NoteInstance::Hold { subline, end_subline, position, end_position, .. } if grade != Grade::Miss => {
                debug!("Column {} hold {subline}..={end_subline} pressed: {grade} ({distance:+.3}).", self.column);
                self.holding = Some(NoteInstance::Hold {
                    subline,
                    end_subline,
                    position,
                    end_position,
                    press: PressState::Pressed { grade },
                });
                events.push(GameEvent::HoldStarted { column: self.column, subline, grade });
            }
            _ => {
                let subline = note.subline();
                debug!("Column {} note {subline} hit: {grade} ({distance:+.3}).", self.column);
                events.push(GameEvent::NoteHit { column: self.column, subline, grade, distance });
            }
        }
    }

    /// `now` is the current tick time; a hold whose end has already crossed
    /// by then resolves as held through even if the release came first, graded
    /// by how far past the line the end is at `now`.
    pub fn key_up(&mut self, event_time: f32, now: f32, events: &mut Vec<GameEvent>) {
        self.key_down = false;
        let Some(held) = self.holding else {
            return;
        };
        let end = held.end_position();
        let line = now * self.drop_speed;
        let release_line = event_time * self.drop_speed;
        if end <= line || end <= release_line {
            self.resolve_hold((line - end).max(0.0), false, events);
        } else {
            self.resolve_hold(end - release_line, true, events);
        }
    }

    /// Per-tick pass: completes held-through holds, then sweeps notes that
    /// fell behind the miss boundary.
    pub fn update(&mut self, now: f32, events: &mut Vec<GameEvent>) {
        let line = now * self.drop_speed;
        if let Some(held) = self.holding
            && held.end_position() <= line
        {
            self.resolve_hold(line - held.end_position(), false, events);
        }
        if self.authoring {
            return;
        }

        let boundary = self.miss_boundary(now);
        let mut missed: Vec<usize> = self
            .live
            .iter()
            .filter(|(_, note)| note.position() < boundary)
            .map(|(&subline, _)| subline)
            .collect();
        if !missed.is_empty() {
            missed.sort_unstable();
            for subline in missed {
                self.live.remove(&subline);
                debug!("Column {} note {subline} missed.", self.column);
                events.push(GameEvent::NoteMissed { column: self.column, subline });
            }
        }
        self.fillers.retain(|filler| filler.position() >= boundary);
    }

    /// Song is over: an active hold resolves against `now` and every
    /// remaining note is missed.
    pub fn finish(&mut self, now: f32, events: &mut Vec<GameEvent>) {
        if let Some(held) = self.holding {
            let remaining = held.end_position() - now * self.drop_speed;
            self.resolve_hold(remaining.max(0.0), remaining > 0.0, events);
        }
        let mut rest: Vec<usize> = self.live.keys().copied().collect();
        rest.sort_unstable();
        for subline in rest {
            self.live.remove(&subline);
            events.push(GameEvent::NoteMissed { column: self.column, subline });
        }
        self.fillers.clear();
        self.key_down = false;
    }

    fn resolve_hold(&mut self, end_distance: f32, released_early: bool, events: &mut Vec<GameEvent>) {
        let Some(NoteInstance::Hold {
            subline,
            end_subline,
            press: PressState::Pressed { grade: press_grade },
            ..
        }) = self.holding.take()
        else {
            return;
        };
        let end_grade = grade_for_distance(end_distance);
        let grade = average_hold_grade(press_grade, end_grade);
        debug!(
            "Column {} hold {subline}..={end_subline} finished: {press_grade} + {end_grade} -> {grade}{}.",
            self.column,
            if released_early { " (released early)" } else { "" }
        );
        events.push(GameEvent::HoldFinished {
            column: self.column,
            subline,
            end_subline,
            press_grade,
            end_grade,
            grade,
            released_early,
        });
    }

    /* ---------------------------- authoring mirror ---------------------------- */

    /// (Re)spawns the note starting at `subline` from the beatmap's current
    /// metadata, or drops the live entry if there is none.
    pub fn create_note(&mut self, beatmap: &Beatmap, subline: usize) {
        self.live.remove(&subline);
        if let Some(meta) = beatmap.meta_at(subline, self.column) {
            self.live
                .insert(subline, NoteInstance::from_meta(beatmap, subline, meta));
        }
    }

    pub fn delete_note(&mut self, subline: usize) -> Option<NoteInstance> {
        self.live.remove(&subline)
    }

    /// Drops live notes inside a freshly drawn hold; the hold itself is
    /// respawned separately at `start`.
    pub fn hold_note_created(&mut self, start: usize, end: usize) {
        self.live.retain(|&subline, _| subline <= start || subline > end);
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnRuntime, ColumnState};
    use crate::game::beatmap::{Beatmap, BeatmapSettings};
    use crate::game::events::GameEvent;
    use crate::game::judgment::Grade;

    // 120 BPM, Quarter, drop speed 5: each row is 0.125s and 0.625 units.
    fn map() -> Beatmap {
        let settings = BeatmapSettings { bpm: 120, ..BeatmapSettings::default() };
        Beatmap::new("column", 20.0, &settings)
    }

    fn column_for(map: &Beatmap, column: usize) -> ColumnRuntime {
        let mut runtime = ColumnRuntime::new(column, 0.5);
        runtime.materialize(map, 0.0);
        runtime
    }

    #[test]
    fn perfect_hit_empties_the_column() {
        let mut m = map();
        m.add_hit(0, 0);
        let mut col = column_for(&m, 0);
        assert_eq!(col.objects_leftover(), 1);
        assert_eq!(col.state(), ColumnState::Tracking);

        let mut events = Vec::new();
        // Line at 0.03 units past the note.
        col.key_down(0.006, &mut events);
        assert!(
            matches!(events.as_slice(), [GameEvent::NoteHit { column: 0, subline: 0, grade: Grade::Perfect, .. }]),
            "unexpected events: {events:?}"
        );
        assert_eq!(col.objects_leftover(), 0);
        assert_eq!(col.state(), ColumnState::Idle);
    }

    #[test]
    fn press_picks_the_nearest_note() {
        let mut m = map();
        m.add_hit(0, 1);
        m.add_hit(1, 1);
        let mut col = column_for(&m, 1);
        let mut events = Vec::new();
        col.key_down(0.1, &mut events); // line 0.5: row 1 is 0.125 away
        assert!(matches!(events[0], GameEvent::NoteHit { subline: 1, grade: Grade::Bad, .. }));
        assert!(col.note_at(0).is_some());
    }

    #[test]
    fn press_out_of_reach_does_nothing() {
        let mut m = map();
        m.add_hit(16, 0); // 2.0s -> 10.0 units
        let mut col = column_for(&m, 0);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        assert!(events.is_empty());
        assert_eq!(col.objects_leftover(), 1);
        assert!(col.is_key_down());
    }

    #[test]
    fn late_press_inside_reach_is_a_judged_miss() {
        let mut m = map();
        m.add_hold(8, 0, 4); // starts at 1.0s -> 5.0 units
        let mut col = column_for(&m, 0);
        let mut events = Vec::new();
        col.key_down(1.08, &mut events); // 0.4 units late
        assert!(matches!(events[0], GameEvent::NoteHit { grade: Grade::Miss, .. }));
        assert!(!col.is_holding(), "a missed press never starts a hold");
    }

    #[test]
    fn hold_held_through_resolves_at_its_end() {
        let mut m = map();
        m.add_hold(8, 1, 5); // 1.0s..1.5s
        let mut col = column_for(&m, 1);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        assert!(matches!(events[0], GameEvent::HoldStarted { subline: 8, grade: Grade::Perfect, .. }));
        assert_eq!(col.state(), ColumnState::Holding);
        assert_eq!(col.objects_leftover(), 0);

        col.update(1.2, &mut events);
        assert_eq!(events.len(), 1, "pressed holds never fall through as misses");
        col.update(1.5, &mut events);
        assert!(
            matches!(
                events[1],
                GameEvent::HoldFinished { subline: 8, end_subline: 12, grade: Grade::Perfect, released_early: false, .. }
            ),
            "unexpected {:?}",
            events[1]
        );
        assert_eq!(col.state(), ColumnState::Idle);
    }

    #[test]
    fn early_release_averages_press_and_release() {
        let mut m = map();
        m.add_hold(8, 1, 5);
        let mut col = column_for(&m, 1);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        col.key_up(1.3, 1.3, &mut events); // 1.0 unit short of the end
        assert!(matches!(
            events[1],
            GameEvent::HoldFinished { press_grade: Grade::Perfect, end_grade: Grade::Miss, grade: Grade::Bad, released_early: true, .. }
        ));
    }

    #[test]
    fn late_tick_grades_the_end_where_it_is() {
        let mut m = map();
        m.add_hold(8, 1, 5); // ends at 1.5s -> 7.5 units
        let mut col = column_for(&m, 1);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        col.update(1.54, &mut events); // end is 0.2 units past the line
        assert!(
            matches!(
                events[1],
                GameEvent::HoldFinished { press_grade: Grade::Perfect, end_grade: Grade::Bad, grade: Grade::Good, released_early: false, .. }
            ),
            "unexpected {:?}",
            events[1]
        );

        let mut col = column_for(&m, 1);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        col.key_up(1.45, 1.54, &mut events);
        assert!(matches!(
            events[1],
            GameEvent::HoldFinished { end_grade: Grade::Bad, released_early: false, .. }
        ));
    }

    #[test]
    fn notes_past_a_lowered_bpm_bound_stay_off_the_field() {
        let settings = BeatmapSettings { bpm: 240, ..BeatmapSettings::default() };
        let mut m = Beatmap::new("bound", 10.0, &settings);
        m.add_hit(150, 2);
        m.set_bpm(120);
        let col = column_for(&m, 2);
        assert_eq!(col.objects_leftover(), 0);
        assert_eq!(col.state(), ColumnState::Idle);
    }

    #[test]
    fn end_of_span_wins_over_release_in_the_same_tick() {
        let mut m = map();
        m.add_hold(8, 1, 5);
        let mut col = column_for(&m, 1);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        col.key_up(1.45, 1.5, &mut events);
        assert!(matches!(
            events[1],
            GameEvent::HoldFinished { grade: Grade::Perfect, released_early: false, .. }
        ));
    }

    #[test]
    fn unpressed_notes_miss_behind_the_line() {
        let mut m = map();
        m.add_hit(4, 2); // 0.5s -> 2.5 units, missed once the line passes 3.0
        m.add_hit(5, 2);
        let mut col = column_for(&m, 2);
        let mut events = Vec::new();
        col.update(0.59, &mut events);
        assert!(events.is_empty());
        col.update(0.75, &mut events);
        assert_eq!(
            events,
            vec![
                GameEvent::NoteMissed { column: 2, subline: 4 },
                GameEvent::NoteMissed { column: 2, subline: 5 },
            ],
            "misses are reported in subline order"
        );
        assert_eq!(col.objects_leftover(), 0);
    }

    #[test]
    fn authoring_columns_never_miss() {
        let mut m = map();
        m.add_hit(0, 0);
        let mut col = ColumnRuntime::new(0, 0.5);
        col.set_authoring(true);
        col.materialize(&m, 5.0);
        assert_eq!(col.objects_leftover(), 1, "authoring spawns past notes too");
        let mut events = Vec::new();
        col.update(8.0, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn materialize_skips_notes_behind_the_boundary() {
        let mut m = map();
        m.add_hit(0, 3);
        m.add_hit(40, 3);
        let mut col = ColumnRuntime::new(3, 0.5);
        col.materialize(&m, 2.0);
        assert!(col.note_at(0).is_none());
        assert!(col.note_at(40).is_some());
        assert!(col.fillers().iter().all(|f| !f.is_judgeable()));
        assert_eq!(col.fillers().len(), 9, "one filler per sequence still ahead");
    }

    #[test]
    fn finish_misses_everything_left() {
        let mut m = map();
        m.add_hit(100, 0);
        m.add_hold(8, 0, 5);
        let mut col = column_for(&m, 0);
        let mut events = Vec::new();
        col.key_down(1.0, &mut events);
        col.finish(1.2, &mut events);
        assert!(matches!(events[1], GameEvent::HoldFinished { released_early: true, .. }));
        assert_eq!(events[2], GameEvent::NoteMissed { column: 0, subline: 100 });
        assert_eq!(col.state(), ColumnState::Idle);
    }

    #[test]
    fn authoring_mirror_tracks_edits() {
        let mut m = map();
        let mut col = ColumnRuntime::new(1, 0.5);
        col.set_authoring(true);
        col.materialize(&m, 0.0);

        m.add_hit(3, 1);
        m.add_hit(6, 1);
        col.create_note(&m, 3);
        col.create_note(&m, 6);
        assert_eq!(col.objects_leftover(), 2);

        m.add_hold(2, 1, 6);
        col.hold_note_created(2, 7);
        col.create_note(&m, 2);
        assert_eq!(col.objects_leftover(), 1);
        assert!(col.note_at(2).is_some_and(|n| n.end_position() > n.position()));

        assert!(col.delete_note(2).is_some());
        assert!(col.delete_note(2).is_none());
        assert_eq!(col.state(), ColumnState::Idle);
    }
}

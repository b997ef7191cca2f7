use crate::game::beatmap::{Beatmap, NoteMeta};
use crate::game::column::ColumnRuntime;
use crate::game::timing::{Division, format_song_time_precise};
use log::{debug, info};

/// A hold being drawn: anchored at `start`, `end` follows the drag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HoldDraft {
    pub column: usize,
    pub start: usize,
    pub end: usize,
}

/// Authoring state that outlives a single `Editor` borrow: the last
/// committed copy of the beatmap and any in-progress hold gesture.
#[derive(Clone, Debug)]
pub struct EditSession {
    snapshot: Beatmap,
    hold_draft: Option<HoldDraft>,
    dirty: bool,
}

impl EditSession {
    pub fn new(snapshot: Beatmap) -> Self {
        Self { snapshot, hold_draft: None, dirty: false }
    }

    #[inline(always)]
    pub fn snapshot(&self) -> &Beatmap {
        &self.snapshot
    }

    #[inline(always)]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline(always)]
    pub const fn hold_draft(&self) -> Option<HoldDraft> {
        self.hold_draft
    }
}

/// Edits the player's live beatmap and mirrors each change into the column
/// runtimes so the field never needs a full rescan after a note edit.
pub struct Editor<'a> {
    session: &'a mut EditSession,
    beatmap: &'a mut Beatmap,
    columns: &'a mut [ColumnRuntime],
    cursor: &'a mut Option<usize>,
    now: f32,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(
        session: &'a mut EditSession,
        beatmap: &'a mut Beatmap,
        columns: &'a mut [ColumnRuntime],
        cursor: &'a mut Option<usize>,
        now: f32,
    ) -> Self {
        Self { session, beatmap, columns, cursor, now }
    }

    #[inline(always)]
    pub fn beatmap(&self) -> &Beatmap {
        &*self.beatmap
    }

    #[inline(always)]
    pub fn session(&self) -> &EditSession {
        &*self.session
    }

    /// Preview-grid row under `seconds`, the cell a pointer at that time edits.
    pub fn subline_at_time(&self, seconds: f32) -> usize {
        let subline = self.beatmap.time_grid().subline_at(seconds);
        self.beatmap.snap_to_preview(subline)
    }

    /// `mm:ss.mmm` readout of the time the editor is looking at.
    pub fn time_readout(&self) -> String {
        format_song_time_precise(self.now)
    }

    fn in_grid(&self, subline: usize, column: usize) -> bool {
        column < self.beatmap.lines() && column < self.columns.len() && subline < self.beatmap.subline_count()
    }

    fn rematerialize(&mut self) {
        for column in self.columns.iter_mut() {
            column.materialize(self.beatmap, self.now);
        }
        *self.cursor = None;
    }

    // A note ending right before `subline` may have been shortened by the
    // last edit; respawn it from its root.
    fn sync_predecessor(&mut self, subline: usize, column: usize) {
        if subline == 0 || !self.beatmap.is_occupied(subline - 1, column) {
            return;
        }
        let root = self.beatmap.root_note(subline - 1, column);
        self.columns[column].create_note(self.beatmap, root);
    }

    // --- Note tools ---

    pub fn paint_hit(&mut self, subline: usize, column: usize) -> bool {
        if !self.in_grid(subline, column) {
            debug!("Ignored hit outside the grid at {subline}/{column}.");
            return false;
        }
        let replaced = self
            .beatmap
            .is_occupied(subline, column)
            .then(|| self.beatmap.root_note(subline, column));
        self.beatmap.add_hit(subline, column);
        if let Some(root) = replaced {
            self.columns[column].delete_note(root);
        }
        self.columns[column].create_note(self.beatmap, subline);
        self.sync_predecessor(subline, column);
        self.session.dirty = true;
        true
    }

    pub fn erase(&mut self, subline: usize, column: usize) -> bool {
        if !self.in_grid(subline, column) || !self.beatmap.is_occupied(subline, column) {
            return false;
        }
        let root = self.beatmap.root_note(subline, column);
        self.beatmap.delete(subline, column);
        self.columns[column].delete_note(root);
        self.sync_predecessor(subline, column);
        self.session.dirty = true;
        true
    }

    pub fn begin_hold(&mut self, subline: usize, column: usize) -> bool {
        if !self.in_grid(subline, column) {
            return false;
        }
        self.session.hold_draft = Some(HoldDraft { column, start: subline, end: subline + 1 });
        true
    }

    /// Moves the draft's end, keeping it at least one row past `start`.
    pub fn drag_hold(&mut self, subline: usize) {
        if let Some(draft) = self.session.hold_draft.as_mut() {
            draft.end = subline.max(draft.start + 1);
        }
    }

    pub fn cancel_hold(&mut self) {
        self.session.hold_draft = None;
    }

    /// Writes the drafted hold into the beatmap. Returns false when there
    /// was no draft or the span did not fit.
    pub fn finish_hold(&mut self) -> bool {
        let Some(HoldDraft { column, start, end }) = self.session.hold_draft.take() else {
            return false;
        };
        self.beatmap.add_hold(start, column, end - start + 1);
        if self.beatmap.meta_at(start, column) != Some(NoteMeta::Hold { end }) {
            debug!("Hold {start}..={end} on column {column} was rejected.");
            return false;
        }
        let runtime = &mut self.columns[column];
        runtime.hold_note_created(start, end);
        runtime.create_note(self.beatmap, start);
        self.sync_predecessor(start, column);
        self.session.dirty = true;
        true
    }

    // --- Map parameters ---

    pub fn set_bpm(&mut self, bpm: u32) -> bool {
        if !self.beatmap.set_bpm(bpm) {
            return false;
        }
        self.session.hold_draft = None;
        self.rematerialize();
        self.session.dirty = true;
        true
    }

    /// Always moves the preview grid; re-lays out notes only when the
    /// permanent division grows.
    pub fn set_division(&mut self, division: Division) -> bool {
        if !self.beatmap.set_division(division) {
            return false;
        }
        self.session.hold_draft = None;
        self.rematerialize();
        self.session.dirty = true;
        true
    }

    pub fn set_drop_speed(&mut self, drop_speed: f32) -> bool {
        if !self.beatmap.set_drop_speed(drop_speed) {
            return false;
        }
        self.rematerialize();
        self.session.dirty = true;
        true
    }

    pub fn set_start_point(&mut self, seconds: f32) {
        self.beatmap.set_start_point_seconds(seconds);
        self.session.dirty = true;
    }

    // --- Session ---

    #[inline(always)]
    pub fn is_dirty(&self) -> bool {
        self.session.dirty
    }

    /// Throws away every edit since the last commit.
    pub fn revert(&mut self) {
        *self.beatmap = self.session.snapshot.clone();
        self.session.hold_draft = None;
        self.session.dirty = false;
        self.rematerialize();
        info!("Reverted '{}' to its last saved state.", self.beatmap.map_name());
    }

    /// Offers (previous, edited) to `approve`. On approval the edited map
    /// becomes the new snapshot and a copy is returned for saving.
    pub fn commit_with<F>(&mut self, approve: F) -> Option<Beatmap>
    where
        F: FnOnce(&Beatmap, &Beatmap) -> bool,
    {
        if !approve(&self.session.snapshot, self.beatmap) {
            debug!("Save of '{}' was cancelled.", self.beatmap.map_name());
            return None;
        }
        self.session.snapshot = self.beatmap.clone();
        self.session.dirty = false;
        info!("Committed edits to '{}'.", self.beatmap.map_name());
        Some(self.beatmap.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::audio::ManualClock;
    use crate::game::beatmap::{Beatmap, BeatmapSettings, NoteMeta, NoteType};
    use crate::game::player::{BeatmapPlayer, PlayerSettings};
    use crate::game::timing::Division;

    fn editing_player() -> BeatmapPlayer<ManualClock> {
        let settings = BeatmapSettings { bpm: 120, ..BeatmapSettings::default() };
        let map = Beatmap::new("edit", 20.0, &settings);
        let mut player = BeatmapPlayer::new(ManualClock::new(20.0), map, PlayerSettings::default());
        player.enter_editor();
        player
    }

    #[test]
    fn painting_and_erasing_mirror_into_columns() {
        let mut player = editing_player();
        {
            let mut ed = player.editor().expect("editing");
            assert!(ed.paint_hit(5, 0));
            assert!(ed.paint_hit(9, 0));
            assert!(!ed.paint_hit(5, 7), "column outside the map");
            assert!(ed.erase(9, 0));
            assert!(!ed.erase(9, 0), "nothing left to erase");
            assert!(ed.is_dirty());
        }
        assert_eq!(player.beatmap().note_type_at(5, 0), NoteType::Hit);
        assert_eq!(player.columns()[0].objects_leftover(), 1);
    }

    #[test]
    fn drawn_hold_supersedes_notes_inside_it() {
        let mut player = editing_player();
        {
            let mut ed = player.editor().expect("editing");
            ed.paint_hit(11, 2);
            ed.paint_hit(13, 2);
            assert!(ed.begin_hold(10, 2));
            ed.drag_hold(3);
            assert_eq!(ed.session().hold_draft().map(|d| d.end), Some(11), "end stays past the start");
            ed.drag_hold(14);
            assert!(ed.finish_hold());
            assert!(!ed.finish_hold(), "draft is consumed");
        }
        assert_eq!(player.beatmap().meta_at(10, 2), Some(NoteMeta::Hold { end: 14 }));
        assert_eq!(player.beatmap().note_count(), 1);
        let column = &player.columns()[2];
        assert_eq!(column.objects_leftover(), 1);
        assert!(column.note_at(10).is_some());
    }

    #[test]
    fn hold_over_an_older_tail_refreshes_it() {
        let mut player = editing_player();
        {
            let mut ed = player.editor().expect("editing");
            ed.begin_hold(4, 1);
            ed.drag_hold(9);
            ed.finish_hold();
            ed.begin_hold(7, 1);
            ed.drag_hold(12);
            ed.finish_hold();
        }
        let expected_end = player.beatmap().note_position(6);
        let older = player.columns()[1].note_at(4).expect("older hold still live");
        assert!((older.end_position() - expected_end).abs() < 1e-5);
        assert_eq!(player.columns()[1].objects_leftover(), 2);
    }

    #[test]
    fn erasing_inside_a_hold_removes_it_from_the_field() {
        let mut player = editing_player();
        {
            let mut ed = player.editor().expect("editing");
            ed.begin_hold(20, 3);
            ed.drag_hold(25);
            ed.finish_hold();
            assert!(ed.erase(23, 3));
        }
        assert_eq!(player.columns()[3].objects_leftover(), 0);
        assert_eq!(player.beatmap().note_count(), 0);
    }

    #[test]
    fn revert_restores_the_snapshot() {
        let mut player = editing_player();
        {
            let mut ed = player.editor().expect("editing");
            ed.paint_hit(1, 1);
            assert!(ed.commit_with(|_, _| true).is_some());
            ed.paint_hit(2, 1);
            ed.set_bpm(180);
            ed.revert();
            assert!(!ed.is_dirty());
        }
        assert_eq!(player.beatmap().bpm(), 120);
        assert_eq!(player.beatmap().note_type_at(1, 1), NoteType::Hit);
        assert_eq!(player.beatmap().note_type_at(2, 1), NoteType::Blank);
        assert_eq!(player.columns()[1].objects_leftover(), 1);
    }

    #[test]
    fn commit_can_be_cancelled() {
        let mut player = editing_player();
        let mut ed = player.editor().expect("editing");
        ed.paint_hit(3, 0);
        let mut seen = None;
        let saved = ed.commit_with(|old, new| {
            seen = Some((old.note_count(), new.note_count()));
            false
        });
        assert!(saved.is_none());
        assert_eq!(seen, Some((0, 1)));
        assert!(ed.is_dirty(), "cancelled commits keep the edits pending");

        let saved = ed.commit_with(|_, _| true).expect("approved");
        assert_eq!(saved.note_count(), 1);
        assert_eq!(ed.session().snapshot().note_count(), 1);
    }

    #[test]
    fn division_changes_respect_the_preview_grid() {
        let mut player = editing_player();
        let mut ed = player.editor().expect("editing");
        ed.paint_hit(6, 0);
        assert!(!ed.set_division(Division::One), "coarser only moves the preview");
        // 0.8s is row 6 at Quarter; One snaps it down to row 4.
        assert_eq!(ed.subline_at_time(0.8), 4);
        assert!(ed.set_division(Division::Eighth));
        assert_eq!(ed.beatmap().note_type_at(12, 0), NoteType::Hit);
        assert_eq!(ed.subline_at_time(0.8), 12);
    }

    #[test]
    fn readout_formats_the_current_time() {
        let mut player = editing_player();
        player.seek(61.5);
        let ed = player.editor().expect("editing");
        assert_eq!(ed.time_readout(), "00:20.000", "clock clamps to the song length");
    }
}

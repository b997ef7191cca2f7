use crate::game::timing::{DEFAULT_BPM, Division, GridPosition, TimeGrid};
use log::debug;
use std::collections::BTreeMap;

pub const DEFAULT_LINES: usize = 4;
pub const DEFAULT_DROP_SPEED: f32 = 5.0;
pub const MIN_HOLD_LENGTH: usize = 2;

/// Contents of one grid cell. The discriminants are the persisted codes.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum NoteType {
    #[default]
    Blank = 0,
    Hit = 1,
    Hold = 2,
}

impl NoteType {
    #[inline(always)]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Blank),
            1 => Some(Self::Hit),
            2 => Some(Self::Hold),
            _ => None,
        }
    }
}

/// Metadata leaf stored at the start cell of every note.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoteMeta {
    Hit,
    Hold { end: usize },
}

impl NoteMeta {
    #[inline(always)]
    pub const fn note_type(self) -> NoteType {
        match self {
            Self::Hit => NoteType::Hit,
            Self::Hold { .. } => NoteType::Hold,
        }
    }

    /// Last subline covered by a note starting at `start`.
    #[inline(always)]
    pub const fn end_subline(self, start: usize) -> usize {
        match self {
            Self::Hit => start,
            Self::Hold { end } => end,
        }
    }
}

/// column -> leaf
pub type ColumnMeta = BTreeMap<usize, NoteMeta>;
/// start subline -> column -> leaf
pub type Metadata = BTreeMap<usize, ColumnMeta>;

#[derive(Clone, Debug, PartialEq)]
pub struct BeatmapSettings {
    pub bpm: u32,
    pub lines: usize,
    pub division: Division,
    pub drop_speed: f32,
    pub start_point_seconds: f32,
}

impl Default for BeatmapSettings {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            lines: DEFAULT_LINES,
            division: Division::Quarter,
            drop_speed: DEFAULT_DROP_SPEED,
            start_point_seconds: 0.0,
        }
    }
}

/// Note timeline of one song: a sequence x sub-sequence x column grid plus a
/// sparse index of note start cells.
///
/// Every edit keeps the two in step: each Hit cell and each contiguous Hold
/// run on a column owns exactly one metadata leaf keyed by its first subline.
/// Lookups and edits outside the grid degrade to `Blank` / no-op.
#[derive(Clone, Debug)]
pub struct Beatmap {
    map_name: String,
    bpm: u32,
    lines: usize,
    division: Division,
    preview_division: Division,
    song_duration_seconds: f32,
    start_point_seconds: f32,
    drop_speed: f32,
    // Sequences physically present in `grid`; never shrinks.
    allocated_sequences: usize,
    // Flat [subline][column] layout, sequence-major.
    grid: Vec<NoteType>,
    metadata: Metadata,
}

impl Beatmap {
    pub fn new(map_name: impl Into<String>, song_duration_seconds: f32, settings: &BeatmapSettings) -> Self {
        let song_duration_seconds = if song_duration_seconds.is_finite() {
            song_duration_seconds.max(0.0)
        } else {
            0.0
        };
        let mut beatmap = Self {
            map_name: map_name.into(),
            bpm: settings.bpm.max(1),
            lines: settings.lines.max(1),
            division: settings.division,
            preview_division: settings.division,
            song_duration_seconds,
            start_point_seconds: 0.0,
            drop_speed: DEFAULT_DROP_SPEED,
            allocated_sequences: 0,
            grid: Vec::new(),
            metadata: Metadata::new(),
        };
        beatmap.set_drop_speed(settings.drop_speed);
        beatmap.set_start_point_seconds(settings.start_point_seconds);
        beatmap.extend_by_bpm_change();
        beatmap
    }

    /// Rebuilds a map from persisted cells. `grid` must hold
    /// `sequences * slots * lines` cells in sequence-major order.
    pub fn from_parts(
        map_name: impl Into<String>,
        song_duration_seconds: f32,
        settings: &BeatmapSettings,
        sequences: usize,
        grid: Vec<NoteType>,
        metadata: Metadata,
    ) -> Result<Self, String> {
        let mut beatmap = Self::new(map_name, song_duration_seconds, settings);
        let expected = sequences * beatmap.slots() * beatmap.lines;
        if grid.len() != expected {
            return Err(format!(
                "grid holds {} cells, expected {expected} ({sequences} sequences x {} slots x {} lines)",
                grid.len(),
                beatmap.slots(),
                beatmap.lines
            ));
        }
        let subline_limit = sequences * beatmap.slots();
        for (&start, columns) in &metadata {
            for (&column, meta) in columns {
                let end = meta.end_subline(start);
                if column >= beatmap.lines || start >= subline_limit || end >= subline_limit || end < start {
                    return Err(format!("metadata leaf at subline {start}, column {column} is out of range"));
                }
            }
        }
        beatmap.allocated_sequences = sequences;
        beatmap.grid = grid;
        beatmap.metadata = metadata;
        beatmap.extend_by_bpm_change();
        Ok(beatmap)
    }

    // --- Accessors ---

    #[inline(always)]
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    #[inline(always)]
    pub const fn bpm(&self) -> u32 {
        self.bpm
    }

    #[inline(always)]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    #[inline(always)]
    pub const fn division(&self) -> Division {
        self.division
    }

    #[inline(always)]
    pub const fn preview_division(&self) -> Division {
        self.preview_division
    }

    #[inline(always)]
    pub const fn slots(&self) -> usize {
        self.division.slots()
    }

    #[inline(always)]
    pub const fn song_duration_seconds(&self) -> f32 {
        self.song_duration_seconds
    }

    #[inline(always)]
    pub const fn start_point_seconds(&self) -> f32 {
        self.start_point_seconds
    }

    #[inline(always)]
    pub const fn drop_speed(&self) -> f32 {
        self.drop_speed
    }

    #[inline(always)]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[inline(always)]
    pub const fn allocated_sequences(&self) -> usize {
        self.allocated_sequences
    }

    #[inline(always)]
    pub fn cells(&self) -> &[NoteType] {
        &self.grid
    }

    #[inline(always)]
    pub fn time_grid(&self) -> TimeGrid {
        TimeGrid::new(self.bpm, self.division)
    }

    /// Sequences reachable at the current BPM.
    #[inline(always)]
    pub fn sequence_count(&self) -> usize {
        self.time_grid().sequence_count(self.song_duration_seconds)
    }

    #[inline(always)]
    pub fn subline_count(&self) -> usize {
        self.sequence_count() * self.slots()
    }

    // --- Conversions ---

    #[inline(always)]
    pub const fn subline_index(&self, sequence: usize, sub_sequence: usize) -> usize {
        sequence * self.division.slots() + sub_sequence
    }

    #[inline(always)]
    pub fn split_subline(&self, subline: usize) -> GridPosition {
        self.time_grid().split_subline(subline)
    }

    #[inline(always)]
    pub fn time_per_sequence(&self) -> f32 {
        self.time_grid().time_per_sequence()
    }

    #[inline(always)]
    pub fn time_per_sub_sequence(&self) -> f32 {
        self.time_grid().time_per_sub_sequence()
    }

    #[inline(always)]
    pub fn time_at(&self, sequence: usize, sub_sequence: usize) -> f32 {
        self.time_grid().time_at(sequence, sub_sequence)
    }

    #[inline(always)]
    pub fn time_at_subline(&self, subline: usize) -> f32 {
        self.time_grid().time_at_subline(subline)
    }

    /// Distance along the drop axis from the song origin to `subline`.
    #[inline(always)]
    pub fn note_position(&self, subline: usize) -> f32 {
        self.time_at_subline(subline) * self.drop_speed
    }

    // --- Queries ---

    #[inline(always)]
    fn cell(&self, subline: usize, column: usize) -> Option<usize> {
        (column < self.lines && subline < self.subline_count()).then(|| subline * self.lines + column)
    }

    pub fn note_type(&self, sequence: usize, sub_sequence: usize, column: usize) -> NoteType {
        if sub_sequence >= self.slots() {
            return NoteType::Blank;
        }
        self.note_type_at(self.subline_index(sequence, sub_sequence), column)
    }

    pub fn note_type_at(&self, subline: usize, column: usize) -> NoteType {
        self.cell(subline, column)
            .map_or(NoteType::Blank, |idx| self.grid[idx])
    }

    #[inline(always)]
    pub fn is_occupied(&self, subline: usize, column: usize) -> bool {
        self.note_type_at(subline, column) != NoteType::Blank
    }

    #[inline(always)]
    pub fn meta_at(&self, subline: usize, column: usize) -> Option<NoteMeta> {
        self.metadata.get(&subline).and_then(|cols| cols.get(&column)).copied()
    }

    // A leaf past the current BPM's bound stays stored but is not playable
    // until the bound grows back over it.
    #[inline(always)]
    fn is_reachable(&self, subline: usize, column: usize, meta: NoteMeta) -> bool {
        self.note_type_at(subline, column) == meta.note_type()
    }

    /// Number of playable notes (metadata leaves inside the current bound).
    pub fn note_count(&self) -> usize {
        self.metadata
            .iter()
            .map(|(&subline, cols)| {
                cols.iter()
                    .filter(|&(&column, &meta)| self.is_reachable(subline, column, meta))
                    .count()
            })
            .sum()
    }

    /// Playable notes starting on `column`, in subline order.
    pub fn notes_in_column(&self, column: usize) -> impl Iterator<Item = (usize, NoteMeta)> + '_ {
        self.metadata.iter().filter_map(move |(&subline, cols)| {
            cols.get(&column)
                .copied()
                .filter(|&meta| self.is_reachable(subline, column, meta))
                .map(|meta| (subline, meta))
        })
    }

    /// Start subline of the Hold span containing `subline`; `subline` itself
    /// for anything that is not a Hold cell or has no discoverable start.
    pub fn root_note(&self, subline: usize, column: usize) -> usize {
        if self.note_type_at(subline, column) != NoteType::Hold {
            return subline;
        }
        let mut s = subline;
        loop {
            if self.note_type_at(s, column) != NoteType::Hold {
                return subline;
            }
            if self.meta_at(s, column).is_some() {
                return s;
            }
            if s == 0 {
                return subline;
            }
            s -= 1;
        }
    }

    /// Snaps a subline down onto the preview division's coarser grid.
    pub fn snap_to_preview(&self, subline: usize) -> usize {
        let step = (self.slots() / self.preview_division.slots()).max(1);
        subline - subline % step
    }

    // --- Edits ---

    pub fn add_hit(&mut self, subline: usize, column: usize) {
        let Some(idx) = self.cell(subline, column) else {
            debug!("Rejected hit at subline {subline}, column {column}: outside the grid.");
            return;
        };
        if self.grid[idx] != NoteType::Blank {
            self.delete(subline, column);
        }
        self.grid[idx] = NoteType::Hit;
        self.insert_meta(subline, column, NoteMeta::Hit);
    }

    pub fn add_hold(&mut self, subline: usize, column: usize, length: usize) {
        if length < MIN_HOLD_LENGTH {
            debug!("Rejected hold at subline {subline}, column {column}: length {length} < {MIN_HOLD_LENGTH}.");
            return;
        }
        let end = subline + length - 1;
        if self.cell(subline, column).is_none() || self.cell(end, column).is_none() {
            debug!("Rejected hold {subline}..={end} on column {column}: outside the grid.");
            return;
        }
        for s in subline..=end {
            if self.is_occupied(s, column) {
                self.delete_with_floor(s, column, subline);
            }
            let idx = s * self.lines + column;
            self.grid[idx] = NoteType::Hold;
        }
        self.insert_meta(subline, column, NoteMeta::Hold { end });
    }

    #[inline(always)]
    pub fn delete(&mut self, subline: usize, column: usize) {
        self.delete_with_floor(subline, column, 0);
    }

    /// Removes the note occupying (`subline`, `column`). Hold roots are never
    /// searched for below `floor`.
    pub fn delete_with_floor(&mut self, subline: usize, column: usize, floor: usize) {
        let Some(idx) = self.cell(subline, column) else {
            return;
        };
        match self.grid[idx] {
            NoteType::Blank => {}
            NoteType::Hit => {
                self.grid[idx] = NoteType::Blank;
                self.remove_meta(subline, column);
            }
            NoteType::Hold => match self.find_hold_root(subline, column, floor) {
                Some((root, end)) => {
                    self.clear_cells(root, end, column);
                    self.remove_meta(root, column);
                }
                None => {
                    let run_end = self.hold_run_end(subline, column);
                    self.clear_cells(subline, run_end, column);
                    self.remove_meta(subline, column);
                    self.truncate_hold_before(subline, column);
                }
            },
        }
    }

    pub fn clear_notes(&mut self) {
        self.grid.fill(NoteType::Blank);
        self.metadata.clear();
    }

    /// Grows the grid when the current BPM needs more sequences than are
    /// allocated. Existing cells keep their coordinates; returns whether the
    /// grid grew.
    pub fn extend_by_bpm_change(&mut self) -> bool {
        let required = self.sequence_count();
        if required <= self.allocated_sequences {
            return false;
        }
        self.grid
            .resize(required * self.slots() * self.lines, NoteType::Blank);
        debug!(
            "Extended '{}' from {} to {required} sequences.",
            self.map_name, self.allocated_sequences
        );
        self.allocated_sequences = required;
        true
    }

    /// Returns whether the BPM changed.
    pub fn set_bpm(&mut self, bpm: u32) -> bool {
        let bpm = bpm.max(1);
        if bpm == self.bpm {
            return false;
        }
        self.bpm = bpm;
        self.extend_by_bpm_change();
        true
    }

    /// Moves the preview division to `division`; the permanent division only
    /// follows when that adds slots. Returns whether the permanent division
    /// changed.
    pub fn set_division(&mut self, division: Division) -> bool {
        self.preview_division = division;
        if division.slots() <= self.division.slots() {
            return false;
        }
        let factor = division.slots() / self.division.slots();
        let lines = self.lines;
        let old_sublines = self.allocated_sequences * self.slots();

        let mut grid = vec![NoteType::Blank; old_sublines * factor * lines];
        for s in 0..old_sublines {
            for column in 0..lines {
                grid[s * factor * lines + column] = self.grid[s * lines + column];
            }
        }
        let mut metadata = Metadata::new();
        for (&start, columns) in &self.metadata {
            let start = start * factor;
            for (&column, meta) in columns {
                let meta = match *meta {
                    NoteMeta::Hit => NoteMeta::Hit,
                    NoteMeta::Hold { end } => {
                        let end = end * factor;
                        for s in start..=end {
                            grid[s * lines + column] = NoteType::Hold;
                        }
                        NoteMeta::Hold { end }
                    }
                };
                metadata.entry(start).or_default().insert(column, meta);
            }
        }

        self.grid = grid;
        self.metadata = metadata;
        self.division = division;
        debug!("Raised '{}' division to {division} (x{factor}).", self.map_name);
        true
    }

    pub fn set_drop_speed(&mut self, drop_speed: f32) -> bool {
        if !drop_speed.is_finite() || drop_speed <= 0.0 || drop_speed == self.drop_speed {
            return false;
        }
        self.drop_speed = drop_speed;
        true
    }

    pub fn set_start_point_seconds(&mut self, seconds: f32) {
        if seconds.is_finite() {
            self.start_point_seconds = seconds.clamp(0.0, self.song_duration_seconds);
        }
    }

    pub fn set_map_name(&mut self, name: impl Into<String>) {
        self.map_name = name.into();
    }

    // --- Internals ---

    fn insert_meta(&mut self, subline: usize, column: usize, meta: NoteMeta) {
        self.metadata.entry(subline).or_default().insert(column, meta);
    }

    fn remove_meta(&mut self, subline: usize, column: usize) {
        if let Some(columns) = self.metadata.get_mut(&subline) {
            columns.remove(&column);
            if columns.is_empty() {
                self.metadata.remove(&subline);
            }
        }
    }

    fn clear_cells(&mut self, from: usize, to: usize, column: usize) {
        let limit = self.allocated_sequences * self.slots();
        for s in from..=to.min(limit.saturating_sub(1)) {
            self.grid[s * self.lines + column] = NoteType::Blank;
        }
    }

    // First leaf on `column` at or below `subline` (down to `floor`), accepted
    // only when it is a Hold that still covers `subline`.
    fn find_hold_root(&self, subline: usize, column: usize, floor: usize) -> Option<(usize, usize)> {
        if floor > subline {
            return None;
        }
        let (&root, cols) = self
            .metadata
            .range(floor..=subline)
            .rev()
            .find(|(_, cols)| cols.contains_key(&column))?;
        match cols.get(&column) {
            Some(NoteMeta::Hold { end }) if *end >= subline => Some((root, *end)),
            _ => None,
        }
    }

    // Last subline of the Hold run beginning at `subline`, stopping before a
    // cell that starts its own span.
    fn hold_run_end(&self, subline: usize, column: usize) -> usize {
        let mut end = subline;
        while self.note_type_at(end + 1, column) == NoteType::Hold && self.meta_at(end + 1, column).is_none() {
            end += 1;
        }
        end
    }

    // Shortens a Hold that ran into `subline` so it ends just before it.
    fn truncate_hold_before(&mut self, subline: usize, column: usize) {
        if subline == 0 || self.note_type_at(subline - 1, column) != NoteType::Hold {
            return;
        }
        let root = self.root_note(subline - 1, column);
        let Some(NoteMeta::Hold { end }) = self.meta_at(root, column) else {
            return;
        };
        if end < subline {
            return;
        }
        if root == subline - 1 {
            self.grid[root * self.lines + column] = NoteType::Hit;
            self.insert_meta(root, column, NoteMeta::Hit);
        } else {
            self.insert_meta(root, column, NoteMeta::Hold { end: subline - 1 });
        }
    }
}

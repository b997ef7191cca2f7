use crate::core::audio::AudioClock;
use crate::core::input::InputEdge;
use crate::game::beatmap::Beatmap;
use crate::game::column::{ColumnRuntime, DEFAULT_DETECTION_DISTANCE};
use crate::game::editor::{EditSession, Editor};
use crate::game::events::GameEvent;
use crate::game::timing::GridPosition;
use log::{debug, info, warn};
use std::collections::VecDeque;

pub const DEFAULT_END_DELAY_SECONDS: f32 = 3.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSettings {
    /// Playing time between the last judgement and EndPlay.
    pub end_delay_seconds: f32,
    pub detection_distance: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            end_delay_seconds: DEFAULT_END_DELAY_SECONDS,
            detection_distance: DEFAULT_DETECTION_DISTANCE,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Ended,
}

/// Drives one beatmap against an external clock: advances the grid cursor,
/// routes queued key edges to the columns, and decides when play is over.
///
/// Events accumulate in order until `drain_events` is called.
pub struct BeatmapPlayer<C: AudioClock> {
    clock: C,
    beatmap: Beatmap,
    settings: PlayerSettings,
    columns: Vec<ColumnRuntime>,
    state: PlaybackState,
    cursor: Option<usize>,
    end_countdown: Option<f32>,
    pending_edges: VecDeque<InputEdge>,
    events: Vec<GameEvent>,
    edit: Option<EditSession>,
    log_timer: f32,
}

impl<C: AudioClock> BeatmapPlayer<C> {
    pub fn new(clock: C, beatmap: Beatmap, settings: PlayerSettings) -> Self {
        let mut player = Self {
            clock,
            beatmap,
            settings,
            columns: Vec::new(),
            state: PlaybackState::Stopped,
            cursor: None,
            end_countdown: None,
            pending_edges: VecDeque::new(),
            events: Vec::new(),
            edit: None,
            log_timer: 0.0,
        };
        player.rebuild_columns();
        player
    }

    /// Swaps in another beatmap. Playback stops and any edit session is
    /// dropped.
    pub fn load_beatmap(&mut self, beatmap: Beatmap) {
        if self.state == PlaybackState::Playing {
            self.stop();
        }
        self.edit = None;
        self.beatmap = beatmap;
        self.state = PlaybackState::Stopped;
        self.rebuild_columns();
    }

    fn rebuild_columns(&mut self) {
        let detection = self.settings.detection_distance;
        self.columns = (0..self.beatmap.lines())
            .map(|column| ColumnRuntime::new(column, detection))
            .collect();
        let now = self.clock.current_time_seconds();
        self.rematerialize(now);
        self.cursor = None;
        info!(
            "Loaded beatmap '{}' ({} notes, {} BPM, {} lines).",
            self.beatmap.map_name(),
            self.beatmap.note_count(),
            self.beatmap.bpm(),
            self.beatmap.lines()
        );
        self.events.push(GameEvent::BeatmapLoaded {
            map_name: self.beatmap.map_name().to_string(),
            note_count: self.beatmap.note_count(),
        });
    }

    fn rematerialize(&mut self, now: f32) {
        for column in &mut self.columns {
            column.materialize(&self.beatmap, now);
        }
    }

    // --- Accessors ---

    #[inline(always)]
    pub fn beatmap(&self) -> &Beatmap {
        &self.beatmap
    }

    #[inline(always)]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline(always)]
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    #[inline(always)]
    pub fn columns(&self) -> &[ColumnRuntime] {
        &self.columns
    }

    #[inline(always)]
    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    #[inline(always)]
    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    #[inline(always)]
    pub const fn cursor_subline(&self) -> Option<usize> {
        self.cursor
    }

    pub fn cursor(&self) -> Option<GridPosition> {
        self.cursor.map(|s| self.beatmap.split_subline(s))
    }

    pub fn objects_leftover(&self) -> usize {
        self.columns.iter().map(ColumnRuntime::objects_leftover).sum()
    }

    #[inline(always)]
    pub const fn is_editing(&self) -> bool {
        self.edit.is_some()
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Transport ---

    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        let now = self.clock.current_time_seconds();
        self.clock.play();
        self.state = PlaybackState::Playing;
        self.end_countdown = None;
        self.cursor = None;
        self.pending_edges.clear();
        self.rematerialize(now);
        info!("Playing '{}' from {now:.3}s.", self.beatmap.map_name());
        self.events.push(GameEvent::PlayStarted);
    }

    pub fn stop(&mut self) {
        self.clock.stop();
        if self.state == PlaybackState::Playing {
            info!("Stopped '{}'.", self.beatmap.map_name());
        }
        self.state = PlaybackState::Stopped;
        self.end_countdown = None;
        self.pending_edges.clear();
        let now = self.clock.current_time_seconds();
        self.rematerialize(now);
    }

    /// Jumps the clock and respawns every column from the new time.
    pub fn seek(&mut self, seconds: f32) {
        self.clock.seek(seconds);
        let now = self.clock.current_time_seconds();
        self.rematerialize(now);
        self.cursor = None;
        self.end_countdown = None;
        self.pending_edges.clear();
        debug!("Seeked to {now:.3}s.");
    }

    // --- Input ---

    /// Queues a key edge stamped with the clock's current time.
    pub fn queue_input(&mut self, column: usize, pressed: bool) {
        let event_time = self.clock.current_time_seconds();
        self.pending_edges
            .push_back(InputEdge { column, pressed, event_time });
    }

    pub fn queue_edge(&mut self, edge: InputEdge) {
        self.pending_edges.push_back(edge);
    }

    #[inline(always)]
    fn process_input_edges(&mut self, now: f32) {
        while let Some(edge) = self.pending_edges.pop_front() {
            let Some(column) = self.columns.get_mut(edge.column) else {
                debug!("Dropped input for unknown column {}.", edge.column);
                continue;
            };
            if edge.pressed {
                column.key_down(edge.event_time, &mut self.events);
            } else {
                column.key_up(edge.event_time, now, &mut self.events);
            }
        }
    }

    // --- Tick ---

    /// One frame: input edges first, then the cursor, then per-column
    /// resolution, then end-of-play bookkeeping.
    pub fn update(&mut self, delta_time: f32) {
        if self.state != PlaybackState::Playing {
            self.pending_edges.clear();
            return;
        }
        let now = self.clock.current_time_seconds();

        self.process_input_edges(now);
        self.advance_cursor(now);
        for column in &mut self.columns {
            column.update(now, &mut self.events);
        }

        if self.edit.is_none() {
            self.check_end_of_play(now, delta_time);
        } else if !self.clock.is_playing() {
            self.state = PlaybackState::Stopped;
            info!("Editor preview reached {now:.3}s and stopped.");
        }

        self.log_timer += delta_time;
        if self.log_timer >= 1.0 {
            debug!(
                "Time: {now:.2}, Subline: {:?}, Leftover: {}",
                self.cursor,
                self.objects_leftover()
            );
            self.log_timer -= 1.0;
        }
    }

    fn advance_cursor(&mut self, now: f32) {
        let subline = self.beatmap.time_grid().subline_at(now);
        // Rows skipped by a long tick are still reported, in order. After a
        // seek or a desync only the landing row is.
        let first = match self.cursor {
            Some(prev) if subline == prev => return,
            Some(prev) if subline < prev => {
                warn!("Timing desync: cursor fell back from subline {prev} to {subline}; reseeking at {now:.3}s.");
                self.rematerialize(now);
                self.end_countdown = None;
                subline
            }
            Some(prev) => prev + 1,
            None => subline,
        };
        self.cursor = Some(subline);
        for row in first..=subline {
            self.events.push(GameEvent::SequenceChanged {
                position: self.beatmap.split_subline(row),
                subline: row,
            });
        }
    }

    fn check_end_of_play(&mut self, now: f32, delta_time: f32) {
        let clock_running = self.clock.is_playing();
        match self.end_countdown {
            Some(remaining) => {
                let remaining = remaining - delta_time;
                if remaining <= 0.0 || !clock_running {
                    self.finish_play();
                } else {
                    self.end_countdown = Some(remaining);
                }
            }
            None => {
                let cleared = self
                    .columns
                    .iter()
                    .all(|c| c.objects_leftover() == 0 && !c.is_holding());
                if !cleared && clock_running {
                    return;
                }
                if !cleared {
                    info!("Song ended with notes still on the field; missing the rest.");
                    for column in &mut self.columns {
                        column.finish(now, &mut self.events);
                    }
                }
                self.events.push(GameEvent::PreEndPlay);
                if clock_running {
                    debug!("All columns clear; ending in {:.2}s.", self.settings.end_delay_seconds);
                    self.end_countdown = Some(self.settings.end_delay_seconds.max(0.0));
                } else {
                    self.finish_play();
                }
            }
        }
    }

    fn finish_play(&mut self) {
        self.end_countdown = None;
        self.state = PlaybackState::Ended;
        self.clock.stop();
        info!("Finished '{}'.", self.beatmap.map_name());
        self.events.push(GameEvent::EndPlay);
    }

    // --- Authoring ---

    /// Snapshots the beatmap and switches every column to authoring mode.
    pub fn enter_editor(&mut self) {
        if self.edit.is_some() {
            return;
        }
        self.edit = Some(EditSession::new(self.beatmap.clone()));
        for column in &mut self.columns {
            column.set_authoring(true);
        }
        self.end_countdown = None;
        let now = self.clock.current_time_seconds();
        self.rematerialize(now);
        info!("Editing '{}'.", self.beatmap.map_name());
    }

    /// Leaves authoring mode. Uncommitted edits stay in the live beatmap;
    /// call `Editor::revert` first to drop them.
    pub fn exit_editor(&mut self) {
        let Some(session) = self.edit.take() else {
            return;
        };
        if session.is_dirty() {
            debug!("Leaving editor with uncommitted changes to '{}'.", self.beatmap.map_name());
        }
        for column in &mut self.columns {
            column.set_authoring(false);
        }
        self.cursor = None;
        let now = self.clock.current_time_seconds();
        self.rematerialize(now);
    }

    /// Borrowing facade over the live beatmap and columns; `None` outside
    /// authoring mode.
    pub fn editor(&mut self) -> Option<Editor<'_>> {
        let now = self.clock.current_time_seconds();
        let session = self.edit.as_mut()?;
        Some(Editor::new(
            session,
            &mut self.beatmap,
            &mut self.columns,
            &mut self.cursor,
            now,
        ))
    }
}

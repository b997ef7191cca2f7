use crate::core::audio::{AudioClock, ManualClock};
use crate::core::input::InputEdge;
use crate::game::beatmap::{Beatmap, NoteMeta};
use crate::game::player::{BeatmapPlayer, PlaybackState};
use crate::game::scores::ScoreTracker;
use log::{debug, info};

pub const DEFAULT_RELEASE_AFTER_SECONDS: f32 = 0.05;

/// Key edges that play every note dead on time. Hits release after
/// `release_after` seconds, holds one row after their end. Sorted by time,
/// releases before presses at the same instant.
pub fn script(beatmap: &Beatmap, release_after: f32) -> Vec<InputEdge> {
    let row = beatmap.time_per_sub_sequence();
    let mut edges = Vec::with_capacity(beatmap.note_count() * 2);
    for column in 0..beatmap.lines() {
        for (subline, meta) in beatmap.notes_in_column(column) {
            let start = beatmap.time_at_subline(subline);
            let release = match meta {
                NoteMeta::Hit => start + release_after.max(0.0),
                NoteMeta::Hold { end } => beatmap.time_at_subline(end) + row,
            };
            edges.push(InputEdge::press(column, start));
            edges.push(InputEdge::release(column, release));
        }
    }
    edges.sort_by(|a, b| {
        a.event_time
            .total_cmp(&b.event_time)
            .then(a.pressed.cmp(&b.pressed))
            .then(a.column.cmp(&b.column))
    });
    edges
}

/// Plays the loaded beatmap from its start point on a manual clock, feeding
/// `edges` as the clock reaches them. Returns the tally once play ends or the
/// clock runs out.
pub fn run(player: &mut BeatmapPlayer<ManualClock>, edges: &[InputEdge], tick_rate: u32) -> ScoreTracker {
    let dt = 1.0 / tick_rate.max(1) as f32;
    let mut tracker = ScoreTracker::new(player.beatmap().note_count());
    let start = player.beatmap().start_point_seconds();
    player.seek(start);
    player.play();

    let length = player.clock().length_seconds();
    let max_ticks = ((length - start + player.settings().end_delay_seconds + 1.0).max(1.0) / dt).ceil() as u64;
    let mut next = edges.partition_point(|e| e.event_time < start);
    let mut ticks = 0_u64;

    while player.state() == PlaybackState::Playing && ticks < max_ticks {
        player.clock_mut().advance(dt);
        let now = player.clock().current_time_seconds();
        while let Some(edge) = edges.get(next)
            && edge.event_time <= now
        {
            player.queue_edge(*edge);
            next += 1;
        }
        player.update(dt);
        for event in player.drain_events() {
            tracker.observe(&event);
        }
        ticks += 1;
    }
    if player.state() == PlaybackState::Playing {
        debug!("Autoplay tick budget ran out after {ticks} ticks.");
        player.stop();
    }
    info!(
        "Autoplay finished '{}': {} points over {} judgements.",
        player.beatmap().map_name(),
        tracker.display_score(),
        tracker.judged()
    );
    tracker
}

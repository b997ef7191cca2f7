use beatline::config;
use beatline::core::audio::ManualClock;
use beatline::game::autoplay;
use beatline::game::judgment::Grade;
use beatline::game::parsing::mapfile::{AudioAsset, BeatmapStore, LoadOutcome};
use beatline::game::player::BeatmapPlayer;
use beatline::game::timing::format_song_time;

const USAGE: &str = "usage: beatline <audio-name> <duration-seconds>";

fn parse_args() -> Result<AudioAsset, Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let name = args.next().ok_or(USAGE)?;
    let duration_seconds: f32 = args.next().ok_or(USAGE)?.parse()?;
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(format!("duration must be positive, got {duration_seconds}").into());
    }
    Ok(AudioAsset { name, duration_seconds })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load();
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let asset = parse_args()?;
    let mut store = BeatmapStore::new(&cfg.data_directory, cfg.beatmap_settings());
    if store.load(&asset) == LoadOutcome::Rebuilt {
        log::warn!("'{}' was rebuilt from scratch.", asset.name);
    }
    let beatmap = store
        .get(&asset.name)
        .cloned()
        .ok_or_else(|| format!("no beatmap for '{}'", asset.name))?;

    let edges = autoplay::script(&beatmap, autoplay::DEFAULT_RELEASE_AFTER_SECONDS);
    let clock = ManualClock::new(asset.duration_seconds);
    let mut player = BeatmapPlayer::new(clock, beatmap, cfg.player_settings());
    let tracker = autoplay::run(&mut player, &edges, cfg.tick_rate);

    let map = player.beatmap();
    println!(
        "{} ({}, {} BPM, {} notes)",
        map.map_name(),
        format_song_time(map.song_duration_seconds()),
        map.bpm(),
        map.note_count()
    );
    for grade in Grade::ALL {
        println!("  {grade:<8} {}", tracker.count(grade));
    }
    println!("  Score    {}", tracker.display_score());
    Ok(())
}

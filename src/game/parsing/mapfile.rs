use crate::game::beatmap::{Beatmap, BeatmapSettings, Metadata, NoteMeta, NoteType};
use crate::game::timing::Division;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAP_EXTENSION: &str = "bmap";

#[derive(Debug)]
pub enum MapFileError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Malformed(String),
}

impl fmt::Display for MapFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Malformed(msg) => write!(f, "malformed beatmap: {msg}"),
        }
    }
}

impl std::error::Error for MapFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Malformed(_) => None,
        }
    }
}

impl From<std::io::Error> for MapFileError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for MapFileError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

// --- On-disk record ---

/// One persisted beatmap. `grid` is `[sequence][sub_sequence][column]` of
/// cell codes; `metadata_json` holds the start-cell index as its own JSON
/// document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatmapRecord {
    pub bpm: u32,
    pub map_name: String,
    pub start_point_seconds: f32,
    pub drop_speed: f32,
    pub division: u8,
    pub lines: usize,
    pub grid: Vec<Vec<Vec<u8>>>,
    pub metadata_json: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct MetaLeaf {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endnote: Option<usize>,
}

// subline -> column -> leaf; serde_json writes the integer keys as strings.
type MetaTree = BTreeMap<usize, BTreeMap<usize, MetaLeaf>>;

impl BeatmapRecord {
    pub fn from_beatmap(beatmap: &Beatmap) -> Result<Self, MapFileError> {
        let lines = beatmap.lines();
        let slots = beatmap.slots();
        let grid = beatmap
            .cells()
            .chunks(slots * lines)
            .map(|sequence| {
                sequence
                    .chunks(lines)
                    .map(|row| row.iter().map(|cell| cell.code()).collect())
                    .collect()
            })
            .collect();

        let tree: MetaTree = beatmap
            .metadata()
            .iter()
            .map(|(&subline, columns)| {
                let leaves = columns
                    .iter()
                    .map(|(&column, meta)| {
                        let leaf = match *meta {
                            NoteMeta::Hit => MetaLeaf { kind: NoteType::Hit.code(), endnote: None },
                            NoteMeta::Hold { end } => MetaLeaf { kind: NoteType::Hold.code(), endnote: Some(end) },
                        };
                        (column, leaf)
                    })
                    .collect();
                (subline, leaves)
            })
            .collect();

        Ok(Self {
            bpm: beatmap.bpm(),
            map_name: beatmap.map_name().to_string(),
            start_point_seconds: beatmap.start_point_seconds(),
            drop_speed: beatmap.drop_speed(),
            division: beatmap.division().index(),
            lines,
            grid,
            metadata_json: serde_json::to_string(&tree)?,
        })
    }

    /// Rebuilds the beatmap for a song of `song_duration_seconds`. Any shape
    /// or code that does not fit is `Malformed`; a grid shorter than the song
    /// needs is extended.
    pub fn into_beatmap(self, song_duration_seconds: f32) -> Result<Beatmap, MapFileError> {
        let division = Division::from_index(self.division)
            .ok_or_else(|| MapFileError::Malformed(format!("unknown division index {}", self.division)))?;
        if self.lines == 0 {
            return Err(MapFileError::Malformed("a beatmap needs at least one line".to_string()));
        }
        let slots = division.slots();

        let sequences = self.grid.len();
        let mut cells = Vec::with_capacity(sequences * slots * self.lines);
        for (seq_idx, sequence) in self.grid.iter().enumerate() {
            if sequence.len() != slots {
                return Err(MapFileError::Malformed(format!(
                    "sequence {seq_idx} has {} rows, expected {slots}",
                    sequence.len()
                )));
            }
            for (sub_idx, row) in sequence.iter().enumerate() {
                if row.len() != self.lines {
                    return Err(MapFileError::Malformed(format!(
                        "row {seq_idx}:{sub_idx} has {} cells, expected {}",
                        row.len(),
                        self.lines
                    )));
                }
                for &code in row {
                    let cell = NoteType::from_code(i64::from(code))
                        .ok_or_else(|| MapFileError::Malformed(format!("unknown cell code {code}")))?;
                    cells.push(cell);
                }
            }
        }

        let tree: MetaTree = serde_json::from_str(&self.metadata_json)?;
        let mut metadata = Metadata::new();
        for (subline, columns) in tree {
            for (column, leaf) in columns {
                let meta = match (NoteType::from_code(i64::from(leaf.kind)), leaf.endnote) {
                    (Some(NoteType::Hit), _) => NoteMeta::Hit,
                    (Some(NoteType::Hold), Some(end)) => NoteMeta::Hold { end },
                    _ => {
                        return Err(MapFileError::Malformed(format!(
                            "bad metadata leaf at subline {subline}, column {column}"
                        )));
                    }
                };
                metadata.entry(subline).or_default().insert(column, meta);
            }
        }

        let settings = BeatmapSettings {
            bpm: self.bpm,
            lines: self.lines,
            division,
            drop_speed: self.drop_speed,
            start_point_seconds: self.start_point_seconds,
        };
        Beatmap::from_parts(self.map_name, song_duration_seconds, &settings, sequences, cells, metadata)
            .map_err(MapFileError::Malformed)
    }
}

// --- Store ---

/// Audio as far as the engine cares: a name to key maps by and a length.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioAsset {
    pub name: String,
    pub duration_seconds: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Created,
    /// The file on disk was unreadable and has been replaced by a fresh map.
    Rebuilt,
}

/// Beatmaps keyed by audio name, persisted as `<dir>/<name>.bmap`.
#[derive(Debug)]
pub struct BeatmapStore {
    dir: PathBuf,
    defaults: BeatmapSettings,
    maps: BTreeMap<String, Beatmap>,
}

impl BeatmapStore {
    pub fn new(dir: impl Into<PathBuf>, defaults: BeatmapSettings) -> Self {
        Self { dir: dir.into(), defaults, maps: BTreeMap::new() }
    }

    #[inline(always)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, map_name: &str) -> PathBuf {
        self.dir.join(format!("{map_name}.{MAP_EXTENSION}"))
    }

    fn read_record(path: &Path) -> Result<BeatmapRecord, MapFileError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Loads the map for `asset`, creating it when missing and replacing it
    /// when the stored copy cannot be read. Never fails; save errors are
    /// logged and the in-memory map is kept.
    pub fn load(&mut self, asset: &AudioAsset) -> LoadOutcome {
        let path = self.path_for(&asset.name);
        let outcome = if path.exists() {
            match Self::read_record(&path).and_then(|r| r.into_beatmap(asset.duration_seconds)) {
                Ok(mut beatmap) => {
                    if beatmap.map_name() != asset.name {
                        debug!("Renaming '{}' to match its audio '{}'.", beatmap.map_name(), asset.name);
                        beatmap.set_map_name(asset.name.as_str());
                    }
                    info!("Loaded beatmap '{}' from {}.", asset.name, path.display());
                    self.maps.insert(asset.name.clone(), beatmap);
                    return LoadOutcome::Loaded;
                }
                Err(e) => {
                    warn!("Discarding unreadable beatmap {}: {e}", path.display());
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("Failed to remove {}: {e}", path.display());
                    }
                    LoadOutcome::Rebuilt
                }
            }
        } else {
            LoadOutcome::Created
        };

        let beatmap = Beatmap::new(asset.name.as_str(), asset.duration_seconds, &self.defaults);
        if let Err(e) = self.save(&beatmap) {
            warn!("Failed to save new beatmap '{}': {e}", asset.name);
        }
        info!("Created beatmap '{}' ({:.1}s).", asset.name, asset.duration_seconds);
        self.maps.insert(asset.name.clone(), beatmap);
        outcome
    }

    pub fn save(&self, beatmap: &Beatmap) -> Result<(), MapFileError> {
        fs::create_dir_all(&self.dir)?;
        let record = BeatmapRecord::from_beatmap(beatmap)?;
        let path = self.path_for(beatmap.map_name());
        fs::write(&path, serde_json::to_string(&record)?)?;
        debug!("Saved '{}' to {}.", beatmap.map_name(), path.display());
        Ok(())
    }

    /// Saves every map; returns the first failure after trying them all.
    pub fn save_all(&self) -> Result<(), MapFileError> {
        let mut first_err = None;
        for beatmap in self.maps.values() {
            if let Err(e) = self.save(beatmap) {
                warn!("Failed to save '{}': {e}", beatmap.map_name());
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    #[inline(always)]
    pub fn get(&self, map_name: &str) -> Option<&Beatmap> {
        self.maps.get(map_name)
    }

    pub fn beatmaps(&self) -> impl Iterator<Item = &Beatmap> {
        self.maps.values()
    }

    /// Replaces the stored copy, typically with a committed edit.
    pub fn insert(&mut self, beatmap: Beatmap) -> Option<Beatmap> {
        self.maps.insert(beatmap.map_name().to_string(), beatmap)
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioAsset, BeatmapRecord, BeatmapStore, LoadOutcome, MapFileError};
    use crate::game::beatmap::{Beatmap, BeatmapSettings, NoteMeta, NoteType};
    use crate::game::timing::Division;
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("beatline-{}-{tag}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn settings_120() -> BeatmapSettings {
        BeatmapSettings { bpm: 120, ..BeatmapSettings::default() }
    }

    fn asset(name: &str) -> AudioAsset {
        AudioAsset { name: name.to_string(), duration_seconds: 8.0 }
    }

    #[test]
    fn record_keeps_notes_and_parameters() {
        let mut map = Beatmap::new("song", 8.0, &settings_120());
        map.add_hit(3, 0);
        map.add_hold(10, 1, 4);
        map.set_start_point_seconds(1.5);
        map.set_division(Division::Eighth);

        let record = BeatmapRecord::from_beatmap(&map).expect("record");
        assert_eq!(record.division, 3);
        assert_eq!(record.grid.len(), 4);
        assert_eq!(record.grid[0].len(), 32);
        assert_eq!(record.grid[0][6], vec![1, 0, 0, 0]);

        let back = record.into_beatmap(8.0).expect("valid record");
        assert_eq!(back.note_type_at(6, 0), NoteType::Hit);
        assert_eq!(back.meta_at(20, 1), Some(NoteMeta::Hold { end: 26 }));
        assert_eq!(back.cells(), map.cells());
        assert_eq!(back.start_point_seconds(), 1.5);
    }

    #[test]
    fn metadata_is_a_nested_json_document() {
        let mut map = Beatmap::new("song", 8.0, &settings_120());
        map.add_hold(10, 1, 4);
        let record = BeatmapRecord::from_beatmap(&map).expect("record");
        assert_eq!(record.metadata_json, r#"{"10":{"1":{"type":2,"endnote":13}}}"#);

        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.contains("\"mapName\":\"song\""), "camelCase keys: {json}");
        assert!(json.contains("\"metadataJson\""));
    }

    #[test]
    fn wrong_shapes_are_malformed() {
        let map = Beatmap::new("song", 8.0, &settings_120());
        let mut record = BeatmapRecord::from_beatmap(&map).expect("record");
        record.grid[1].pop();
        assert!(matches!(record.clone().into_beatmap(8.0), Err(MapFileError::Malformed(_))));

        let mut record = BeatmapRecord::from_beatmap(&map).expect("record");
        record.grid[0][0][2] = 7;
        assert!(matches!(record.into_beatmap(8.0), Err(MapFileError::Malformed(_))));

        let mut record = BeatmapRecord::from_beatmap(&map).expect("record");
        record.division = 9;
        assert!(matches!(record.into_beatmap(8.0), Err(MapFileError::Malformed(_))));

        let mut record = BeatmapRecord::from_beatmap(&map).expect("record");
        record.metadata_json = "{not json".to_string();
        assert!(matches!(record.into_beatmap(8.0), Err(MapFileError::Json(_))));
    }

    #[test]
    fn leaves_outside_the_grid_are_malformed() {
        let map = Beatmap::new("song", 4.0, &settings_120()); // 32 rows
        for json in [
            r#"{"1000":{"0":{"type":1}}}"#,
            r#"{"32":{"0":{"type":1}}}"#,
            r#"{"18446744073709551615":{"0":{"type":1}}}"#,
            r#"{"30":{"0":{"type":2,"endnote":40}}}"#,
            r#"{"5":{"0":{"type":2,"endnote":3}}}"#,
        ] {
            let mut record = BeatmapRecord::from_beatmap(&map).expect("record");
            record.metadata_json = json.to_string();
            assert!(
                matches!(record.into_beatmap(4.0), Err(MapFileError::Malformed(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn far_out_leaf_on_disk_is_rebuilt() {
        let dir = temp_dir("far-leaf");
        let map = Beatmap::new("far", 8.0, &settings_120());
        let mut record = BeatmapRecord::from_beatmap(&map).expect("record");
        record.metadata_json = r#"{"18446744073709551615":{"0":{"type":1}}}"#.to_string();
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(dir.join("far.bmap"), serde_json::to_string(&record).expect("json")).expect("write");

        let mut store = BeatmapStore::new(&dir, settings_120());
        assert_eq!(store.load(&asset("far")), LoadOutcome::Rebuilt);
        assert_eq!(store.get("far").map(Beatmap::note_count), Some(0));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn short_grids_grow_to_the_song() {
        let map = Beatmap::new("song", 4.0, &settings_120());
        let record = BeatmapRecord::from_beatmap(&map).expect("record");
        assert_eq!(record.grid.len(), 2);
        let longer = record.into_beatmap(8.0).expect("valid");
        assert_eq!(longer.allocated_sequences(), 4);
    }

    #[test]
    fn store_creates_then_reloads() {
        let dir = temp_dir("reload");
        let mut store = BeatmapStore::new(&dir, settings_120());
        assert_eq!(store.load(&asset("track")), LoadOutcome::Created);
        assert!(store.path_for("track").exists());

        let mut edited = store.get("track").expect("created").clone();
        edited.add_hit(5, 2);
        store.insert(edited);
        store.save_all().expect("save");

        let mut fresh = BeatmapStore::new(&dir, BeatmapSettings::default());
        assert_eq!(fresh.load(&asset("track")), LoadOutcome::Loaded);
        let loaded = fresh.get("track").expect("loaded");
        assert_eq!(loaded.note_type_at(5, 2), NoteType::Hit);
        assert_eq!(loaded.bpm(), 120, "stored parameters win over defaults");
        assert_eq!(fresh.beatmaps().count(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_files_are_rebuilt() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).expect("dir");
        let store_path = dir.join("broken.bmap");
        std::fs::write(&store_path, "{\"bpm\": \"fast\"").expect("write");

        let mut store = BeatmapStore::new(&dir, settings_120());
        assert_eq!(store.load(&asset("broken")), LoadOutcome::Rebuilt);
        assert_eq!(store.get("broken").map(Beatmap::note_count), Some(0));

        let text = std::fs::read_to_string(&store_path).expect("rewritten");
        let record: BeatmapRecord = serde_json::from_str(&text).expect("valid json now");
        assert_eq!(record.map_name, "broken");
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Recent-files persistence: outside the annotation/rendering engine
//! proper, but colocated with it in the same repository.
//!
//! One tab-separated file at `$XDG_STATE_HOME/opendroidpdf/recents.tsv`,
//! columns `epoch_ms, page, zoom, rotate, scroll_x, scroll_y, layout_w,
//! layout_h, layout_em, path` — `path` is last and stored verbatim
//! (including spaces), at most 10 rows, most-recent-first.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{Error, Result};

const MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RecentEntry {
    pub epoch_ms: u64,
    pub page: i32,
    pub zoom: f64,
    pub rotate: i32,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub layout_w: f64,
    pub layout_h: f64,
    pub layout_em: f64,
    pub path: String,
}

/// Resolves to `$XDG_STATE_HOME/opendroidpdf/recents.tsv`, falling back to
/// `~/.local/state` when `XDG_STATE_HOME` is unset.
pub fn recents_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "opendroidpdf")
        .ok_or_else(|| Error::library("no home directory for recent-files state"))?;
    Ok(dirs.state_dir().unwrap_or_else(|| dirs.data_dir()).join("recents.tsv"))
}

fn parse_line(line: &str) -> Option<RecentEntry> {
    let mut fields = line.splitn(10, '\t');
    let epoch_ms = fields.next()?.parse().ok()?;
    let page = fields.next()?.parse().ok()?;
    let zoom = fields.next()?.parse().ok()?;
    let rotate = fields.next()?.parse().ok()?;
    let scroll_x = fields.next()?.parse().ok()?;
    let scroll_y = fields.next()?.parse().ok()?;
    let layout_w = fields.next()?.parse().ok()?;
    let layout_h = fields.next()?.parse().ok()?;
    let layout_em = fields.next()?.parse().ok()?;
    let path = fields.next()?.to_string();
    Some(RecentEntry {
        epoch_ms,
        page,
        zoom,
        rotate,
        scroll_x,
        scroll_y,
        layout_w,
        layout_h,
        layout_em,
        path,
    })
}

fn format_line(entry: &RecentEntry) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        entry.epoch_ms,
        entry.page,
        entry.zoom,
        entry.rotate,
        entry.scroll_x,
        entry.scroll_y,
        entry.layout_w,
        entry.layout_h,
        entry.layout_em,
        entry.path,
    )
}

/// Reads every row, most-recent-first (that is the file's own order; a
/// malformed line is skipped rather than failing the whole read).
pub fn load(path: &Path) -> Result<Vec<RecentEntry>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::library(e.to_string())),
    };
    Ok(text.lines().filter_map(parse_line).collect())
}

fn save(path: &Path, entries: &[RecentEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::library(e.to_string()))?;
    }
    let mut body = String::new();
    for entry in entries.iter().take(MAX_ENTRIES) {
        body.push_str(&format_line(entry));
        body.push('\n');
    }
    fs::write(path, body).map_err(|e| Error::library(e.to_string()))
}

/// Removes any existing row for `entry.path`, prepends `entry`, truncates
/// to [`MAX_ENTRIES`], and rewrites the file.
pub fn record(path: &Path, entry: RecentEntry) -> Result<Vec<RecentEntry>> {
    let mut entries = load(path)?;
    entries.retain(|e| e.path != entry.path);
    entries.insert(0, entry);
    entries.truncate(MAX_ENTRIES);
    save(path, &entries)?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(epoch_ms: u64, path: &str) -> RecentEntry {
        RecentEntry {
            epoch_ms,
            page: 3,
            zoom: 1.5,
            rotate: 90,
            scroll_x: 0.0,
            scroll_y: 120.0,
            layout_w: 612.0,
            layout_h: 792.0,
            layout_em: 12.0,
            path: path.to_string(),
        }
    }

    #[test]
    fn round_trips_through_tsv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recents.tsv");
        let entry = sample(1000, "/tmp/a file.pdf");
        record(&path, entry.clone()).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, vec![entry]);
    }

    #[test]
    fn most_recent_first_and_capped_at_ten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recents.tsv");
        for i in 0..12u64 {
            record(&path, sample(i, &format!("/tmp/{i}.pdf"))).unwrap();
        }
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), MAX_ENTRIES);
        assert_eq!(loaded[0].path, "/tmp/11.pdf");
        assert_eq!(loaded[9].path, "/tmp/2.pdf");
    }

    #[test]
    fn re_recording_existing_path_moves_it_to_front() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recents.tsv");
        record(&path, sample(1, "/tmp/a.pdf")).unwrap();
        record(&path, sample(2, "/tmp/b.pdf")).unwrap();
        record(&path, sample(3, "/tmp/a.pdf")).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].path, "/tmp/a.pdf");
        assert_eq!(loaded[0].epoch_ms, 3);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.tsv");
        assert!(load(&path).unwrap().is_empty());
    }
}

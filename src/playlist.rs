//! Anchor-based rewriting of the persisted M3U playlist.
//!
//! A channel owns the lines between `#archive-begin-<channel>` and
//! `#archive-end`. Those bodies are regenerated on every merge; every other
//! line of the file is copied through untouched.
//!
//! Lines are raw bytes: playlists in legacy encodings (windows-1251 is common)
//! must round-trip exactly, and only the ASCII markers need to be understood.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::model::{ChannelSchedule, ScheduleEntry};

pub const BEGIN_PREFIX: &str = "#archive-begin";
pub const END_MARKER: &str = "#archive-end";

const PLAYBACK_URL_BASE: &str = "http://hls.peers.tv/playlist/program/";
const PLAYBACK_URL_EXT: &str = ".m3u8";

static BEGIN_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#archive-begin-([^\s-]+)$").expect("static regex"));

/// One playlist line without its terminator.
pub type RawLine = Vec<u8>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnchorError {
    #[error("malformed anchor {0:?}, expected e.g. #archive-begin-rossija")]
    Malformed(String),
}

/// Channel identifier named by a begin marker.
pub fn parse_begin(line: &str) -> Result<&str, AnchorError> {
    BEGIN_LINE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| AnchorError::Malformed(line.to_string()))
}

fn parse_begin_bytes(line: &[u8]) -> Result<&str, AnchorError> {
    match std::str::from_utf8(line) {
        Ok(text) => parse_begin(text),
        Err(_) => Err(AnchorError::Malformed(
            String::from_utf8_lossy(line).into_owned(),
        )),
    }
}

pub fn begin_marker(channel: &str) -> String {
    format!("{BEGIN_PREFIX}-{channel}")
}

/// A playlist line after anchors have been recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Text(RawLine),
    Begin(String),
    End(RawLine),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Outside,
    Owned,
    Duplicate,
}

/// Recognize anchors, drop stale region bodies and append an empty region for
/// every configured channel the document does not mention yet.
pub fn reconcile(existing: &[RawLine], channels: &[String]) -> Vec<Line> {
    let mut out = Vec::with_capacity(existing.len() + channels.len() * 2);
    let mut seen: HashSet<String> = HashSet::new();
    let mut region = Region::Outside;

    for line in existing {
        if line.starts_with(END_MARKER.as_bytes()) {
            match region {
                Region::Owned => out.push(Line::End(line.clone())),
                Region::Duplicate => {}
                Region::Outside => out.push(Line::Text(line.clone())),
            }
            region = Region::Outside;
            continue;
        }
        if region != Region::Outside {
            continue;
        }
        if !line.starts_with(BEGIN_PREFIX.as_bytes()) {
            out.push(Line::Text(line.clone()));
            continue;
        }
        match parse_begin_bytes(line) {
            Ok(channel) if seen.contains(channel) => {
                warn!(channel, "duplicate anchor region dropped");
                region = Region::Duplicate;
            }
            Ok(channel) => {
                seen.insert(channel.to_string());
                out.push(Line::Begin(channel.to_string()));
                region = Region::Owned;
            }
            Err(err) => {
                warn!(%err, "anchor kept as plain text");
                out.push(Line::Text(line.clone()));
            }
        }
    }

    if region == Region::Owned {
        warn!("unterminated anchor region closed at end of playlist");
        out.push(Line::End(END_MARKER.as_bytes().to_vec()));
    }

    for channel in channels {
        if !seen.contains(channel) {
            debug!(%channel, "appending anchor region");
            out.push(Line::Begin(channel.clone()));
            out.push(Line::End(END_MARKER.as_bytes().to_vec()));
        }
    }
    out
}

/// Descriptive `#EXTINF` line followed by the playback URL. Only the first
/// entry of a region carries the group title.
pub fn render_entry(entry: &ScheduleEntry, first: bool) -> [String; 2] {
    let attributes = if first {
        format!(
            "aspect-ratio=4:3 group-title=\"{} (архив)\",",
            entry.channel_name
        )
    } else {
        "aspect-ratio=4:3,".to_string()
    };
    [
        format!(
            "#EXTINF:-1 {attributes}{} {} {} \"{}\"",
            entry.day_label, entry.weekday_label, entry.start_label, entry.title
        ),
        format!("{PLAYBACK_URL_BASE}{}{PLAYBACK_URL_EXT}", entry.program_id),
    ]
}

/// Write the reconciled lines out, filling each region with its channel's
/// entries in schedule order.
pub fn render(lines: &[Line], schedule: &ChannelSchedule) -> Vec<RawLine> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        match line {
            Line::Text(raw) | Line::End(raw) => out.push(raw.clone()),
            Line::Begin(channel) => {
                out.push(begin_marker(channel).into_bytes());
                let entries = schedule.get(channel).map(Vec::as_slice).unwrap_or_default();
                for (i, entry) in entries.iter().enumerate() {
                    out.extend(render_entry(entry, i == 0).map(String::into_bytes));
                }
            }
        }
    }
    out
}

/// Replace every configured channel's region in `existing` with `schedule`.
pub fn merge(
    existing: &[RawLine],
    channels: &[String],
    schedule: &ChannelSchedule,
) -> Vec<RawLine> {
    render(&reconcile(existing, channels), schedule)
}

/// Split on `\n`, dropping a trailing `\r` from each line and the empty piece
/// after a final terminator.
pub fn split_lines(content: &[u8]) -> Vec<RawLine> {
    let mut lines: Vec<RawLine> = content
        .split(|b| *b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l).to_vec())
        .collect();
    if content.is_empty() || content.ends_with(b"\n") {
        lines.pop();
    }
    lines
}

/// Read the playlist as raw lines without terminators.
pub async fn read_document(path: &Path) -> Result<Vec<RawLine>> {
    let content = fs::read(path)
        .await
        .with_context(|| format!("failed to read playlist {}", path.display()))?;
    Ok(split_lines(&content))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the playlist through a sibling temp file so readers never observe a
/// partially written document.
pub async fn write_document(path: &Path, lines: &[RawLine]) -> Result<()> {
    let mut content = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        content.extend_from_slice(line);
        content.push(b'\n');
    }
    let tmp = temp_path(path);
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(err) = fs::rename(&tmp, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            warn!(?cleanup, tmp = %tmp.display(), "failed to remove temp playlist");
        }
        return Err(anyhow::Error::new(err)
            .context(format!("failed to replace playlist {}", path.display())));
    }
    Ok(())
}

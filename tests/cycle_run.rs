mod common;

use archive_playlist::config::{self, Config};
use archive_playlist::cycle::{self, SharedConfig};
use common::RecordingFetcher;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::Mutex;

fn config_for(playlist: &Path, channels: &[&str]) -> Config {
    let mut cfg = Config::default();
    cfg.app.workers = 3;
    cfg.playlist.path = playlist.to_string_lossy().to_string();
    cfg.channels = channels.iter().map(|c| c.to_string()).collect();
    cfg
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cycle_rewrites_owned_regions_only() {
    let td = tempdir().unwrap();
    let playlist = td.path().join("playlist.m3u");
    std::fs::write(
        &playlist,
        "#EXTM3U\n#EXTINF:-1,Live\nhttp://live/1\n#archive-begin-rossija\nstale\n#archive-end\n#EXTINF:-1,Tail\nhttp://live/2\n",
    )
    .unwrap();

    let cfg = config_for(&playlist, &["rossija", "ntv"]);
    let fetcher = RecordingFetcher::new(2)
        .with_days("rossija", &[11, 12])
        .with_days("ntv", &[12]);

    let report = cycle::run_cycle(&cfg, Arc::new(fetcher.clone())).await.unwrap();
    assert_eq!(report.locators, 3);
    assert_eq!(report.entries, 6);

    let text = std::fs::read_to_string(&playlist).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(&lines[..4], &["#EXTM3U", "#EXTINF:-1,Live", "http://live/1", "#archive-begin-rossija"]);
    // newest listing day first, group title only on the first entry
    assert_eq!(
        lines[4],
        "#EXTINF:-1 aspect-ratio=4:3 group-title=\"rossija TV (архив)\",12 пн 06:00 \"/tv/program/rossija/2016-03-12/ #0\""
    );
    assert_eq!(lines[5], "http://hls.peers.tv/playlist/program/rossija-12-0.m3u8");
    assert_eq!(lines[6], "#EXTINF:-1 aspect-ratio=4:3,12 пн 08:00 \"/tv/program/rossija/2016-03-12/ #1\"");
    assert_eq!(lines[8], "#EXTINF:-1 aspect-ratio=4:3,11 пн 06:00 \"/tv/program/rossija/2016-03-11/ #0\"");
    assert_eq!(&lines[12..15], &["#archive-end", "#EXTINF:-1,Tail", "http://live/2"]);
    assert_eq!(lines[15], "#archive-begin-ntv");
    assert_eq!(lines.last(), Some(&"#archive-end"));
    assert!(!text.contains("stale"));

    cycle::run_cycle(&cfg, Arc::new(fetcher)).await.unwrap();
    assert_eq!(std::fs::read_to_string(&playlist).unwrap(), text);
}

#[tokio::test]
async fn unlisted_channel_gets_empty_region() {
    let td = tempdir().unwrap();
    let playlist = td.path().join("playlist.m3u");
    std::fs::write(&playlist, "x\n").unwrap();

    let cfg = config_for(&playlist, &["ghost"]);
    let report = cycle::run_cycle(&cfg, Arc::new(RecordingFetcher::new(1))).await.unwrap();
    assert_eq!(report.locators, 0);
    assert_eq!(
        std::fs::read_to_string(&playlist).unwrap(),
        "x\n#archive-begin-ghost\n#archive-end\n"
    );
}

#[tokio::test]
async fn missing_playlist_aborts_without_creating_it() {
    let td = tempdir().unwrap();
    let playlist = td.path().join("absent.m3u");
    let cfg = config_for(&playlist, &["rossija"]);
    let fetcher = RecordingFetcher::new(1).with_days("rossija", &[12]);

    assert!(cycle::run_cycle(&cfg, Arc::new(fetcher)).await.is_err());
    assert!(!playlist.exists());
}

#[tokio::test]
async fn prepare_does_not_touch_the_file() {
    let td = tempdir().unwrap();
    let playlist = td.path().join("playlist.m3u");
    std::fs::write(&playlist, "x\n").unwrap();
    let cfg = config_for(&playlist, &["rossija"]);
    let fetcher = RecordingFetcher::new(1).with_days("rossija", &[12]);

    let (report, merged) = cycle::prepare(&cfg, Arc::new(fetcher)).await.unwrap();
    assert_eq!(report.entries, 1);
    assert_eq!(merged.len(), 5);
    assert_eq!(std::fs::read_to_string(&playlist).unwrap(), "x\n");
}

#[tokio::test]
async fn failed_reload_keeps_previous_configuration() {
    let td = tempdir().unwrap();
    let path = td.path().join("config.yaml");
    std::fs::write(&path, config::example()).unwrap();
    let shared: SharedConfig = Arc::new(Mutex::new(config::load(Some(&path)).unwrap()));

    std::fs::write(&path, "channels: [rossija, ntv, kultura]\n").unwrap();
    assert!(cycle::reload(&shared, &path).await);
    assert_eq!(shared.lock().await.channels.len(), 3);

    std::fs::write(&path, "channels: [bad-id]\n").unwrap();
    assert!(!cycle::reload(&shared, &path).await);
    assert_eq!(shared.lock().await.channels, vec!["rossija", "ntv", "kultura"]);
}

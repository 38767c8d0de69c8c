//! Comparator runs against a scripted renderer driver
//!
//! The driver stands in for `node` + Playwright: it answers `--version`,
//! reports ready, and serves each screenshot request by copying
//! `<page>.shot.png` next to the page, or fails the request when that file
//! is missing. Every reply is preceded by log noise and a stale reply.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use docproof_common::{PairStatus, VisualSettings};
use docproof_visual::{RendererSession, VisualComparator};
use image::{Rgb, RgbImage};

const DRIVER: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "v20.0.0"
  exit 0
fi
echo 'loading playwright'
echo '{"event":"ready","engine":"chromium"}'
while IFS= read -r line; do
  case "$line" in
    *'"op":"close"'*)
      @ON_CLOSE@
      ;;
    *'"op":"screenshot"'*)
      id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
      page=$(printf '%s\n' "$line" | sed -n 's/.*"url":"file:\/\/\([^"]*\)".*/\1/p')
      out=$(printf '%s\n' "$line" | sed -n 's/.*"path":"\([^"]*\)".*/\1/p')
      echo 'navigating'
      echo '{"id":0,"ok":false,"error":"stale reply"}'
      shot="${page%.html}.shot.png"
      if [ -f "$shot" ]; then
        cp "$shot" "$out"
        echo "{\"id\":$id,\"ok\":true}"
      else
        echo "{\"id\":$id,\"ok\":false,\"error\":\"page crashed\"}"
      fi
      ;;
  esac
done
"#;

/// Driver that exits when asked to close.
const CLOSE_EXITS: &str = r#"touch "$0.closed"; exit 0"#;

/// Driver that ignores the close request and has to be signalled.
const CLOSE_IGNORED: &str = r#"touch "$0.ignored""#;

fn install_driver(dir: &Path, on_close: &str) -> PathBuf {
    let path = dir.join("fake-node");
    std::fs::write(&path, DRIVER.replace("@ON_CLOSE@", on_close)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings(driver: &Path) -> VisualSettings {
    VisualSettings {
        node_binary: driver.to_string_lossy().into_owned(),
        navigation_timeout_ms: 1_000,
        settle_delay_ms: 0,
        ..Default::default()
    }
}

fn write_png(path: &Path, color: [u8; 3]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(8, 8, Rgb(color)).save(path).unwrap();
}

/// Page at `rel` whose mockup is `mockup` and whose rendering is `rendered`.
fn page(
    root: &Path,
    rel: &str,
    mockup: [u8; 3],
    rendered: Option<[u8; 3]>,
) -> (PathBuf, PathBuf) {
    let html = root.join(format!("{}.html", rel));
    let png = root.join(format!("{}.png", rel));
    std::fs::create_dir_all(html.parent().unwrap()).unwrap();
    std::fs::write(&html, "<html><body></body></html>").unwrap();
    write_png(&png, mockup);
    if let Some(color) = rendered {
        write_png(&root.join(format!("{}.shot.png", rel)), color);
    }
    (html, png)
}

#[tokio::test]
async fn same_named_pages_keep_separate_artifacts() {
    let tools = tempfile::tempdir().unwrap();
    let driver = install_driver(tools.path(), CLOSE_EXITS);
    let repo = tempfile::tempdir().unwrap();
    let root = repo.path().canonicalize().unwrap();
    let assets = root.join("logs").join("assets");

    let (a_html, a_png) = page(&root, "a/index", [255, 255, 255], Some([0, 0, 0]));
    let (b_html, b_png) = page(&root, "b/index", [0, 0, 0], Some([0, 0, 0]));

    let mut comparator =
        VisualComparator::start(settings(&driver), assets.clone(), root.clone(), 0.005).await;
    assert!(comparator.is_available(), "{:?}", comparator.capability());
    assert_eq!(comparator.engine(), Some("chromium"));

    let a = comparator.compare(&a_html, &a_png).await;
    assert_eq!(a.status, PairStatus::Mismatch);
    assert_eq!(a.match_percent, Some(0.0));
    assert!(a.details.starts_with("Visual diff exceeds tolerance"));
    assert_eq!(a.screenshot_path, Some(assets.join("a__index_render.png")));
    assert_eq!(a.diff_image_path, Some(assets.join("a__index_diff.png")));

    let b = comparator.compare(&b_html, &b_png).await;
    assert_eq!(b.status, PairStatus::Match);
    assert_eq!(b.match_percent, Some(100.0));
    assert_eq!(b.screenshot_path, Some(assets.join("b__index_render.png")));
    assert!(b.diff_image_path.is_none());

    // The later match must not clobber the earlier mismatch's artifacts.
    assert!(a.diff_image_path.as_ref().unwrap().exists());
    assert!(a.screenshot_path.as_ref().unwrap().exists());
    assert!(b.screenshot_path.as_ref().unwrap().exists());

    comparator.shutdown().await;
    assert!(tools.path().join("fake-node.closed").exists());
}

#[tokio::test]
async fn failed_render_is_error_and_session_survives() {
    let tools = tempfile::tempdir().unwrap();
    let driver = install_driver(tools.path(), CLOSE_EXITS);
    let repo = tempfile::tempdir().unwrap();
    let root = repo.path().canonicalize().unwrap();

    let (broken_html, broken_png) = page(&root, "site/broken", [10, 20, 30], None);
    let (home_html, home_png) = page(&root, "site/home", [10, 20, 30], Some([10, 20, 30]));

    let mut comparator =
        VisualComparator::start(settings(&driver), root.join("assets"), root.clone(), 0.005)
            .await;

    let broken = comparator.compare(&broken_html, &broken_png).await;
    assert_eq!(broken.status, PairStatus::Error);
    assert_eq!(broken.details, "Failed to capture screenshot: page crashed");
    assert!(broken.screenshot_path.is_none());
    assert!(broken.match_percent.is_none());

    let home = comparator.compare(&home_html, &home_png).await;
    assert_eq!(home.status, PairStatus::Match);

    comparator.shutdown().await;
}

#[tokio::test]
async fn stubborn_driver_is_terminated_on_close() {
    let tools = tempfile::tempdir().unwrap();
    let driver = install_driver(tools.path(), CLOSE_IGNORED);

    let session = RendererSession::launch(&settings(&driver)).await.unwrap();
    assert_eq!(session.engine(), "chromium");

    let started = Instant::now();
    session.close().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(tools.path().join("fake-node.ignored").exists());
}

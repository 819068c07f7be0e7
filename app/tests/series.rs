mod common;

use std::collections::HashSet;
use std::path::Path;

use common::{at_ms, canon_shot, touch, MemorySource};
use georaw::{run_series, FileStatus, RunContext, RunError, RunSummary, SeriesOptions};
use series_detection::SeriesMode;
use tempfile::{tempdir, TempDir};
use xmp_sidecar::SidecarStore;

fn keywords(photo_dir: &Path, stem: &str) -> HashSet<String> {
    SidecarStore::new()
        .read(&photo_dir.join(format!("{stem}.xmp")))
        .unwrap()
        .map(|doc| doc.keywords().into_iter().collect())
        .unwrap_or_default()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// One bracketed HDR triplet, one lone shot, one constant-exposure triplet,
/// a Nikon frame and a text file.
fn mixed_shoot() -> (TempDir, MemorySource) {
    let dir = tempdir().unwrap();
    let mut source = MemorySource::default();

    for (stem, ms, exposure) in [
        ("IMG_0010", 0, 0.01),
        ("IMG_0011", 500, 0.04),
        ("IMG_0012", 1000, 0.0025),
        ("IMG_0020", 60_000, 0.01),
        ("IMG_0030", 120_000, 0.01),
        ("IMG_0031", 120_500, 0.01),
        ("IMG_0032", 121_000, 0.01),
    ] {
        let path = touch(dir.path(), &format!("{stem}.CR3"));
        source.insert(canon_shot(&path, at_ms(ms), exposure));
    }

    let nikon = touch(dir.path(), "DSC_0040.NEF");
    let mut shot = canon_shot(&nikon, at_ms(200_000), 0.01);
    shot.make = "NIKON CORPORATION".into();
    source.insert(shot);

    touch(dir.path(), "readme.txt");
    // Merged output without readable metadata: warned about, never reported
    touch(dir.path(), "IMG_0099.JPG");

    (dir, source)
}

fn options(dir: &Path) -> SeriesOptions {
    let mut opts = SeriesOptions::new(dir.to_str().unwrap());
    opts.prefix = "TST".into();
    opts
}

fn status_of(summary: &RunSummary, path: &Path) -> (FileStatus, String) {
    let result = summary.result_for(path).unwrap();
    (result.status, result.message.clone())
}

#[test]
fn test_auto_mode_tags_only_exposure_brackets() {
    let (dir, source) = mixed_shoot();
    let mut opts = options(dir.path());
    opts.start_index = 7;
    opts.extra_tags = vec!["trip".into()];

    let summary = run_series(&opts, &source, &RunContext::new()).unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.skipped, 6);
    assert_eq!(summary.meta_errors, 0);
    assert_eq!(summary.files.len(), 9);

    let p = dir.path();
    assert_eq!(
        status_of(&summary, &p.join("IMG_0010.CR3")),
        (FileStatus::Processed, "hdr_mode [TST_00007]".to_string())
    );
    assert_eq!(status_of(&summary, &p.join("IMG_0020.CR3")).1, "Series too short");
    assert_eq!(status_of(&summary, &p.join("IMG_0031.CR3")).1, "Not detected as HDR");
    assert_eq!(status_of(&summary, &p.join("DSC_0040.NEF")).1, "Not a Canon RAW");
    assert_eq!(status_of(&summary, &p.join("readme.txt")).1, "Not a RAW file");
    assert!(summary.result_for(&p.join("IMG_0099.JPG")).is_none());

    for stem in ["IMG_0010", "IMG_0011", "IMG_0012"] {
        assert_eq!(keywords(p, stem), set(&["hdr_mode", "TST_00007", "trip"]));
    }
    assert!(!p.join("IMG_0020.xmp").exists());
    assert!(!p.join("IMG_0030.xmp").exists());
}

#[test]
fn test_rerun_reports_tags_already_present() {
    let (dir, source) = mixed_shoot();
    let opts = options(dir.path());

    let first = run_series(&opts, &source, &RunContext::new()).unwrap();
    assert_eq!(first.processed, 3);

    let second = run_series(&opts, &source, &RunContext::new()).unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.unchanged, 3);
    assert_eq!(
        status_of(&second, &dir.path().join("IMG_0011.CR3")).1,
        "Series tags already present"
    );
    assert_eq!(keywords(dir.path(), "IMG_0011"), set(&["hdr_mode", "TST_00001"]));
}

#[test]
fn test_forced_modes_number_series_in_order() {
    let (dir, source) = mixed_shoot();
    let mut opts = options(dir.path());
    opts.mode = SeriesMode::Hdr;

    let summary = run_series(&opts, &source, &RunContext::new()).unwrap();
    assert_eq!(summary.processed, 6);
    assert_eq!(keywords(dir.path(), "IMG_0012"), set(&["hdr_mode", "TST_00001"]));
    assert_eq!(keywords(dir.path(), "IMG_0030"), set(&["hdr_mode", "TST_00002"]));

    // Unrelated keywords survive an overwrite
    opts.mode = SeriesMode::Focus;
    opts.overwrite = true;
    opts.start_index = 5;
    let summary = run_series(&opts, &source, &RunContext::new()).unwrap();
    assert_eq!(summary.processed, 6);
    assert_eq!(
        keywords(dir.path(), "IMG_0030"),
        set(&["hdr_mode", "TST_00002", "focus_br", "TST_00006"])
    );
}

#[test]
fn test_hint_anchors_triplet_as_hdr() {
    let dir = tempdir().unwrap();
    let mut source = MemorySource::default();

    // Bracket frames start when the previous shutter closes
    for (stem, ms, exposure) in [
        ("IMG_0050", 0, 1.0),
        ("IMG_0051", 1000, 0.1),
        ("IMG_0052", 1100, 0.01),
        ("IMG_0060", 30_000, 0.01),
        ("IMG_0061", 30_500, 0.01),
        ("IMG_0062", 31_000, 0.01),
    ] {
        let path = touch(dir.path(), &format!("{stem}.CR3"));
        source.insert(canon_shot(&path, at_ms(ms), exposure));
    }
    let hint = touch(dir.path(), "IMG_0053.HIF");
    let mut merged = canon_shot(&hint, at_ms(0), 1.0);
    merged.hdr_hint = true;
    source.insert(merged);

    let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&calls);
    let ctx = RunContext::new().with_progress(move |done, total| sink.lock().unwrap().push((done, total)));

    let mut opts = options(dir.path());
    opts.mode = SeriesMode::Focus;
    let summary = run_series(&opts, &source, &ctx).unwrap();

    assert_eq!(summary.processed, 6);
    assert!(summary.result_for(&hint).is_none());
    assert_eq!(keywords(dir.path(), "IMG_0051"), set(&["hdr_mode", "TST_00001"]));
    assert_eq!(keywords(dir.path(), "IMG_0061"), set(&["focus_br", "TST_00002"]));
    assert!(!dir.path().join("IMG_0053.xmp").exists());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.first(), Some(&(0, 6)));
    assert_eq!(calls.iter().max(), Some(&(6, 6)));
}

#[test]
fn test_run_level_errors() {
    let dir = tempdir().unwrap();
    let mut source = MemorySource::default();

    assert!(matches!(
        run_series(&options(dir.path()), &source, &RunContext::new()),
        Err(RunError::NoFiles)
    ));

    let nikon = touch(dir.path(), "DSC_0001.NEF");
    let mut shot = canon_shot(&nikon, at_ms(0), 0.01);
    shot.make = "NIKON CORPORATION".into();
    source.insert(shot);
    let err = run_series(&options(dir.path()), &source, &RunContext::new()).unwrap_err();
    assert_eq!(err.to_string(), "no Canon RAW files to process");

    let mut opts = options(dir.path());
    opts.make_family = "nikon".into();
    let summary = run_series(&opts, &source, &RunContext::new()).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(status_of(&summary, &nikon).1, "Series too short");

    let mut opts = options(dir.path());
    opts.prefix = "AB".into();
    assert!(matches!(
        run_series(&opts, &source, &RunContext::new()),
        Err(RunError::InvalidOptions(_))
    ));

    let ctx = RunContext::new();
    ctx.cancel();
    assert!(matches!(
        run_series(&options(dir.path()), &source, &ctx),
        Err(RunError::Cancelled)
    ));
}

#[test]
fn test_random_prefix_is_used_when_none_given() {
    let (dir, source) = mixed_shoot();
    let opts = SeriesOptions::new(dir.path().to_str().unwrap());

    let summary = run_series(&opts, &source, &RunContext::new()).unwrap();
    assert_eq!(summary.processed, 3);

    let tags = keywords(dir.path(), "IMG_0010");
    let id = tags.iter().find(|t| t.ends_with("_00001")).unwrap();
    assert_eq!(id.len(), "ABCDEF_00001".len());
}

#[test]
fn test_cancel_stops_tagging_inside_a_group() {
    let dir = tempdir().unwrap();
    let mut source = MemorySource::default();

    // One long focus stack, a frame every 500 ms
    let count = 300;
    for i in 0..count {
        let path = touch(dir.path(), &format!("IMG_{:04}.CR3", i + 1));
        source.insert(canon_shot(&path, at_ms(i * 500), 0.01));
    }

    let ctx = RunContext::new();
    let flag = ctx.cancel_flag();
    let ctx = ctx.with_progress(move |done, _| {
        if done >= 1 {
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let mut opts = options(dir.path());
    opts.mode = SeriesMode::Focus;
    let result = run_series(&opts, &source, &ctx);
    assert!(matches!(result, Err(RunError::Cancelled)));

    let written = (1..=count)
        .filter(|i| dir.path().join(format!("IMG_{i:04}.xmp")).exists())
        .count();
    assert!(written >= 1);
    assert!(written < count as usize, "all {written} sidecars written after cancel");
}

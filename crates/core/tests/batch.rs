use image::{DynamicImage, ImageFormat};
use metafuse_core::config::AppConfig;
use metafuse_core::convert::HeicDecoder;
use metafuse_core::models::OutcomeStatus;
use metafuse_core::pipeline::run_batch;
use metafuse_core::report::render_text;
use std::fs;
use std::path::Path;

/// Stands in for libheif on ".heic" fixtures that hold PNG data.
struct PngAsHeic;

impl HeicDecoder for PngAsHeic {
    fn decode(&self, path: &Path) -> anyhow::Result<DynamicImage> {
        Ok(image::load_from_memory_with_format(
            &fs::read(path)?,
            ImageFormat::Png,
        )?)
    }
}

struct ExplodingDecoder;

impl HeicDecoder for ExplodingDecoder {
    fn decode(&self, _path: &Path) -> anyhow::Result<DynamicImage> {
        panic!("decoder blew up")
    }
}

fn write_jpeg(path: &Path) {
    image::RgbImage::from_pixel(6, 4, image::Rgb([90, 120, 150]))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

fn write_png(path: &Path) {
    image::RgbImage::from_pixel(5, 5, image::Rgb([1, 2, 3]))
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

fn png_text(path: &Path) -> Vec<(String, String)> {
    let decoder = png::Decoder::new(fs::File::open(path).unwrap());
    let reader = decoder.read_info().unwrap();
    reader
        .info()
        .uncompressed_latin1_text
        .iter()
        .map(|c| (c.keyword.clone(), c.text.clone()))
        .collect()
}

#[test]
fn exact_name_match_fuses_and_archives_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("IMG_0001.json"), r#"{"caption": "lake"}"#).unwrap();
    write_jpeg(&root.join("IMG_0001.jpg"));

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Fused);
    assert!(!root.join("IMG_0001.json").exists());
    assert!(root.join("json_files").join("IMG_0001.json").exists());
    let fused = image::open(root.join("IMG_0001.jpg")).unwrap();
    assert_eq!((fused.width(), fused.height()), (6, 4));
    assert!(render_text(&report).contains("All JSON files were successfully processed."));
}

#[test]
fn drifted_heic_is_converted_before_fusion() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("vacation-edit(1).json"), r#"{"title": "beach"}"#).unwrap();
    write_png(&root.join("vacation_edit1.heic"));
    write_png(&root.join("unrelated.png"));

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::Fused, "{}", outcome.detail);
    let jpeg = root.join("vacation_edit1.jpeg");
    assert_eq!(outcome.asset.as_deref(), Some(jpeg.display().to_string().as_str()));
    assert!(jpeg.exists());
    assert!(!root.join("vacation_edit1.heic").exists());
    assert!(root.join("heic_files").join("vacation_edit1.heic").exists());
    assert!(root.join("json_files").join("vacation-edit(1).json").exists());
    assert!(png_text(&root.join("unrelated.png")).is_empty());
}

#[test]
fn unmatched_sidecar_stays_and_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("random9999.json"), r#"{"caption": "?"}"#).unwrap();
    write_jpeg(&root.join("IMG_0001.jpg"));
    write_png(&root.join("vacation_edit1.png"));

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    assert_eq!(report.outcomes[0].status, OutcomeStatus::NoMatch);
    assert!(root.join("random9999.json").exists());
    assert_eq!(report.summary().failed(), 1);
    let text = render_text(&report);
    assert!(text.contains(
        "- random9999.json: Corresponding media file not found (no match above similarity threshold)."
    ));
    assert!(text.ends_with("Files not processed: 1"));
}

#[test]
fn corrupt_asset_fails_fusion_with_cause() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("IMG_0002.json"), r#"{"caption": "x"}"#).unwrap();
    fs::write(root.join("IMG_0002.jpg"), [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).unwrap();

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, OutcomeStatus::FusionFailed);
    assert!(outcome.detail.contains("IMG_0002.jpg"), "{}", outcome.detail);
    assert!(root.join("IMG_0002.json").exists());
    assert!(!root.join("json_files").join("IMG_0002.json").exists());
}

#[test]
fn png_assets_receive_text_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(
        root.join("Screenshot 2024.json"),
        r#"{"caption": "lake", "tags": ["a", "b"]}"#,
    )
    .unwrap();
    write_png(&root.join("Screenshot_2024.png"));

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Fused);

    let text = png_text(&root.join("Screenshot_2024.png"));
    assert!(text.contains(&("caption".to_string(), r#""lake""#.to_string())));
    assert!(text.contains(&("tags".to_string(), r#"["a", "b"]"#.to_string())));
}

#[test]
fn one_failure_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a_broken.json"), "{ not json").unwrap();
    fs::write(root.join("b_photo.json"), r#"{"caption": "fine"}"#).unwrap();
    write_jpeg(&root.join("b_photo.jpg"));
    fs::write(root.join("c_raw.json"), r#"{"caption": "heic"}"#).unwrap();
    fs::write(root.join("c_raw.heic"), b"\0\0\0\x18ftypheic\0\0\0\0mif1heic").unwrap();

    let report = run_batch(root, &AppConfig::default(), &ExplodingDecoder).unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            OutcomeStatus::UnexpectedError,
            OutcomeStatus::Fused,
            OutcomeStatus::UnexpectedError,
        ]
    );
    assert!(report.outcomes[2].detail.contains("decoder blew up"));
    assert!(root.join("c_raw.heic").exists());
}

#[test]
fn blocked_heic_archive_fails_conversion_and_keeps_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("IMG_0042.json"), r#"{"caption": "dock"}"#).unwrap();
    write_png(&root.join("IMG_0042.heic"));
    fs::write(root.join("heic_files"), b"in the way").unwrap();

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    assert_eq!(report.outcomes[0].status, OutcomeStatus::ConversionFailed);
    assert!(report.outcomes[0].detail.contains("failed to archive"));
    assert!(root.join("IMG_0042.json").exists());
    assert!(root.join("IMG_0042.heic").exists());
    assert!(root.join("IMG_0042.jpeg").exists());
    assert!(!root.join("json_files").join("IMG_0042.json").exists());
}

fn seed_burst(root: &Path) {
    fs::write(root.join("burst_1.json"), r#"{"n": 1}"#).unwrap();
    fs::write(root.join("burst_2.json"), r#"{"n": 2}"#).unwrap();
    write_jpeg(&root.join("burst.jpg"));
}

#[test]
fn shared_assets_follow_configuration() {
    let shared = tempfile::tempdir().unwrap();
    seed_burst(shared.path());
    let report = run_batch(shared.path(), &AppConfig::default(), &PngAsHeic).unwrap();
    assert_eq!(report.summary().fused, 2);

    let exclusive = tempfile::tempdir().unwrap();
    let root = exclusive.path();
    seed_burst(root);
    let mut config = AppConfig::default();
    config.matching.allow_shared_assets = false;

    let report = run_batch(root, &config, &PngAsHeic).unwrap();
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Fused);
    assert_eq!(report.outcomes[1].status, OutcomeStatus::NoMatch);
    assert!(root.join("burst_2.json").exists());
}

#[test]
fn rerun_skips_archived_sidecars_and_converts_stragglers() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("IMG_0001.json"), r#"{"caption": "lake"}"#).unwrap();
    write_jpeg(&root.join("IMG_0001.jpg"));
    run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    // An interrupted earlier run left an unconverted original behind.
    fs::write(root.join("IMG_0005.json"), r#"{"caption": "late"}"#).unwrap();
    write_png(&root.join("IMG_0005.heic"));

    let report = run_batch(root, &AppConfig::default(), &PngAsHeic).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].sidecar_name, "IMG_0005.json");
    assert_eq!(report.outcomes[0].status, OutcomeStatus::Fused);
    assert!(root.join("IMG_0005.jpeg").exists());
    assert!(root.join("heic_files").join("IMG_0005.heic").exists());
}

#[test]
fn unlistable_directory_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(run_batch(&missing, &AppConfig::default(), &PngAsHeic).is_err());
}

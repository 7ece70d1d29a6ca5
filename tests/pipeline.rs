use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{Rgb, RgbImage};
use image_translator_rust::error::{ServiceError, ServiceKind};
use image_translator_rust::ocr::{
    BoundingBox, Compositor, LayoutPlanner, OcrDetection, OcrFuture, OcrService, OverlayFonts,
    TextFragment,
};
use image_translator_rust::translator::TranslateFuture;
use image_translator_rust::{BatchOptions, Error, Pipeline, Translator, run_batch};
use tempfile::tempdir;

const PNG_MAGIC: &[u8] = b"\x89PNG";

/// Reports the same fragments for every PNG and rejects anything else.
struct FixedOcr {
    fragments: Vec<TextFragment>,
}

impl OcrService for FixedOcr {
    fn detect<'a>(&'a self, image_bytes: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(async move {
            if !image_bytes.starts_with(PNG_MAGIC) {
                return Err(ServiceError::InvalidImage("not a png".to_string()));
            }
            Ok(OcrDetection {
                full_text: None,
                fragments: self.fragments.clone(),
            })
        })
    }
}

/// Panics on anything that is not a PNG.
struct PanickingOcr;

impl OcrService for PanickingOcr {
    fn detect<'a>(&'a self, image_bytes: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(async move {
            if !image_bytes.starts_with(PNG_MAGIC) {
                panic!("collaborator bug");
            }
            Ok(OcrDetection::default())
        })
    }
}

struct AnyImageOcr;

impl OcrService for AnyImageOcr {
    fn detect<'a>(&'a self, _image_bytes: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(async move { Ok(OcrDetection::default()) })
    }
}

struct StalledOcr;

impl OcrService for StalledOcr {
    fn detect<'a>(&'a self, _image_bytes: &'a [u8]) -> OcrFuture<'a> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(OcrDetection::default())
        })
    }
}

#[derive(Default)]
struct UpperTranslator {
    calls: AtomicUsize,
}

impl Translator for UpperTranslator {
    fn translate<'a>(&'a self, text: &'a str, _target_lang: &'a str) -> TranslateFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(text.to_uppercase()) })
    }
}

struct DownTranslator;

impl Translator for DownTranslator {
    fn translate<'a>(&'a self, _text: &'a str, _target_lang: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            Err(ServiceError::Unavailable {
                service: ServiceKind::Translation,
                message: "connection refused".to_string(),
            })
        })
    }
}

fn pipeline(fragments: Vec<TextFragment>, translator: Arc<dyn Translator>) -> Arc<Pipeline> {
    let compositor = Compositor::new(LayoutPlanner::default(), Arc::new(OverlayFonts::builtin()));
    Arc::new(Pipeline::new(
        Arc::new(FixedOcr { fragments }),
        translator,
        compositor,
        "en",
    ))
}

fn pipeline_with_ocr(ocr: Arc<dyn OcrService>) -> Arc<Pipeline> {
    let compositor = Compositor::new(LayoutPlanner::default(), Arc::new(OverlayFonts::builtin()));
    Arc::new(Pipeline::new(
        ocr,
        Arc::new(UpperTranslator::default()),
        compositor,
        "en",
    ))
}

fn write_png(path: &Path, width: u32, height: u32) -> RgbImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 200])
    });
    image.save(path).expect("write png");
    image
}

fn options() -> BatchOptions {
    BatchOptions {
        jobs: 2,
        file_timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn images_are_written_with_translated_suffix() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_png(&input.path().join("menu.png"), 120, 60);
    write_png(&input.path().join("Sign.PNG"), 120, 60);
    std::fs::write(input.path().join("notes.txt"), "leave me").expect("write txt");

    let fragments = vec![
        TextFragment::new(BoundingBox::new(10, 10, 40, 40), "Guten"),
        TextFragment::new(BoundingBox::new(45, 12, 100, 40), "Tag"),
    ];
    let translator = Arc::new(UpperTranslator::default());
    let report = run_batch(
        pipeline(fragments, translator.clone()),
        input.path(),
        output.path(),
        &options(),
    )
    .await
    .expect("batch");

    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.succeeded.len(), 2);
    let mut written: Vec<_> = std::fs::read_dir(output.path())
        .expect("read output")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    written.sort();
    assert_eq!(written, vec!["Sign_translated.PNG", "menu_translated.png"]);

    // The two fragments merge into one phrase per image.
    assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    let file = &report.succeeded[0];
    assert_eq!(file.fragments, 2);
    assert_eq!(file.phrases, 1);
    assert_eq!(file.stats.drawn, 1);

    let translated = image::open(output.path().join("menu_translated.png"))
        .expect("open output")
        .to_rgb8();
    assert_eq!(translated.dimensions(), (120, 60));
    assert_eq!(translated.get_pixel(12, 25), &Rgb([169, 169, 169]));
    assert_eq!(
        std::fs::read_to_string(input.path().join("notes.txt")).expect("read txt"),
        "leave me"
    );
}

#[tokio::test]
async fn images_without_text_are_copied_pixel_for_pixel() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    let source = write_png(&input.path().join("blank.png"), 32, 24);

    let translator = Arc::new(UpperTranslator::default());
    let report = run_batch(
        pipeline(Vec::new(), translator.clone()),
        input.path(),
        output.path(),
        &options(),
    )
    .await
    .expect("batch");

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    let copied = image::open(output.path().join("blank_translated.png"))
        .expect("open output")
        .to_rgb8();
    assert_eq!(copied, source);
}

#[tokio::test]
async fn a_failing_image_does_not_stop_the_batch() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_png(&input.path().join("good.png"), 40, 40);
    std::fs::write(input.path().join("broken.png"), b"not really an image").expect("write");

    let report = run_batch(
        pipeline(Vec::new(), Arc::new(UpperTranslator::default())),
        input.path(),
        output.path(),
        &options(),
    )
    .await
    .expect("batch");

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].input.ends_with("broken.png"));
    assert!(report.failed[0].error.contains("ocr rejected the image"));
    assert!(output.path().join("good_translated.png").exists());
    assert!(!output.path().join("broken_translated.png").exists());
}

#[tokio::test]
async fn translation_outage_fails_the_image_without_output() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_png(&input.path().join("photo.png"), 60, 30);

    let fragments = vec![TextFragment::new(BoundingBox::new(5, 5, 50, 25), "Hallo")];
    let report = run_batch(
        pipeline(fragments, Arc::new(DownTranslator)),
        input.path(),
        output.path(),
        &options(),
    )
    .await
    .expect("batch");

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("translation service unavailable"));
    assert!(!output.path().join("photo_translated.png").exists());
}

#[tokio::test]
async fn missing_input_directory_is_reported() {
    let root = tempdir().expect("root");
    let missing = root.path().join("nope");
    let err = run_batch(
        pipeline(Vec::new(), Arc::new(UpperTranslator::default())),
        &missing,
        &root.path().join("out"),
        &options(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InputDirNotFound(ref path) if path == &missing));
    assert!(!root.path().join("out").exists());
}

#[tokio::test]
async fn a_panicking_collaborator_fails_only_its_image() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    for name in ["a.png", "b.png", "d.png"] {
        write_png(&input.path().join(name), 16, 16);
    }
    std::fs::write(input.path().join("c.png"), b"garbage").expect("write");

    let report = run_batch(
        pipeline_with_ocr(Arc::new(PanickingOcr)),
        input.path(),
        output.path(),
        &options(),
    )
    .await
    .expect("batch");

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].input.ends_with("c.png"));
    assert!(report.failed[0].error.contains("collaborator bug"));
    assert!(!output.path().join("c_translated.png").exists());
    assert!(output.path().join("d_translated.png").exists());
}

#[tokio::test]
async fn a_timed_out_image_leaves_no_output() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_png(&input.path().join("slow.png"), 16, 16);

    let options = BatchOptions {
        jobs: 1,
        file_timeout: Duration::from_millis(50),
    };
    let report = run_batch(
        pipeline_with_ocr(Arc::new(StalledOcr)),
        input.path(),
        output.path(),
        &options,
    )
    .await
    .expect("batch");

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("timed out"));
    assert!(!output.path().join("slow_translated.png").exists());
}

#[tokio::test]
async fn missing_output_directories_are_created() {
    let input = tempdir().expect("input dir");
    let root = tempdir().expect("root");
    write_png(&input.path().join("menu.png"), 16, 16);
    let nested = root.path().join("out").join("nested");

    let report = run_batch(
        pipeline(Vec::new(), Arc::new(UpperTranslator::default())),
        input.path(),
        &nested,
        &options(),
    )
    .await
    .expect("batch");

    assert_eq!(report.succeeded.len(), 1);
    assert!(nested.join("menu_translated.png").is_file());
}

#[tokio::test]
async fn jpeg_inputs_are_written_as_jpeg() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    let source = RgbImage::from_pixel(48, 32, Rgb([40, 90, 160]));
    source.save(input.path().join("photo.jpg")).expect("write jpeg");

    let report = run_batch(
        pipeline_with_ocr(Arc::new(AnyImageOcr)),
        input.path(),
        output.path(),
        &options(),
    )
    .await
    .expect("batch");
    assert!(report.failed.is_empty(), "{:?}", report.failed);

    let written = output.path().join("photo_translated.jpg");
    let bytes = std::fs::read(&written).expect("read output");
    assert_eq!(
        image::guess_format(&bytes).expect("format"),
        image::ImageFormat::Jpeg
    );
    let decoded = image::load_from_memory(&bytes).expect("decode").to_rgb8();
    assert_eq!(decoded.dimensions(), (48, 32));
    let pixel = decoded.get_pixel(24, 16);
    assert!(pixel.0.iter().zip([40u8, 90, 160]).all(|(a, b)| a.abs_diff(b) <= 4));
}

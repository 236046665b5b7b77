use std::fs;

use glam::UVec2;
use hog_core::{ImageBuffer, PixelFormat};
use parity_lab::{image_source::list_images, DirectorySource, ImageSource};

#[test]
fn directory_corpus_is_sorted_and_skips_gitignore() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    let pixel = |x: u32, y: u32| image::Rgb([(x * 8) as u8, (y * 8) as u8, 128]);
    image::RgbImage::from_fn(16, 8, pixel)
        .save(dir.path().join("b.png"))
        .unwrap();
    image::RgbImage::from_fn(32, 16, pixel)
        .save(dir.path().join("nested").join("a.png"))
        .unwrap();
    fs::write(dir.path().join(".gitignore"), "*\n").unwrap();

    let paths = list_images(dir.path()).unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.windows(2).all(|pair| pair[0] < pair[1]));

    let mut source = DirectorySource::open(dir.path()).unwrap();
    assert_eq!(source.len(), 2);
    let mut rgb = ImageBuffer::new(UVec2::new(16, 8), PixelFormat::Rgb32F);
    let index = source
        .paths()
        .iter()
        .position(|path| path.ends_with("b.png"))
        .unwrap();
    source.load_into(index, &mut rgb).unwrap();
    assert_eq!(rgb.pixel(1, 2), &[16.0 / 256.0, 8.0 / 256.0, 128.0 / 256.0]);

    // the nested image is 32x16 and gets resized down
    let mut gray = ImageBuffer::new(UVec2::new(16, 8), PixelFormat::Gray32F);
    source.load_into(1 - index, &mut gray).unwrap();
    assert!(gray.as_slice().iter().all(|v| (0.0..1.0).contains(v)));
}

#[test]
fn missing_corpus_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(DirectorySource::open(&dir.path().join("absent")).is_err());
}

#[test]
fn undecodable_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
    let mut source = DirectorySource::open(dir.path()).unwrap();
    let mut dst = ImageBuffer::new(UVec2::new(4, 4), PixelFormat::Rgb32F);
    let err = source.load_into(0, &mut dst).unwrap_err();
    assert!(format!("{err:#}").contains("broken.png"));
}

//! Integration tests for directory scanning.

use std::fs;
use std::path::Path;

use reel_core::{ImageBuffer, ImageInfo, PixelType, Size};
use reel_io::{ErrorKind, FileSequence, Registry, ScanEntry, scan_dir, scan_dir_with};

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"").unwrap();
}

#[test]
fn scan_groups_sequences() {
    let dir = tempfile::tempdir().unwrap();
    for frame in 1..=10 {
        touch(dir.path(), &format!("render.{frame:04}.exr"));
    }
    for frame in [1, 2, 3, 7] {
        touch(dir.path(), &format!("comp_v2.{frame}.dpx"));
    }
    touch(dir.path(), "notes.txt");
    touch(dir.path(), "slate.0001.png");
    fs::create_dir(dir.path().join("sub.0001")).unwrap();

    let entries = scan_dir(dir.path()).unwrap();
    let names: Vec<String> = entries.iter().map(ScanEntry::name).collect();
    assert_eq!(
        names,
        vec![
            "comp_v2.1-3,7.dpx",
            "notes.txt",
            "render.0001-0010.exr",
            "slate.0001.png",
        ]
    );

    let render = entries[2].as_sequence().unwrap();
    assert_eq!(render.frame_count(), 10);
    assert_eq!(render.pad(), 4);
    assert_eq!(render.pattern(), "render.####.exr");
    assert_eq!(render.path_for(7), dir.path().join("render.0007.exr"));
    assert!(entries[3].as_sequence().is_none());
}

#[test]
fn scan_keeps_pad_groups_apart() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.001.tga", "a.002.tga", "a.0001.tga", "a.0002.tga"] {
        touch(dir.path(), name);
    }
    let names: Vec<String> = scan_dir(dir.path())
        .unwrap()
        .iter()
        .map(ScanEntry::name)
        .collect();
    assert_eq!(names, vec!["a.0001-0002.tga", "a.001-002.tga"]);
}

#[test]
fn scan_with_registry_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "broken.0001.dpx");
    touch(dir.path(), "broken.0002.dpx");
    touch(dir.path(), "readme.md");
    let img = ImageBuffer::new(ImageInfo::new(Size::new(4, 2), PixelType::RGB_U16));
    Registry::with_builtin()
        .write(&dir.path().join("good.dpx"), &img)
        .unwrap();

    let results = scan_dir_with(dir.path(), &Registry::with_builtin()).unwrap();
    assert_eq!(results.len(), 3);

    let (broken, info) = &results[0];
    assert_eq!(broken.name(), "broken.0001-0002.dpx");
    assert_eq!(info.as_ref().unwrap_err().kind(), ErrorKind::CorruptData);

    let (good, info) = &results[1];
    assert_eq!(good.name(), "good.dpx");
    let info = info.as_ref().unwrap();
    assert_eq!(info.video[0].size, Size::new(4, 2));

    let (readme, info) = &results[2];
    assert_eq!(readme.name(), "readme.md");
    assert_eq!(info.as_ref().unwrap_err().kind(), ErrorKind::UnsupportedFormat);
}

#[test]
fn detect_from_missing_frame() {
    let dir = tempfile::tempdir().unwrap();
    for frame in 10..=12 {
        touch(dir.path(), &format!("plate_{frame:03}.sgi"));
    }
    let seq = FileSequence::detect(&dir.path().join("plate_001.sgi"))
        .unwrap()
        .unwrap();
    assert_eq!(seq.to_string(), "plate_010-012.sgi");
    assert_eq!(seq.first_path(), Some(dir.path().join("plate_010.sgi")));
}

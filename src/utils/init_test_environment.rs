use std::path::PathBuf;

use tempfile::TempDir;

use crate::{mkfs::MkfsOptions, FlatFs};

pub const TEST_IMAGE_NAME: &str = "test.img";

/// a formatted image file in a fresh temporary directory
///
/// the directory, and the image with it, is removed when the returned
/// [TempDir] is dropped
pub fn init_test_environment(block_count: u32) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let image_path = dir.path().join(TEST_IMAGE_NAME);
    FlatFs::initialize_with(&image_path, &MkfsOptions::new(block_count))
        .expect("Failed to format test image");
    (dir, image_path)
}

use std::path::Path;

use image::RgbImage;

use crate::error::{DrawError, DrawResult};

/// Create `path` and any missing parents.
///
/// An existing directory is not an error; any other IO failure is.
pub fn ensure_dir(path: impl AsRef<Path>) -> DrawResult<()> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).map_err(|source| DrawError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode `image` as PNG at `path`, overwriting any existing file.
pub fn save_png(image: &RgbImage, path: impl AsRef<Path>) -> DrawResult<()> {
    let path = path.as_ref();
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| DrawError::Save {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), "wrote overlay");
    Ok(())
}

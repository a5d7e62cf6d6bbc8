//! Directory-backed store of reference images, keyed by name.

use crate::errors::AutomationError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Named reference images on disk. A key without an extension resolves to
/// `<key>.png`, matching how cropped templates are saved.
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        let mut file = name.to_string();
        if Path::new(name).extension().is_none() {
            file.push_str(".png");
        }
        self.root.join(file)
    }

    #[instrument(skip(self))]
    pub fn load(&self, name: &str) -> Result<DynamicImage, AutomationError> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(AutomationError::TemplateNotFound(name.to_string()));
        }
        image::open(&path).map_err(|e| {
            AutomationError::ImageProcessing(format!(
                "failed to decode template {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn appends_png_when_key_has_no_extension() {
        let store = TemplateStore::new("/tmp/templates");
        assert_eq!(
            store.path_for("login_button"),
            PathBuf::from("/tmp/templates/login_button.png")
        );
        assert_eq!(
            store.path_for("settings.jpg"),
            PathBuf::from("/tmp/templates/settings.jpg")
        );
    }

    #[test]
    fn missing_template_is_a_distinct_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TemplateStore::new(dir.path());
        match store.load("nope") {
            Err(AutomationError::TemplateNotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("expected TemplateNotFound, got {other:?}"),
        }
    }

    #[test]
    fn loads_saved_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let img = GrayImage::from_pixel(8, 8, Luma([200u8]));
        img.save(dir.path().join("button.png")).expect("save");

        let store = TemplateStore::new(dir.path());
        let loaded = store.load("button").expect("load");
        assert_eq!(loaded.to_luma8().dimensions(), (8, 8));
    }
}

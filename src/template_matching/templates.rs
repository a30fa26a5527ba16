//! Reference images, loaded once from the images directory and kept as
//! grayscale.

use super::types::{MatchError, NormRect};
use image::GrayImage;
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub image: GrayImage,
    /// Search rectangle carried in the file name, if any.
    pub default_region: Option<NormRect>,
}

impl Template {
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        let name = name.into();
        let default_region = NormRect::parse_from_name(&name);
        Self {
            name,
            image,
            default_region,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Default)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateStore {
    /// A store backed by `dir`; names resolve to files inside it.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
            cache: RwLock::default(),
        }
    }

    /// A store with no directory; only inserted templates resolve.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, image: GrayImage) -> Arc<Template> {
        let template = Arc::new(Template::new(name, image));
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(template.name.clone(), Arc::clone(&template));
        template
    }

    /// Looks up `name` in the cache, loading it from disk on first use.
    /// A name without an extension also tries `<name>.png`.
    pub fn get(&self, name: &str) -> Result<Arc<Template>, MatchError> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(Arc::clone(hit));
        }

        let path = self.resolve(name).ok_or_else(|| MatchError::TemplateNotFound {
            name: name.to_string(),
        })?;
        let image = image::open(&path)
            .map_err(|source| MatchError::TemplateDecode {
                name: name.to_string(),
                source,
            })?
            .to_luma8();
        debug!(
            "📷 Loaded template '{}' {}x{} from {}",
            name,
            image.width(),
            image.height(),
            path.display()
        );

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();
        let template = Arc::new(Template {
            default_region: NormRect::parse_from_name(&file_name),
            name: name.to_string(),
            image,
        });
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let direct = dir.join(name);
        if direct.is_file() {
            return Some(direct);
        }
        if Path::new(name).extension().is_none() {
            let png = dir.join(format!("{name}.png"));
            if png.is_file() {
                return Some(png);
            }
        }
        None
    }
}

//! Template rendering for message bodies.
//!
//! Wraps a Handlebars registry. Templates come from inline strings,
//! individual files, or search-path directories whose `.hbs` files are
//! registered under their file stems. Rendering a name that was never
//! registered reports the locations that were searched.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;

use crate::errors::{MailerError, MailerResult};

/// Renders named templates into message bodies.
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
    search_paths: Vec<PathBuf>,
}

impl TemplateRenderer {
    /// Creates an empty renderer.
    pub fn new() -> Self {
        Self {
            registry: Handlebars::new(),
            search_paths: Vec::new(),
        }
    }

    /// Registers a template from an inline string.
    pub fn register_template(&mut self, name: &str, source: &str) -> MailerResult<()> {
        self.registry
            .register_template_string(name, source)
            .map_err(|e| {
                MailerError::render(format!("Template {:?} failed to parse: {}", name, e))
                    .with_cause(e)
            })
    }

    /// Registers a template from a file.
    pub fn register_template_file(&mut self, name: &str, path: impl AsRef<Path>) -> MailerResult<()> {
        let path = path.as_ref();
        self.registry
            .register_template_file(name, path)
            .map_err(|e| {
                MailerError::render(format!(
                    "Template file {} failed to load: {}",
                    path.display(),
                    e
                ))
                .with_cause(e)
            })
    }

    /// Scans a directory and registers every `.hbs` file under its
    /// stem. Returns the number of templates registered. The directory
    /// is remembered for miss diagnostics.
    pub fn add_search_path(&mut self, dir: impl Into<PathBuf>) -> MailerResult<usize> {
        let dir = dir.into();

        let entries = std::fs::read_dir(&dir).map_err(|e| {
            MailerError::render(format!(
                "Cannot read template directory {}: {}",
                dir.display(),
                e
            ))
            .with_cause(e)
        })?;

        let mut registered = 0;
        for entry in entries {
            let entry = entry.map_err(|e| {
                MailerError::render(format!(
                    "Cannot read template directory {}: {}",
                    dir.display(),
                    e
                ))
                .with_cause(e)
            })?;

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };

            self.register_template_file(&stem, &path)?;
            registered += 1;
        }

        self.search_paths.push(dir);
        Ok(registered)
    }

    /// Returns true if a template with this name is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    /// Renders a template against the given model.
    pub fn render<T: Serialize>(&self, name: &str, model: &T) -> MailerResult<String> {
        if !self.registry.has_template(name) {
            return Err(self.missing_template_error(name));
        }

        self.registry.render(name, model).map_err(|e| {
            MailerError::render(format!("Template {:?} failed to render: {}", name, e))
                .with_cause(e)
        })
    }

    fn missing_template_error(&self, name: &str) -> MailerError {
        let mut message = format!("Template {:?} is not registered", name);
        if self.search_paths.is_empty() {
            message.push_str("; no search paths configured");
        } else {
            let listed = self
                .search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            message.push_str(&format!("; searched: {}", listed));
        }
        MailerError::render(message)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("search_paths", &self.search_paths)
            .finish()
    }
}

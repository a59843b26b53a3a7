use std::path::Path;

use serde::Deserialize;

use mentor_core::model::SessionTemplateDraft;

const DEFAULT_CURRICULUM: &str = include_str!("../resources/curriculum.toml");

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub templates: Vec<SessionTemplateDraft>,
}

impl SeedFile {
    /// Read a seed file, or the bundled starter curriculum when `path` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = match path {
            Some(path) => std::fs::read_to_string(path)?,
            None => DEFAULT_CURRICULUM.to_owned(),
        };
        Ok(toml::from_str(&raw)?)
    }
}

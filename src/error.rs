use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{tool} failed ({status}) while processing {}\n\n\
             Hint: check the tool path in your settings file and run the\n\
             command by hand to see its full output.\n\n\
             Command: {command}",
             .subject.display())]
    Conversion {
        tool: String,
        status: String,
        subject: PathBuf,
        command: String,
    },

    #[error("Refusing to overwrite existing {}\n\n\
             Hint: rerun with --overwrite always, or remove the target first.",
             .0.display())]
    OverwriteDenied(PathBuf),

    #[error("Settings import depth exceeded at {}\n\n\
             Hint: settings files are merged recursively through their `import` list.\n\
             Check for a file that (directly or indirectly) imports itself.",
             .0.display())]
    ImportDepthExceeded(PathBuf),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a missing required setting.
    pub fn missing_setting(key: &str) -> Self {
        Error::MissingInput(format!("setting `{}` is empty or not set", key))
    }

    /// Shorthand for a file or directory that should exist but does not.
    pub fn missing_path(what: &str, path: &std::path::Path) -> Self {
        Error::MissingInput(format!("{} not found: {}", what, path.display()))
    }
}

//! Entity configuration documents
//!
//! Every featurable can be described by a TOML document, identified by its [`Media`]. The root
//! table lists the features to attach, and every feature reads its own table:
//! ```toml
//! features = ["transformable", "layerable", "mover", "rectangle"]
//!
//! [transformable]
//! width = 16
//! height = 16
//!
//! [mover]
//! vx = 1.0
//! ```
//!
//! Nodes are addressed with dotted paths (`"physics.body"`), the empty path being the root table.

use ahash::AHashMap;
use serde::de::DeserializeOwned;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use toml::{Table, Value};

/// Path of a configuration document, relative to its [`MediaSource`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Media(String);

impl Media {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Somewhere configuration documents can be read from.
pub trait MediaSource {
    fn read(&self, media: &Media) -> io::Result<String>;
    fn exists(&self, media: &Media) -> bool;
}

/// Reads documents from files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    fn resolve(&self, media: &Media) -> PathBuf {
        self.root.join(media.path())
    }
}

impl MediaSource for DirectorySource {
    fn read(&self, media: &Media) -> io::Result<String> {
        fs::read_to_string(self.resolve(media))
    }

    fn exists(&self, media: &Media) -> bool {
        self.resolve(media).is_file()
    }
}

/// Keeps documents in memory. Mostly useful for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: AHashMap<Media, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, contents: &str) -> Self {
        self.insert(Media::new(path), contents);
        self
    }

    pub fn insert(&mut self, media: Media, contents: impl Into<String>) {
        self.documents.insert(media, contents.into());
    }
}

impl MediaSource for MemorySource {
    fn read(&self, media: &Media) -> io::Result<String> {
        self.documents.get(media).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no document at `{media}`"))
        })
    }

    fn exists(&self, media: &Media) -> bool {
        self.documents.contains_key(media)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read `{media}`")]
    Io {
        media: Media,
        #[source]
        source: io::Error,
    },
    #[error("couldn't parse `{media}`")]
    Parse {
        media: Media,
        #[source]
        source: toml::de::Error,
    },
    #[error("`{media}` has no node `{path}`")]
    MissingNode { media: Media, path: String },
    #[error("`{media}` has no attribute `{attribute}` in node `{path}`")]
    MissingAttribute {
        media: Media,
        path: String,
        attribute: String,
    },
    #[error("attribute `{attribute}` in node `{path}` of `{media}` is not {expected}")]
    WrongType {
        media: Media,
        path: String,
        attribute: String,
        expected: &'static str,
    },
    #[error("node `{path}` of `{media}` is invalid")]
    Invalid {
        media: Media,
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Typed read access to a parsed configuration document.
#[derive(Debug, Clone)]
pub struct Configurer {
    media: Media,
    root: Table,
}

impl Configurer {
    /// Reads and parses the document identified by `media`.
    pub fn load(source: &dyn MediaSource, media: &Media) -> Result<Self, ConfigError> {
        let text = source.read(media).map_err(|source| ConfigError::Io {
            media: media.clone(),
            source,
        })?;
        Self::parse(media.clone(), &text)
    }

    pub fn parse(media: Media, text: &str) -> Result<Self, ConfigError> {
        match text.parse::<Table>() {
            Ok(root) => Ok(Self { media, root }),
            Err(source) => Err(ConfigError::Parse { media, source }),
        }
    }

    pub fn media(&self) -> &Media {
        &self.media
    }

    pub fn root(&self) -> &Table {
        &self.root
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.find_node(path).is_some()
    }

    pub fn get_integer(&self, path: &str, attribute: &str) -> Result<i64, ConfigError> {
        self.get_attribute(path, attribute, "an integer", Value::as_integer)
    }

    pub fn get_integer_default(
        &self,
        default: i64,
        path: &str,
        attribute: &str,
    ) -> Result<i64, ConfigError> {
        self.or_default(default, self.get_integer(path, attribute))
    }

    /// Reads a floating point attribute. Integers are accepted as well.
    pub fn get_double(&self, path: &str, attribute: &str) -> Result<f64, ConfigError> {
        self.get_attribute(path, attribute, "a number", |value| match value {
            Value::Float(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            _ => None,
        })
    }

    pub fn get_double_default(
        &self,
        default: f64,
        path: &str,
        attribute: &str,
    ) -> Result<f64, ConfigError> {
        self.or_default(default, self.get_double(path, attribute))
    }

    pub fn get_string(&self, path: &str, attribute: &str) -> Result<String, ConfigError> {
        self.get_attribute(path, attribute, "a string", |value| {
            value.as_str().map(str::to_owned)
        })
    }

    pub fn get_boolean(&self, path: &str, attribute: &str) -> Result<bool, ConfigError> {
        self.get_attribute(path, attribute, "a boolean", Value::as_bool)
    }

    pub fn get_boolean_default(
        &self,
        default: bool,
        path: &str,
        attribute: &str,
    ) -> Result<bool, ConfigError> {
        self.or_default(default, self.get_boolean(path, attribute))
    }

    /// Reads an array of strings.
    pub fn get_strings(&self, path: &str, attribute: &str) -> Result<Vec<String>, ConfigError> {
        self.get_attribute(path, attribute, "a list of strings", |value| {
            value
                .as_array()?
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
    }

    pub fn get_strings_default(
        &self,
        default: Vec<String>,
        path: &str,
        attribute: &str,
    ) -> Result<Vec<String>, ConfigError> {
        self.or_default(default, self.get_strings(path, attribute))
    }

    /// Deserializes a whole node.
    pub fn get_node<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let node = self.node(path)?;
        Value::Table(node.clone())
            .try_into()
            .map_err(|source| ConfigError::Invalid {
                media: self.media.clone(),
                path: path.to_owned(),
                source,
            })
    }

    /// Like [`Configurer::get_node`], but a missing node yields `T::default()`.
    pub fn get_node_default<T: DeserializeOwned + Default>(
        &self,
        path: &str,
    ) -> Result<T, ConfigError> {
        match self.get_node(path) {
            Err(ConfigError::MissingNode { .. }) => Ok(T::default()),
            other => other,
        }
    }

    fn find_node(&self, path: &str) -> Option<&Table> {
        if path.is_empty() {
            return Some(&self.root);
        }

        path.split('.')
            .try_fold(&self.root, |table, segment| table.get(segment)?.as_table())
    }

    fn node(&self, path: &str) -> Result<&Table, ConfigError> {
        self.find_node(path).ok_or_else(|| ConfigError::MissingNode {
            media: self.media.clone(),
            path: path.to_owned(),
        })
    }

    fn get_attribute<T>(
        &self,
        path: &str,
        attribute: &str,
        expected: &'static str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<T, ConfigError> {
        let value = self
            .node(path)?
            .get(attribute)
            .ok_or_else(|| ConfigError::MissingAttribute {
                media: self.media.clone(),
                path: path.to_owned(),
                attribute: attribute.to_owned(),
            })?;

        convert(value).ok_or_else(|| ConfigError::WrongType {
            media: self.media.clone(),
            path: path.to_owned(),
            attribute: attribute.to_owned(),
            expected,
        })
    }

    fn or_default<T>(&self, default: T, result: Result<T, ConfigError>) -> Result<T, ConfigError> {
        match result {
            Err(ConfigError::MissingNode { .. } | ConfigError::MissingAttribute { .. }) => {
                Ok(default)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const DOCUMENT: &str = r#"
features = ["transformable", "mover"]
name = "crate"

[transformable]
x = 3
width = 16

[physics.body]
mass = 2.5
solid = true
"#;

    fn configurer() -> Configurer {
        Configurer::parse(Media::new("crate.toml"), DOCUMENT).unwrap()
    }

    #[test]
    fn typed_attributes() {
        let configurer = configurer();
        assert_eq!(configurer.get_string("", "name").unwrap(), "crate");
        assert_eq!(configurer.get_integer("transformable", "width").unwrap(), 16);
        assert_eq!(configurer.get_double("transformable", "x").unwrap(), 3.0);
        assert_eq!(configurer.get_double("physics.body", "mass").unwrap(), 2.5);
        assert!(configurer.get_boolean("physics.body", "solid").unwrap());
        assert_eq!(
            configurer.get_strings("", "features").unwrap(),
            ["transformable", "mover"]
        );
    }

    #[test]
    fn nodes_and_defaults() {
        let configurer = configurer();
        assert!(configurer.has_node(""));
        assert!(configurer.has_node("physics.body"));
        assert!(!configurer.has_node("physics.shape"));
        assert!(!configurer.has_node("name"));

        assert_eq!(configurer.get_integer_default(7, "transformable", "height").unwrap(), 7);
        assert_eq!(configurer.get_integer_default(7, "missing", "height").unwrap(), 7);
        assert!(configurer.get_boolean_default(true, "", "name").is_err());
    }

    #[test]
    fn descriptive_errors() {
        let configurer = configurer();
        assert!(matches!(
            configurer.get_integer("", "missing"),
            Err(ConfigError::MissingAttribute { .. })
        ));
        assert!(matches!(
            configurer.get_integer("", "name"),
            Err(ConfigError::WrongType { expected: "an integer", .. })
        ));
        assert!(matches!(
            configurer.get_integer("nowhere", "x"),
            Err(ConfigError::MissingNode { .. })
        ));

        let error = configurer.get_integer("", "name").unwrap_err();
        assert_eq!(
            error.to_string(),
            "attribute `name` in node `` of `crate.toml` is not an integer"
        );
    }

    #[test]
    fn whole_nodes_deserialize() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        struct Body {
            mass: f64,
            solid: bool,
        }

        let configurer = configurer();
        let body: Body = configurer.get_node("physics.body").unwrap();
        assert_eq!(body, Body { mass: 2.5, solid: true });

        assert!(matches!(
            configurer.get_node::<Body>("transformable"),
            Err(ConfigError::Invalid { .. })
        ));
        assert_eq!(configurer.get_node_default::<Body>("absent").unwrap(), Body::default());
    }

    #[test]
    fn sources() {
        let source = MemorySource::new().with("a.toml", "value = 1");
        let media = Media::new("a.toml");
        assert!(source.exists(&media));
        assert_eq!(
            Configurer::load(&source, &media)
                .unwrap()
                .get_integer("", "value")
                .unwrap(),
            1
        );

        let missing = Configurer::load(&source, &Media::new("b.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));

        let broken = MemorySource::new().with("c.toml", "value = ");
        assert!(matches!(
            Configurer::load(&broken, &Media::new("c.toml")),
            Err(ConfigError::Parse { .. })
        ));
    }
}

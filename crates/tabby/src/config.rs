//! Configuration file handling for tabby.
//!
//! Looks for `.config/tabby.styx` in the current directory or any parent directory.

use camino::{Utf8Path, Utf8PathBuf};
use facet::Facet;

use crate::blob::DEFAULT_BLOB_TABLE;
use crate::names::DEFAULT_LOOKUP_TABLE;
use crate::{Error, HashAlgorithm, Result};

/// Relative location of the configuration file.
pub const CONFIG_FILE: &str = ".config/tabby.styx";

/// Contents of `.config/tabby.styx`.
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// `mysql://...` or `postgres://...`
    #[facet(default)]
    pub database_url: Option<String>,

    /// Name of the table mapping logical names to short identifiers.
    #[facet(default)]
    pub lookup_table: Option<String>,

    /// Name of the table storing serialized messages.
    #[facet(default)]
    pub blob_table: Option<String>,

    #[facet(default)]
    pub hash: Option<HashConfig>,
}

/// The `hash` section.
#[derive(Debug, Clone, Default, Facet)]
pub struct HashConfig {
    /// `blake3` or `blake3-keyed`.
    #[facet(default)]
    pub algorithm: Option<String>,

    /// Digest length in bytes.
    #[facet(default)]
    pub length: Option<u32>,

    /// Base64-encoded 32-byte key, for `blake3-keyed`.
    #[facet(default)]
    pub key: Option<String>,
}

impl Config {
    /// Parse configuration source text.
    pub fn parse(source: &str) -> Result<Self> {
        facet_styx::from_str(source)
            .map_err(|e| Error::configuration(format!("failed to parse {CONFIG_FILE}: {e}")))
    }

    /// Load configuration from `.config/tabby.styx`, searching up the
    /// directory tree from the current directory.
    pub fn load() -> Result<(Self, Utf8PathBuf)> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::configuration(format!("no current directory: {e}")))?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|e| Error::configuration(format!("current directory is not UTF-8: {e}")))?;
        Self::load_from(&cwd)
    }

    /// Load configuration starting from a specific directory.
    pub fn load_from(start: &Utf8Path) -> Result<(Self, Utf8PathBuf)> {
        let path = find_config_file(start)?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::configuration(format!("failed to read {path}: {e}")))?;
        Ok((Self::parse(&content)?, path))
    }

    pub fn lookup_table(&self) -> &str {
        self.lookup_table.as_deref().unwrap_or(DEFAULT_LOOKUP_TABLE)
    }

    pub fn blob_table(&self) -> &str {
        self.blob_table.as_deref().unwrap_or(DEFAULT_BLOB_TABLE)
    }

    /// Validate the `hash` section into an algorithm.
    ///
    /// A missing section selects the keyless default; a section without an
    /// `algorithm` is an error.
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm> {
        let Some(hash) = &self.hash else {
            return Ok(HashAlgorithm::default());
        };
        let key = hash
            .key
            .as_deref()
            .map(|k| {
                crate::base64::decode(k)
                    .map_err(|e| Error::configuration(format!("hash key is not base64: {e}")))
            })
            .transpose()?;
        HashAlgorithm::from_parts(
            hash.algorithm.as_deref().unwrap_or_default(),
            hash.length,
            key.as_deref(),
        )
    }
}

/// Find `.config/tabby.styx` by searching up the directory tree.
fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let path = current.join(CONFIG_FILE);
        if path.exists() {
            return Ok(path);
        }

        if !current.pop() {
            return Err(Error::configuration(format!(
                "no {CONFIG_FILE} found in {start} or any parent"
            )));
        }
    }
}

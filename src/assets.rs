//! Sources of the binary segments of a flash image
//!
//! Bootloaders and identity templates are referred to by site-relative paths
//! such as `/bin/bootloader/mi_DRV.bin`, stock driver firmware by absolute
//! URLs. An [AssetSource] resolves both kinds of locations, either against a
//! local asset directory or an HTTP origin.

use std::{
    collections::HashMap,
    fs,
    io,
    path::{Path, PathBuf},
};

use log::debug;

use crate::error::{Error, FetchError};

/// URL schemes accepted for third-party driver firmware
const FIRMWARE_URL_SCHEMES: &[&str] = &["http", "https"];

/// A source of binary assets
pub trait BinarySource {
    /// Fetch the asset at `location`
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

impl<T: BinarySource + ?Sized> BinarySource for &T {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(location)
    }
}

/// Fetches assets over HTTP
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    agent: ureq::Agent,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .build();

        Self { agent }
    }
}

#[cfg(feature = "http")]
impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "http")]
impl BinarySource for HttpSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        use std::io::Read;

        debug!("GET {location}");

        let response = self.agent.get(location).call().map_err(|err| match err {
            ureq::Error::Status(404, _) => FetchError::NotFound,
            ureq::Error::Status(code, _) => FetchError::Status(code),
            ureq::Error::Transport(transport) => FetchError::Transport(transport.to_string()),
        })?;

        let mut data = Vec::new();
        response.into_reader().read_to_end(&mut data)?;

        non_empty(data)
    }
}

/// Reads assets from a local directory, site-relative paths are resolved
/// against its root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, location: &str) -> PathBuf {
        self.root.join(location.trim_start_matches('/'))
    }
}

impl BinarySource for DirectorySource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.path(location);
        debug!("Reading {}", path.display());

        read_file(&path)
    }
}

/// Serves assets from memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySource {
    assets: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(location, data);
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.assets.insert(location.into(), data.into());
    }
}

impl BinarySource for MemorySource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let data = self.assets.get(location).ok_or(FetchError::NotFound)?;

        non_empty(data.clone())
    }
}

/// Resolves asset locations of any kind
///
/// - `http://` and `https://` URLs are fetched over HTTP
/// - `file://` URLs are read from the local file system
/// - site-relative paths are fetched from `base_url` when one is set, and
///   read from the asset directory otherwise
#[derive(Debug, Clone)]
pub struct AssetSource {
    base_url: Option<String>,
    local: DirectorySource,
    #[cfg(feature = "http")]
    http: HttpSource,
}

impl AssetSource {
    pub fn new(asset_dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_owned()),
            local: DirectorySource::new(asset_dir),
            #[cfg(feature = "http")]
            http: HttpSource::new(),
        }
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let scheme = scheme(url).unwrap_or_default().to_ascii_lowercase();

        match scheme.as_str() {
            "file" => read_file(Path::new(url.split_at(scheme.len() + 3).1)),
            #[cfg(feature = "http")]
            "http" | "https" => self.http.fetch(url),
            _ => Err(FetchError::UnsupportedScheme(scheme)),
        }
    }
}

impl BinarySource for AssetSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        if location.contains("://") {
            return self.fetch_url(location);
        }

        match &self.base_url {
            Some(base_url) => {
                let url = format!("{base_url}/{}", location.trim_start_matches('/'));
                self.fetch_url(&url)
            }
            None => self.local.fetch(location),
        }
    }
}

/// Check that a user supplied firmware URL uses one of the accepted schemes
pub fn validate_firmware_url(url: &str) -> Result<(), Error> {
    let valid = scheme(url)
        .map(|scheme| {
            FIRMWARE_URL_SCHEMES
                .iter()
                .any(|accepted| scheme.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false);

    if !valid || url.len() <= url.find("://").unwrap_or(url.len()) + 3 {
        return Err(Error::InvalidFirmwareUrl(url.to_owned()));
    }

    Ok(())
}

fn scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once("://")?;

    let valid = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    valid.then_some(scheme)
}

fn read_file(path: &Path) -> Result<Vec<u8>, FetchError> {
    let data = fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => FetchError::NotFound,
        _ => FetchError::Io(err),
    })?;

    non_empty(data)
}

fn non_empty(data: Vec<u8>) -> Result<Vec<u8>, FetchError> {
    if data.is_empty() {
        return Err(FetchError::Empty);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_url_schemes() {
        for url in [
            "https://example.com/drv.bin",
            "HTTP://example.com/drv.bin",
        ] {
            assert!(validate_firmware_url(url).is_ok(), "{url}");
        }

        for url in [
            "ftp://files.example.com/drv.bin",
            "javascript://alert(1)",
            "file:///etc/passwd",
            "example.com/drv.bin",
            "https://",
            "",
        ] {
            assert!(
                matches!(validate_firmware_url(url), Err(Error::InvalidFirmwareUrl(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn memory_source() {
        let source = MemorySource::new()
            .with("/bin/data/default", vec![1, 2, 3])
            .with("/bin/empty", vec![]);

        assert_eq!(source.fetch("/bin/data/default").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            source.fetch("/bin/data/4pro"),
            Err(FetchError::NotFound)
        ));
        assert!(matches!(source.fetch("/bin/empty"), Err(FetchError::Empty)));
    }

    #[test]
    fn directory_source_resolves_site_relative_paths() {
        let root = std::env::temp_dir().join(format!("scootflash-assets-{}", std::process::id()));
        fs::create_dir_all(root.join("bin/bootloader")).unwrap();
        fs::write(root.join("bin/bootloader/mi_DRV.bin"), [0xaa; 16]).unwrap();

        let source = AssetSource::new(&root, None);
        assert_eq!(
            source.fetch("/bin/bootloader/mi_DRV.bin").unwrap(),
            vec![0xaa; 16]
        );
        assert!(matches!(
            source.fetch("/bin/bootloader/nb_DRV.bin"),
            Err(FetchError::NotFound)
        ));

        let url = format!("file://{}", root.join("bin/bootloader/mi_DRV.bin").display());
        assert_eq!(source.fetch(&url).unwrap(), vec![0xaa; 16]);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn unsupported_scheme() {
        let source = AssetSource::new("assets", None);

        assert!(matches!(
            source.fetch("ftp://files.example.com/drv.bin"),
            Err(FetchError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
    }
}

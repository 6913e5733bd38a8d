//! # Data Source
//!
//! Entry point: one opened binary (or standalone symbol store) and its
//! located debug store.
//!
//! Opening reads only container headers: the image's signature, its export
//! table, and the headers of the candidate debug stores needed to pick the one
//! that matches. The provider's record table is converted into a
//! [`RecordStore`] on the first [`DataSource::create_session`] call and shared
//! by every Session created afterwards.
//!
//! `DataSource` is a cheap handle (`Clone + Send + Sync`). Sessions keep only a
//! weak back-reference to it plus their own `Arc` of the loaded store, so the
//! store lives as long as its longest holder.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{DebugInfoError, Result};
use crate::loader::{self, Provider};
use crate::session::{Session, SessionOptions};
use crate::store::RecordStore;
use crate::types::{Address, Architecture, DebugSignature, SourceFormat};

/// Options for [`DataSource::open_with`].
#[derive(Debug, Clone)]
pub struct OpenOptions
{
    search_dirs: Vec<PathBuf>,
    use_env_symbol_path: bool,
    debug_store: Option<PathBuf>,
}

impl Default for OpenOptions
{
    fn default() -> Self
    {
        Self {
            search_dirs: Vec::new(),
            use_env_symbol_path: true,
            debug_store: None,
        }
    }
}

impl OpenOptions
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Search `dir` for debug stores, both flat (`dir/name`) and in
    /// symbol-server layout (`dir/name/<KEY>/name`).
    #[must_use]
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self
    {
        self.search_dirs.push(dir.into());
        self
    }

    #[must_use]
    pub fn with_search_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Whether `SYMSCOPE_SYMBOL_PATH` and `_NT_SYMBOL_PATH` add search
    /// directories (on by default).
    #[must_use]
    pub fn use_env_symbol_path(mut self, enabled: bool) -> Self
    {
        self.use_env_symbol_path = enabled;
        self
    }

    /// Try this debug store before any other candidate.
    #[must_use]
    pub fn with_debug_store(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.debug_store = Some(path.into());
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf]
    {
        &self.search_dirs
    }

    pub fn env_symbol_path_enabled(&self) -> bool
    {
        self.use_env_symbol_path
    }

    pub fn debug_store(&self) -> Option<&Path>
    {
        self.debug_store.as_deref()
    }
}

/// One entry of an image's export table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export
{
    pub name: String,
    /// Address in the same space as the debug store (RVA for PE images).
    pub address: Address,
}

impl fmt::Display for Export
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {}", self.address, self.name)
    }
}

/// Everything `open` learned about the image, plus the provider that can load its store.
#[derive(Debug)]
pub(crate) struct Opened
{
    pub format: SourceFormat,
    pub architecture: Option<Architecture>,
    pub signature: Option<DebugSignature>,
    pub debug_store_path: Option<PathBuf>,
    pub exports: Vec<Export>,
    pub provider: Option<Provider>,
}

#[derive(Debug)]
pub(crate) struct SourceInner
{
    path: PathBuf,
    format: SourceFormat,
    architecture: Option<Architecture>,
    signature: Option<DebugSignature>,
    debug_store_path: Option<PathBuf>,
    exports: Vec<Export>,
    has_store: bool,
    provider: Mutex<Option<Provider>>,
    store: OnceCell<std::result::Result<Arc<RecordStore>, String>>,
}

impl SourceInner
{
    fn load_store(&self) -> std::result::Result<Arc<RecordStore>, String>
    {
        let provider = self
            .provider
            .lock()
            .map_err(|_| "debug store provider lock poisoned".to_string())?
            .take()
            .ok_or_else(|| "debug store provider already consumed".to_string())?;

        info!(path = %self.path.display(), "loading debug store");
        let store = provider.load().map_err(|err| err.to_string())?;
        info!(
            path = %self.path.display(),
            records = store.len(),
            malformed = store.malformed_count(),
            "debug store loaded"
        );
        Ok(Arc::new(store))
    }
}

/// An opened binary and its debug store.
///
/// ## Example
///
/// ```rust,no_run
/// use symscope_core::{DataSource, SymbolKind};
///
/// let source = DataSource::open("C:/Windows/System32/ntdll.dll")?;
/// let session = source.create_session()?;
/// let function = session.find_symbol_by_address(0x1000u64, Some(SymbolKind::Function))?;
/// println!("{function}");
/// # Ok::<(), symscope_core::DebugInfoError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DataSource
{
    inner: Arc<SourceInner>,
}

impl DataSource
{
    /// Open a binary image or standalone PDB and locate its debug store.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if no file exists at `path`
    /// - [`DebugInfoError::Format`] if the file is neither an image nor a PDB
    /// - [`DebugInfoError::Mismatch`] if debug stores were found but none matches the image
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        Self::open_with(path, &OpenOptions::default())
    }

    /// Same as [`DataSource::open`] with explicit search options.
    ///
    /// ## Errors
    ///
    /// Same as [`DataSource::open`].
    pub fn open_with(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self>
    {
        let path = path.as_ref();
        let opened = loader::open(path, options)?;
        debug!(
            path = %path.display(),
            format = %opened.format,
            store = ?opened.debug_store_path,
            exports = opened.exports.len(),
            "opened data source"
        );
        Ok(Self::from_opened(path.to_path_buf(), opened))
    }

    /// Wrap an in-memory store.
    pub fn from_records(name: impl Into<PathBuf>, store: RecordStore) -> Self
    {
        let header = store.header().clone();
        let inner = SourceInner {
            path: name.into(),
            format: header.format,
            architecture: header.architecture,
            signature: header.signature,
            debug_store_path: None,
            exports: Vec::new(),
            has_store: true,
            provider: Mutex::new(None),
            store: OnceCell::with_value(Ok(Arc::new(store))),
        };
        Self { inner: Arc::new(inner) }
    }

    fn from_opened(path: PathBuf, opened: Opened) -> Self
    {
        let inner = SourceInner {
            path,
            format: opened.format,
            architecture: opened.architecture,
            signature: opened.signature,
            debug_store_path: opened.debug_store_path,
            exports: opened.exports,
            has_store: opened.provider.is_some(),
            provider: Mutex::new(opened.provider),
            store: OnceCell::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    pub(crate) fn from_inner(inner: Arc<SourceInner>) -> Self
    {
        Self { inner }
    }

    /// Create a Session with default options.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if no debug store was located
    /// - [`DebugInfoError::CorruptStore`] if the store could not be loaded or its root is invalid
    pub fn create_session(&self) -> Result<Session>
    {
        self.create_session_with(SessionOptions::default())
    }

    /// Create a Session with explicit options.
    ///
    /// ## Errors
    ///
    /// Same as [`DataSource::create_session`].
    pub fn create_session_with(&self, options: SessionOptions) -> Result<Session>
    {
        if !self.inner.has_store {
            return Err(DebugInfoError::NotFound(format!(
                "no debug information found for {}",
                self.inner.path.display()
            )));
        }
        let store = self
            .inner
            .store
            .get_or_init(|| self.inner.load_store())
            .clone()
            .map_err(DebugInfoError::CorruptStore)?;
        store.verify_root()?;
        Ok(Session::new(Arc::downgrade(&self.inner), store, options))
    }

    /// Export table of the image, available without a debug store.
    pub fn exports(&self) -> &[Export]
    {
        &self.inner.exports
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path
    {
        &self.inner.path
    }

    /// Path of the located debug store, if it is a separate file.
    pub fn debug_store_path(&self) -> Option<&Path>
    {
        self.inner.debug_store_path.as_deref()
    }

    pub fn signature(&self) -> Option<&DebugSignature>
    {
        self.inner.signature.as_ref()
    }

    pub fn format(&self) -> SourceFormat
    {
        self.inner.format
    }

    pub fn architecture(&self) -> Option<Architecture>
    {
        self.inner.architecture
    }

    /// Whether a debug store was located.
    pub fn has_debug_store(&self) -> bool
    {
        self.inner.has_store
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_data_source_is_send_and_sync()
    {
        assert_send_sync::<DataSource>();
    }

    #[test]
    fn test_open_options_defaults()
    {
        let options = OpenOptions::new();
        assert!(options.env_symbol_path_enabled());
        assert!(options.search_dirs().is_empty());
        assert!(options.debug_store().is_none());

        let options = options.use_env_symbol_path(false).with_search_dirs(["a", "b"]).with_debug_store("x.pdb");
        assert!(!options.env_symbol_path_enabled());
        assert_eq!(options.search_dirs().len(), 2);
        assert_eq!(options.debug_store(), Some(Path::new("x.pdb")));
    }
}

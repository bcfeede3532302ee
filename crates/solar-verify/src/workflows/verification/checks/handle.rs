use std::fmt;
use std::sync::{Arc, OnceLock};

use super::CheckError;

type Loader<T> = Box<dyn Fn() -> Result<Arc<T>, String> + Send + Sync>;

/// Process-wide, lazily constructed handle to an expensive model or service client.
///
/// The loader runs at most once; concurrent first callers block until it finishes. A failed
/// load is memoised as well and reported as [`CheckError::Unavailable`] on every access.
pub struct LazyHandle<T: ?Sized + Send + Sync + 'static> {
    name: &'static str,
    cell: OnceLock<Result<Arc<T>, String>>,
    loader: Loader<T>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyHandle<T> {
    pub fn new<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, String> + Send + Sync + 'static,
    {
        Self {
            name,
            cell: OnceLock::new(),
            loader: Box::new(loader),
        }
    }

    /// Handle that is already initialised; mostly useful for tests and demos.
    pub fn ready(name: &'static str, value: Arc<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(value));
        Self {
            name,
            cell,
            loader: Box::new(move || {
                Err::<Arc<T>, String>(format!("{name} was constructed pre-initialised"))
            }),
        }
    }

    pub fn get(&self) -> Result<Arc<T>, CheckError> {
        match self.cell.get_or_init(|| (self.loader)()) {
            Ok(value) => Ok(Arc::clone(value)),
            Err(reason) => Err(CheckError::Unavailable(format!(
                "{} failed to load: {reason}",
                self.name
            ))),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for LazyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyHandle")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

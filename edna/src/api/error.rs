use crate::api::configuration::ConfigurationError;
use crate::dag::DagError;
use crate::io::TransportError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub(crate) inner_error: anyhow::Error,
}

impl Error {
    pub fn msg(msg: String) -> Self {
        Error {
            inner_error: anyhow!(msg),
        }
    }

    pub fn wrap<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error {
            inner_error: anyhow::Error::new(e),
        }
    }

    /// The typed error this one was created from, if it has that type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.inner_error.downcast_ref::<E>()
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner_error.fmt(f)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error { inner_error: e }
    }
}

impl From<DagError> for Error {
    fn from(e: DagError) -> Self {
        Error::wrap(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::wrap(e)
    }
}

impl From<ConfigurationError> for Error {
    fn from(e: ConfigurationError) -> Self {
        Error::wrap(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::wrap(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::wrap(e)
    }
}

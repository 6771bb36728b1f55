use crate::AnyResult;
use anyhow::anyhow;
use std::{error::Error, fmt::Display};

/// Context attaching helpers for foreign errors and missing values.
///
/// Results that already carry an [`anyhow::Error`] should use [`anyhow::Context`] instead.
pub trait AnyhowResultExt<T>: Sized {
    /// Wraps the error with `context`, or turns `None` into an error saying `context`.
    fn otherwise<C>(self, context: C) -> AnyResult<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.otherwise_with(|| context)
    }

    /// Lazy version of [`AnyhowResultExt::otherwise`], `context` only runs on failure.
    fn otherwise_with<C, F>(self, context: F) -> AnyResult<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: Error + Send + Sync + 'static> AnyhowResultExt<T> for Result<T, E> {
    fn otherwise_with<C, F>(self, context: F) -> AnyResult<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| anyhow::Error::new(error).context(context()))
    }
}

impl<T> AnyhowResultExt<T> for Option<T> {
    fn otherwise_with<C, F>(self, context: F) -> AnyResult<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| anyhow!("{}", context()))
    }
}

#[cfg(test)]
mod tests {
    use super::AnyhowResultExt;
    use std::io;

    #[test]
    fn foreign_errors_get_context() {
        let result: Result<(), io::Error> = Err(io::Error::new(io::ErrorKind::Other, "boom"));
        let error = result.otherwise("while testing").unwrap_err();

        assert_eq!(error.to_string(), "while testing");
        assert_eq!(format!("{error:#}"), "while testing: boom");
        assert!(error.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn missing_values_become_errors() {
        let error = None::<u32>.otherwise_with(|| format!("no {}", "value")).unwrap_err();
        assert_eq!(error.to_string(), "no value");
        assert_eq!(Some(5).otherwise("unused").unwrap(), 5);
    }

    #[test]
    fn lazy_context_only_runs_on_failure() {
        let result: Result<u8, io::Error> = Ok(1);
        let value = result
            .otherwise_with(|| -> String { panic!("context evaluated") })
            .unwrap();
        assert_eq!(value, 1);
    }
}

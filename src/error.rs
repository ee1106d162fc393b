/// Turns a failed result into `None` after logging the error.
///
/// Used at the edges of startup work where an error must never stop the
/// caller, e.g. reporting a failed connection test.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error at `warn` level, prefixed with `context`, and discards it.
    fn ok_warn(self, context: &str) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_warn_passes_through_ok() {
        let res: Result<u8, std::io::Error> = Ok(7);
        assert_eq!(res.ok_warn("saving config"), Some(7));
    }

    #[test]
    fn test_ok_warn_discards_error() {
        let res: Result<u8, std::io::Error> = Err(std::io::Error::other("boom"));
        assert_eq!(res.ok_warn("saving config"), None);
    }
}

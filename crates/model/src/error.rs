/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The endpoint could not be reached, or refused the request before
    /// any output was produced.
    Connection,
    /// The endpoint answered with something that is not a valid response.
    MalformedResponse,
    /// The response stream broke off before the reply was complete.
    StreamInterrupted,
    /// Any other errors, including errors reported by the endpoint itself.
    Other,
}

impl ErrorKind {
    /// Returns `true` if sending the same request again may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Connection)
    }
}

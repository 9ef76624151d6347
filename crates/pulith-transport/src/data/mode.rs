use bytes::Bytes;

/// How an incoming body is split into records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadingMode {
    /// Each fragment received from the transport is one record.
    #[default]
    Fragment,

    /// Records of exactly `n` bytes; the last one may be shorter.
    ///
    /// `FixedLength(0)` behaves like [`ReadingMode::Fragment`].
    FixedLength(usize),

    /// Records ending with, and including, the separator.
    ///
    /// An empty separator behaves like [`ReadingMode::Fragment`].
    Separator(Bytes),
}

impl ReadingMode {
    pub fn lines() -> Self { ReadingMode::Separator(Bytes::from_static(b"\n")) }

    pub fn separator(separator: impl Into<Bytes>) -> Self { ReadingMode::Separator(separator.into()) }
}

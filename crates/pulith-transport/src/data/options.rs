use super::mode::ReadingMode;

/// Default number of undelivered download records before the transport is
/// asked to pause.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Configuration for one request execution.
///
/// # Examples
///
/// ```
/// use pulith_transport::{ReadingMode, TransportOptions};
///
/// let options = TransportOptions::default()
///     .chunk_size(16 * 1024)
///     .reading_mode(ReadingMode::lines())
///     .high_water_mark(64);
/// assert_eq!(options.chunk_size, Some(16 * 1024));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Size of each upload chunk handed to the transport.
    ///
    /// When `None`, a size is derived from the total payload length
    /// (see [`default_chunk_size`](crate::default_chunk_size)).
    ///
    /// Default: None
    pub chunk_size: Option<usize>,

    /// How the response body is split into records.
    ///
    /// Default: [`ReadingMode::Fragment`]
    pub reading_mode: ReadingMode,

    /// Undelivered download records tolerated before the continuation
    /// returned to the transport stays pending.
    ///
    /// Default: 16
    pub high_water_mark: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            chunk_size:      None,
            reading_mode:    ReadingMode::default(),
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl TransportOptions {
    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn reading_mode(mut self, mode: ReadingMode) -> Self {
        self.reading_mode = mode;
        self
    }

    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn high_water_mark(mut self, records: usize) -> Self {
        self.high_water_mark = records.max(1);
        self
    }
}

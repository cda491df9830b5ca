#![allow(clippy::struct_excessive_bools)]

/// How the encoder decides whether a string value needs quoting.
///
/// The two policies are maintained as independent scans with deliberately
/// different rules; notably, empty-string quoting is only considered by the
/// loose policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuoteStyle {
    /// Scan every character and quote only when the value actually contains
    /// the separator, the quote character, a carriage return or line feed,
    /// the escape character, or starts with `#`.
    Strict,
    /// Quote when the value is longer than a short threshold (skipping the
    /// scan entirely), or when any character falls below a precomputed
    /// "minimum safe" code point derived from the separator, quote, and
    /// line-separator characters, or when the value is empty and
    /// [`CsvOptions::always_quote_empty_strings`] is set.
    Loose,
}

/// Configuration shared by the column decoder and encoder.
///
/// The defaults describe the common comma-separated form: `,` separator,
/// `"` quoting, no escape character, LF line separator, an empty null
/// literal, loose quoting, and every behavioral flag off.
///
/// # Examples
///
/// ```rust
/// use csvmodem::CsvOptions;
///
/// let options = CsvOptions {
///     separator: ';',
///     trim_spaces: true,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CsvOptions {
    /// The column separator character.
    ///
    /// # Default
    ///
    /// `,`
    pub separator: char,

    /// The quote character, or `None` to disable quoting entirely. With
    /// quoting disabled the encoder never quotes and the decoder treats the
    /// character as ordinary data.
    ///
    /// # Default
    ///
    /// `Some('"')`
    pub quote: Option<char>,

    /// The escape character, or `None` to disable escape processing.
    ///
    /// When configured, the decoder recognizes `0`, `n`, `r`, and `t` after
    /// the escape character (NUL, LF, CR, TAB); any other escaped character
    /// passes through literally.
    ///
    /// # Default
    ///
    /// `None`
    pub escape: Option<char>,

    /// The record terminator written by the encoder.
    ///
    /// The decoder always accepts LF, CR, and CRLF regardless of this
    /// setting.
    ///
    /// # Default
    ///
    /// `"\n"`
    pub line_separator: String,

    /// The literal the encoder writes for null column values. Never quoted.
    ///
    /// # Default
    ///
    /// `""` (empty)
    pub null_literal: String,

    /// The declared number of columns per record. Used to pre-size the
    /// encoder's out-of-order buffer and, together with
    /// [`write_missing_columns`](Self::write_missing_columns), to pad short
    /// records.
    ///
    /// # Default
    ///
    /// `0`
    pub column_count: usize,

    /// Whether the decoder trims spaces around unquoted values. Content
    /// inside quotes is always preserved verbatim.
    ///
    /// # Default
    ///
    /// `false`
    pub trim_spaces: bool,

    /// Whether a `#` at the start of a record marks a comment line, which
    /// the decoder skips entirely. A `#` anywhere else is ordinary data.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_comments: bool,

    /// Which quoting decision policy the encoder uses for string values.
    ///
    /// # Default
    ///
    /// [`QuoteStyle::Loose`]
    pub quote_style: QuoteStyle,

    /// Whether the encoder quotes every string value regardless of content.
    ///
    /// # Default
    ///
    /// `false`
    pub always_quote_strings: bool,

    /// Whether the encoder quotes empty string values. Only consulted by
    /// the loose quoting policy.
    ///
    /// # Default
    ///
    /// `false`
    pub always_quote_empty_strings: bool,

    /// Whether [`end_row`](crate::ColumnEncoder::end_row) pads records that
    /// wrote fewer than [`column_count`](Self::column_count) columns with
    /// bare separators up to the declared count.
    ///
    /// # Default
    ///
    /// `false`
    pub write_missing_columns: bool,

    /// Whether embedded quote characters are escaped with the configured
    /// escape character instead of being doubled.
    ///
    /// # Default
    ///
    /// `false`
    pub escape_quote_with_escape: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: Some('"'),
            escape: None,
            line_separator: "\n".to_owned(),
            null_literal: String::new(),
            column_count: 0,
            trim_spaces: false,
            allow_comments: false,
            quote_style: QuoteStyle::Loose,
            always_quote_strings: false,
            always_quote_empty_strings: false,
            write_missing_columns: false,
            escape_quote_with_escape: false,
        }
    }
}

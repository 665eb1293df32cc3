//! Column buffers bound to a result set and the row view over them.
//!
//! A result set's schema is only known once a command has executed. For
//! every column the session asks a [`ColumnBinder`] for a buffer, binds it,
//! and then lets the driver overwrite the buffers at each fetch. The only
//! binder shipped is [`TextBinder`]: every column, whatever its SQL type, is
//! fetched as UTF-16 text. That keeps the pipeline schema agnostic at the
//! cost of native numeric and date types.

use serde::Serialize;

use crate::decimal::{Decimal, DecimalError};

/// `SQL_NULL_DATA`
pub const NULL_DATA: isize = -1;

/// `SQL_NO_TOTAL`
pub const NO_TOTAL: isize = -4;

const NULL_MARKER: &str = "<NULL>";

/// Characters an exact numeric needs beyond its precision: `-` and `.`.
const NUMERIC_SIGN_AND_POINT: usize = 2;

/// Concise SQL type of a result column (`SQL_DESC_CONCISE_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SqlDataType(pub i16);

#[allow(missing_docs)]
impl SqlDataType {
    pub const UNKNOWN: Self = Self(0);
    pub const CHAR: Self = Self(1);
    pub const NUMERIC: Self = Self(2);
    pub const DECIMAL: Self = Self(3);
    pub const INTEGER: Self = Self(4);
    pub const SMALLINT: Self = Self(5);
    pub const FLOAT: Self = Self(6);
    pub const REAL: Self = Self(7);
    pub const DOUBLE: Self = Self(8);
    pub const VARCHAR: Self = Self(12);
    pub const TYPE_DATE: Self = Self(91);
    pub const TYPE_TIME: Self = Self(92);
    pub const TYPE_TIMESTAMP: Self = Self(93);
    pub const LONGVARCHAR: Self = Self(-1);
    pub const BINARY: Self = Self(-2);
    pub const VARBINARY: Self = Self(-3);
    pub const LONGVARBINARY: Self = Self(-4);
    pub const BIGINT: Self = Self(-5);
    pub const TINYINT: Self = Self(-6);
    pub const BIT: Self = Self(-7);
    pub const WCHAR: Self = Self(-8);
    pub const WVARCHAR: Self = Self(-9);
    pub const WLONGVARCHAR: Self = Self(-10);
    pub const GUID: Self = Self(-11);
}

impl SqlDataType {
    /// `true` for character columns, which display left-justified.
    #[must_use]
    pub const fn is_character(self) -> bool {
        matches!(self.0, 1 | 12 | -1 | -8 | -9 | -10)
    }

    /// `true` for exact numerics that map onto [`Decimal`].
    #[must_use]
    pub const fn is_exact_numeric(self) -> bool {
        matches!(self.0, 2 | 3 | 4 | 5 | -5 | -6)
    }
}

/// C type a buffer is bound as (`TargetType` of `SQLBindCol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CDataType {
    /// `SQL_C_WCHAR`: UTF-16 text, NUL terminated.
    WChar,
}

impl CDataType {
    /// The `SQL_C_*` constant.
    #[must_use]
    pub const fn as_raw(self) -> i16 {
        match self {
            Self::WChar => -8,
        }
    }
}

/// Storage the driver writes one column of the current row into.
///
/// Both the data and the length/indicator live in their own heap
/// allocations that are never resized, so the addresses handed to
/// `SQLBindCol` remain valid for as long as the buffer exists.
#[derive(Debug)]
pub struct ColumnBuffer {
    c_type: CDataType,
    data: Box<[u16]>,
    indicator: Box<isize>,
}

impl ColumnBuffer {
    /// A text buffer holding `chars` UTF-16 units plus the terminator.
    #[must_use]
    pub fn text(chars: usize) -> Self {
        Self {
            c_type: CDataType::WChar,
            data: vec![0; chars + 1].into_boxed_slice(),
            indicator: Box::new(NULL_DATA),
        }
    }

    /// The C type this buffer is bound as.
    #[must_use]
    pub const fn c_type(&self) -> CDataType {
        self.c_type
    }

    /// Characters that fit, excluding the terminator.
    #[must_use]
    pub fn capacity_chars(&self) -> usize {
        self.data.len() - 1
    }

    /// Size of the data area in bytes (`BufferLength` of `SQLBindCol`).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(&*self.data)
    }

    /// Address of the data area, for drivers that bind by address.
    pub fn data_ptr(&mut self) -> *mut u16 {
        self.data.as_mut_ptr()
    }

    /// Address of the length/indicator, for drivers that bind by address.
    pub fn indicator_ptr(&mut self) -> *mut isize {
        &mut *self.indicator
    }

    /// Length/indicator written by the last fetch: byte length of the full
    /// value, [`NULL_DATA`] or [`NO_TOTAL`].
    #[must_use]
    pub fn indicator(&self) -> isize {
        *self.indicator
    }

    /// `true` when the last fetched value was SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        *self.indicator == NULL_DATA
    }

    /// Writes a fetched value the way a driver would: as much text as fits,
    /// NUL terminated, with the indicator set to the full byte length.
    pub fn fill(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            self.data[0] = 0;
            *self.indicator = NULL_DATA;
            return;
        };
        let capacity = self.capacity_chars();
        let mut total = 0usize;
        for unit in value.encode_utf16() {
            if total < capacity {
                self.data[total] = unit;
            }
            total += 1;
        }
        self.data[total.min(capacity)] = 0;
        *self.indicator = isize::try_from(total * 2).unwrap_or(NO_TOTAL);
    }

    /// The fetched value, `None` for SQL NULL.
    ///
    /// Only the indicator decides NULL-ness; whatever an earlier row left
    /// in the data area is ignored.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        let units = match *self.indicator {
            NULL_DATA => return None,
            len if len >= 0 => (len.unsigned_abs() / 2).min(self.capacity_chars()),
            _ => self
                .data
                .iter()
                .position(|&unit| unit == 0)
                .unwrap_or(self.capacity_chars()),
        };
        Some(String::from_utf16_lossy(&self.data[..units]))
    }

    /// `true` when the last value did not fit and was cut.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        match *self.indicator {
            NO_TOTAL => true,
            len if len >= 0 => len.unsigned_abs() / 2 > self.capacity_chars(),
            _ => false,
        }
    }
}

/// What the driver reports about one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// 1-based column number.
    pub ordinal: u16,
    /// Column name, at most [`DISPLAY_COLUMN_MAX`](crate::config::DISPLAY_COLUMN_MAX) chars.
    pub name: String,
    /// Concise SQL type.
    pub data_type: SqlDataType,
    /// Declared length (`SQL_DESC_LENGTH`).
    pub declared_size: usize,
    /// Width used when rendering this column.
    pub display_size: usize,
}

/// A result column together with the buffer it is bound to.
#[derive(Debug)]
pub struct ColumnBinding {
    info: ColumnInfo,
    buffer: ColumnBuffer,
}

impl ColumnBinding {
    /// Pairs a column description with its buffer.
    #[must_use]
    pub const fn new(info: ColumnInfo, buffer: ColumnBuffer) -> Self {
        Self { info, buffer }
    }

    /// Column description.
    #[must_use]
    pub const fn info(&self) -> &ColumnInfo {
        &self.info
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Bound buffer.
    #[must_use]
    pub const fn buffer(&self) -> &ColumnBuffer {
        &self.buffer
    }

    /// Bound buffer, for drivers filling it at fetch time.
    pub fn buffer_mut(&mut self) -> &mut ColumnBuffer {
        &mut self.buffer
    }

    /// `true` when the current row holds NULL in this column.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.buffer.is_null()
    }

    /// The current row's value, in full; `None` for NULL.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.buffer.value()
    }

    /// The current row's value cut to the column's display width, or
    /// `<NULL>`.
    #[must_use]
    pub fn display_value(&self) -> String {
        self.value().map_or_else(
            || NULL_MARKER.to_string(),
            |text| text.chars().take(self.info.display_size).collect(),
        )
    }

    /// Parses the current row's value as a [`Decimal`] at `scale`.
    ///
    /// # Errors
    ///
    /// Returns [`DecimalError::Truncated`] if the value did not fit the
    /// buffer, otherwise an error if the text is not a decimal number or
    /// does not fit in 64 bits.
    pub fn decimal(&self, scale: i8) -> Result<Option<Decimal>, DecimalError> {
        let Some(text) = self.value() else {
            return Ok(None);
        };
        if self.buffer.is_truncated() {
            return Err(DecimalError::Truncated(text));
        }
        Decimal::parse_with_scale(text.trim(), scale).map(Some)
    }
}

/// Chooses the buffer each result column is fetched into.
///
/// [`TextBinder`] is the text-only strategy; a typed strategy would allocate
/// native C buffers here instead.
pub trait ColumnBinder {
    /// Allocates the buffer for `column`.
    fn allocate(&self, column: &ColumnInfo) -> ColumnBuffer;
}

/// Fetches every column as text.
///
/// Buffers follow the declared column length, not the display width:
/// truncation is a rendering decision. For exact numerics the declared
/// length is the precision, so room for a sign and a decimal point is added.
/// Columns without a usable length fall back to `max_chars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBinder {
    max_chars: usize,
}

impl TextBinder {
    /// Creates a binder whose buffers never exceed `max_chars`.
    #[must_use]
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for TextBinder {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_BIND_CHARS)
    }
}

impl ColumnBinder for TextBinder {
    fn allocate(&self, column: &ColumnInfo) -> ColumnBuffer {
        let chars = match column.declared_size {
            0 => self.max_chars,
            size if column.data_type.is_exact_numeric() => {
                size.saturating_add(NUMERIC_SIGN_AND_POINT).min(self.max_chars)
            }
            size => size.min(self.max_chars),
        };
        ColumnBuffer::text(chars)
    }
}

/// The current row of an executing command.
///
/// Borrowed from the bound buffers, which the next fetch overwrites; copy
/// out anything that must outlive the callback.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [ColumnBinding],
}

impl<'a> Row<'a> {
    pub(crate) const fn new(columns: &'a [ColumnBinding]) -> Self {
        Self { columns }
    }

    /// Number of columns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    /// `true` for a row without columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The bound columns, by 0-based index.
    #[must_use]
    pub const fn columns(&self) -> &'a [ColumnBinding] {
        self.columns
    }

    /// Column at 0-based `index`.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&'a ColumnBinding> {
        self.columns.get(index)
    }

    /// Value at 0-based `index`. `None` for NULL or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<String> {
        self.column(index).and_then(ColumnBinding::value)
    }

    /// Copies every value out of the buffers.
    #[must_use]
    pub fn to_values(&self) -> Vec<Option<String>> {
        self.columns.iter().map(ColumnBinding::value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(declared_size: usize, display_size: usize) -> ColumnInfo {
        ColumnInfo {
            ordinal: 1,
            name: "note".to_string(),
            data_type: SqlDataType::WVARCHAR,
            declared_size,
            display_size,
        }
    }

    #[test]
    fn test_fresh_buffer_reads_as_null() {
        let buffer = ColumnBuffer::text(4);
        assert!(buffer.is_null());
        assert_eq!(buffer.value(), None);
    }

    #[test]
    fn test_null_and_empty_are_distinct() {
        let mut buffer = ColumnBuffer::text(8);
        buffer.fill(Some("stale"));
        buffer.fill(None);
        assert!(buffer.is_null());
        assert_eq!(buffer.value(), None);

        buffer.fill(Some(""));
        assert!(!buffer.is_null());
        assert_eq!(buffer.value(), Some(String::new()));
    }

    #[test]
    fn test_fill_truncates_to_capacity_but_reports_full_length() {
        let mut buffer = ColumnBuffer::text(3);
        buffer.fill(Some("abcdef"));
        assert_eq!(buffer.indicator(), 12);
        assert!(buffer.is_truncated());
        assert_eq!(buffer.value().as_deref(), Some("abc"));
    }

    #[test]
    fn test_no_total_reads_up_to_terminator() {
        let mut buffer = ColumnBuffer::text(8);
        buffer.fill(Some("xy"));
        *buffer.indicator = NO_TOTAL;
        assert_eq!(buffer.value().as_deref(), Some("xy"));
        assert!(buffer.is_truncated());
    }

    #[test]
    fn test_buffer_byte_len_counts_terminator() {
        let buffer = ColumnBuffer::text(10);
        assert_eq!(buffer.capacity_chars(), 10);
        assert_eq!(buffer.byte_len(), 22);
        assert_eq!(buffer.c_type().as_raw(), -8);
    }

    #[test]
    fn test_text_binder_uses_declared_length() {
        let binder = TextBinder::new(1_000);
        assert_eq!(binder.allocate(&info(120, 50)).capacity_chars(), 120);
        assert_eq!(binder.allocate(&info(0, 6)).capacity_chars(), 1_000);
        assert_eq!(binder.allocate(&info(1 << 30, 50)).capacity_chars(), 1_000);
    }

    #[test]
    fn test_display_value_truncates_but_value_is_whole() {
        let long = "x".repeat(80);
        let mut binding = ColumnBinding::new(info(80, 50), ColumnBuffer::text(80));
        binding.buffer_mut().fill(Some(&long));
        assert_eq!(binding.value().as_deref(), Some(long.as_str()));
        assert_eq!(binding.display_value().chars().count(), 50);

        binding.buffer_mut().fill(None);
        assert_eq!(binding.display_value(), "<NULL>");
    }

    #[test]
    fn test_decimal_column() {
        let mut binding = ColumnBinding::new(info(10, 10), ColumnBuffer::text(10));
        binding.buffer_mut().fill(Some(" 12.50"));
        let value = binding.decimal(2).expect("parses").expect("not null");
        assert_eq!(value.to_i64(), 1250);

        binding.buffer_mut().fill(None);
        assert_eq!(binding.decimal(2).expect("null is fine"), None);
    }

    #[test]
    fn test_truncated_decimal_is_an_error() {
        let mut binding = ColumnBinding::new(info(10, 10), ColumnBuffer::text(10));
        binding.buffer_mut().fill(Some("-12345678.90"));
        assert_eq!(
            binding.decimal(2),
            Err(DecimalError::Truncated("-12345678.".to_string()))
        );
    }

    #[test]
    fn test_text_binder_leaves_room_for_sign_and_point() {
        let binder = TextBinder::new(1_000);
        let mut column = info(10, 12);
        column.data_type = SqlDataType::DECIMAL;
        assert_eq!(binder.allocate(&column).capacity_chars(), 12);

        column.declared_size = 999;
        assert_eq!(binder.allocate(&column).capacity_chars(), 1_000);
    }

    #[test]
    fn test_character_types() {
        assert!(SqlDataType::WVARCHAR.is_character());
        assert!(SqlDataType::CHAR.is_character());
        assert!(!SqlDataType::INTEGER.is_character());
        assert!(SqlDataType::DECIMAL.is_exact_numeric());
    }
}

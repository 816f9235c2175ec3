//! Contracts for streaming result sets to and from external formats.
//!
//! Encoders and decoders of one format share a [`TimeFormat`] and zone so that
//! datetimes written by one are read back unchanged by the other.

use crate::appender::{AppendSummary, Appender};
use crate::column::{ColumnType, Columns};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::rows::Rows;
use crate::time::TimeFormat;
use crate::value::Value;

use std::fmt::Write;

use async_trait::async_trait;
use bytes::Bytes;
use chrono_tz::Tz;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Text that stands for a null field unless a context overrides it.
pub const DEFAULT_NULL_VALUE: &str = "NULL";

/// Byte output used by encoders and renderers. `shutdown` closes it.
pub trait Sink: AsyncWrite + Send + Unpin {}

impl<T: AsyncWrite + Send + Unpin + ?Sized> Sink for T {}

/// Byte input used by decoders.
pub trait Source: AsyncBufRead + Send + Unpin {}

impl<T: AsyncBufRead + Send + Unpin + ?Sized> Source for T {}

/// Output settings shared by every encoder.
#[derive(Debug)]
pub struct EncoderContext<W: Sink> {
    /// Destination of the encoded bytes.
    pub sink: W,

    /// Prefix each row with its 1-based number.
    pub rownum: bool,

    /// Emit a header line.
    pub heading: bool,

    /// Zone datetimes are formatted in.
    pub time_location: Tz,

    /// Datetime representation.
    pub time_format: TimeFormat,

    /// Fraction digits for floating point values; shortest form when `None`.
    pub precision: Option<usize>,

    /// Text written for null values.
    pub null_value: String,
}

impl<W: Sink> EncoderContext<W> {
    /// Creates a context writing to `sink` with UTC nanosecond datetimes.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            rownum: false,
            heading: false,
            time_location: Tz::UTC,
            time_format: TimeFormat::default(),
            precision: None,
            null_value: DEFAULT_NULL_VALUE.to_string(),
        }
    }

    /// Prefixes every row with its number.
    #[must_use]
    pub const fn with_rownum(mut self, rownum: bool) -> Self {
        self.rownum = rownum;
        self
    }

    /// Emits a header line before the first row.
    #[must_use]
    pub const fn with_heading(mut self, heading: bool) -> Self {
        self.heading = heading;
        self
    }

    /// Formats datetimes in `tz`.
    #[must_use]
    pub fn with_time_location(mut self, tz: Tz) -> Self {
        self.time_location = tz;
        self
    }

    /// Formats datetimes with `time_format`.
    #[must_use]
    pub fn with_time_format(mut self, time_format: TimeFormat) -> Self {
        self.time_format = time_format;
        self
    }

    /// Fixes the number of fraction digits for floating point values.
    #[must_use]
    pub const fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Writes `null_value` for nulls instead of `NULL`.
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Header names, with datetime columns annotated by the zone.
    #[must_use]
    pub fn header(&self, columns: &Columns) -> Vec<String> {
        columns.names_with_time_location(&self.time_location)
    }

    /// Renders `value` as text using the datetime and precision settings.
    ///
    /// Nulls render as the null text and binary values as lowercase hex.
    #[must_use]
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => self.null_value.clone(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Int8(v) => v.to_string(),
            Value::Float(v) => self.format_float(f64::from(*v)),
            Value::Double(v) => self.format_float(*v),
            Value::Datetime(ts) => self.time_format.format(ts, &self.time_location),
            Value::Ip(ip) => ip.to_string(),
            Value::String(text) => text.clone(),
            Value::Binary(bytes) => bytes.iter().fold(String::new(), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            }),
            Value::Bool(v) => v.to_string(),
        }
    }

    fn format_float(&self, value: f64) -> String {
        match self.precision {
            Some(precision) => format!("{value:.precision$}"),
            None => value.to_string(),
        }
    }

    /// Writes `bytes` to the sink.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.sink.write_all(bytes).await?)
    }

    /// Flushes and closes the sink.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sink.flush().await?;
        Ok(self.sink.shutdown().await?)
    }
}

/// Input settings shared by every decoder.
#[derive(Debug)]
pub struct DecoderContext<R: Source> {
    /// Origin of the encoded bytes.
    pub source: R,

    /// Shape of the decoded rows, usually the target table's columns.
    pub columns: Columns,

    /// Zone for textual datetimes without an offset.
    pub time_location: Tz,

    /// Datetime representation.
    pub time_format: TimeFormat,

    /// The input starts with a header line to skip.
    pub header: bool,

    /// Text read as null in non-string columns.
    pub null_value: String,
}

impl<R: Source> DecoderContext<R> {
    /// Creates a context reading `columns`-shaped rows from `source`.
    pub fn new(source: R, columns: Columns) -> Self {
        Self {
            source,
            columns,
            time_location: Tz::UTC,
            time_format: TimeFormat::default(),
            header: false,
            null_value: DEFAULT_NULL_VALUE.to_string(),
        }
    }

    /// Reads offset-less datetimes in `tz`.
    #[must_use]
    pub fn with_time_location(mut self, tz: Tz) -> Self {
        self.time_location = tz;
        self
    }

    /// Reads datetimes with `time_format`.
    #[must_use]
    pub fn with_time_format(mut self, time_format: TimeFormat) -> Self {
        self.time_format = time_format;
        self
    }

    /// Skips a header line before the first row.
    #[must_use]
    pub const fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Reads `null_value` as null instead of `NULL`.
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Converts one text field into the kind of column `idx`.
    ///
    /// String fields are taken literally, so `NULL` and the empty string stay
    /// text. Elsewhere the null text decodes to [`Value::Null`]. Binary fields
    /// are hex, so an empty one is empty bytes; other empty fields are null.
    pub fn parse_field(&self, idx: usize, field: &str) -> Result<Value> {
        let column = self.columns.get(idx).ok_or_else(|| {
            Error::Malformed(format!(
                "field {} beyond {} columns",
                idx + 1,
                self.columns.len()
            ))
        })?;
        match column.column_type {
            ColumnType::String => Ok(Value::String(field.to_string())),
            _ if field.eq_ignore_ascii_case(&self.null_value) => Ok(Value::Null),
            ColumnType::Binary => decode_hex(field).map(Value::Binary),
            _ if field.is_empty() => Ok(Value::Null),
            ColumnType::Datetime => self
                .time_format
                .parse(field, &self.time_location)
                .map(Value::Datetime),
            _ => Value::String(field.to_string())
                .coerce_to(column, &self.time_format, &self.time_location)
                .map_err(|e| Error::Malformed(e.to_string())),
        }
    }
}

fn decode_hex(text: &str) -> Result<Bytes> {
    if text.len() % 2 != 0 {
        return Err(Error::Malformed(format!("binary `{text}`: odd number of hex digits")));
    }
    text.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let high = char::from(pair[0]).to_digit(16);
            let low = char::from(pair[1]).to_digit(16);
            high.zip(low)
                .and_then(|(high, low)| u8::try_from((high << 4) | low).ok())
                .ok_or_else(|| Error::Malformed(format!("binary `{text}`: not hex")))
        })
        .collect::<Result<Vec<u8>>>()
        .map(Bytes::from)
}

/// Writes a result set in one external format.
///
/// Call order: `open` once, `add_row` per row in arrival order, `flush` at
/// will, `close` once. `close` releases the sink.
#[async_trait]
pub trait RowsEncoder: Send {
    /// MIME type of the produced bytes.
    fn content_type(&self) -> &str;

    /// Binds the column shape and writes any preamble.
    async fn open(&mut self, columns: &Columns) -> Result<()>;

    /// Writes one row.
    async fn add_row(&mut self, values: &[Value]) -> Result<()>;

    /// Pushes buffered output; `heading` re-emits the header first.
    async fn flush(&mut self, heading: bool) -> Result<()>;

    /// Writes any trailer and closes the sink.
    async fn close(&mut self) -> Result<()>;
}

/// Reads rows of one external format.
#[async_trait]
pub trait RowsDecoder: Send {
    /// Next row, or `None` at end of input. Errors mean the input is broken.
    async fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

/// Drains `rows` into `encoder`. Returns the number of rows written.
///
/// Every encoder call is raced against `ctx`, so a stalled sink gives up at
/// the deadline. The encoder and the cursor are closed whatever happens; the
/// first error wins.
pub async fn encode_rows<R, E>(ctx: &Context, rows: &mut R, encoder: &mut E) -> Result<u64>
where
    R: Rows + ?Sized,
    E: RowsEncoder + ?Sized,
{
    let written = async {
        ctx.run(encoder.open(rows.columns())).await?;
        let mut written: u64 = 0;
        while rows.next(ctx).await? {
            ctx.run(encoder.add_row(rows.values()?)).await?;
            written += 1;
        }
        ctx.run(encoder.flush(false)).await?;
        Ok::<_, Error>(written)
    }
    .await;

    let encoder_closed = encoder.close().await;
    let rows_closed = rows.close().await;
    let written = written?;
    encoder_closed?;
    rows_closed?;

    debug!(written, content_type = encoder.content_type(), "encoded rows");
    Ok(written)
}

/// Drains `decoder` into `appender` and closes the appender.
///
/// Reads and appends are raced against `ctx`. A decoding error stops the
/// pump; rows appended so far stay appended.
pub async fn decode_into<D, A>(
    ctx: &Context,
    decoder: &mut D,
    appender: &mut A,
) -> Result<AppendSummary>
where
    D: RowsDecoder + ?Sized,
    A: Appender + ?Sized,
{
    let pumped = async {
        loop {
            match ctx.run(decoder.next_row()).await? {
                Some(values) => ctx.run(appender.append(values)).await?,
                None => return Ok::<_, Error>(()),
            }
        }
    }
    .await;

    let closed = appender.close().await;
    match (pumped, closed) {
        (Ok(()), closed) => closed,
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(table = appender.table_name(), "appender close after decode error: {close_err}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::appender::TableType;
    use crate::column::Column;
    use crate::rows::RowCursor;

    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct VecRows {
        cursor: RowCursor,
        pending: std::vec::IntoIter<Vec<Value>>,
        closes: usize,
    }

    #[async_trait]
    impl Rows for VecRows {
        async fn next(&mut self, ctx: &Context) -> Result<bool> {
            ctx.check()?;
            let row = self.pending.next();
            self.cursor.advance(row)
        }

        fn values(&self) -> Result<&[Value]> {
            Ok(self.cursor.values()?)
        }

        async fn close(&mut self) -> Result<()> {
            self.cursor.close();
            self.closes += 1;
            Ok(())
        }

        fn is_fetchable(&self) -> bool {
            true
        }

        fn rows_affected(&self) -> u64 {
            0
        }

        fn message(&self) -> &str {
            ""
        }

        fn columns(&self) -> &Columns {
            self.cursor.columns()
        }
    }

    /// Tab separated lines.
    struct TsvEncoder<W: Sink> {
        ctx: EncoderContext<W>,
        columns: Columns,
        rows: u64,
        closed: bool,
    }

    impl<W: Sink> TsvEncoder<W> {
        fn new(ctx: EncoderContext<W>) -> Self {
            Self {
                ctx,
                columns: Columns::new(),
                rows: 0,
                closed: false,
            }
        }
    }

    impl TsvEncoder<Vec<u8>> {
        fn output(&self) -> String {
            String::from_utf8(self.ctx.sink.clone()).unwrap()
        }
    }

    #[async_trait]
    impl<W: Sink> RowsEncoder for TsvEncoder<W> {
        fn content_type(&self) -> &str {
            "text/tab-separated-values"
        }

        async fn open(&mut self, columns: &Columns) -> Result<()> {
            self.columns = columns.clone();
            if self.ctx.heading {
                self.flush(true).await?;
            }
            Ok(())
        }

        async fn add_row(&mut self, values: &[Value]) -> Result<()> {
            self.rows += 1;
            let mut fields: Vec<String> = values.iter().map(|v| self.ctx.format_value(v)).collect();
            if self.ctx.rownum {
                fields.insert(0, self.rows.to_string());
            }
            let line = fields.join("\t") + "\n";
            self.ctx.write(line.as_bytes()).await
        }

        async fn flush(&mut self, heading: bool) -> Result<()> {
            if heading {
                let line = self.ctx.header(&self.columns).join("\t") + "\n";
                self.ctx.write(line.as_bytes()).await?;
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            self.ctx.shutdown().await
        }
    }

    struct TsvDecoder<R: Source> {
        ctx: DecoderContext<R>,
        started: bool,
    }

    #[async_trait]
    impl<R: Source> RowsDecoder for TsvDecoder<R> {
        async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
            let mut line = String::new();
            if !self.started && self.ctx.header {
                self.ctx.source.read_line(&mut line).await?;
                line.clear();
            }
            self.started = true;
            if self.ctx.source.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            line.trim_end_matches('\n')
                .split('\t')
                .enumerate()
                .map(|(idx, field)| self.ctx.parse_field(idx, field))
                .collect::<Result<Vec<_>>>()
                .map(Some)
        }
    }

    struct CollectingAppender {
        columns: Columns,
        rows: Vec<Vec<Value>>,
        closed: bool,
    }

    #[async_trait]
    impl Appender for CollectingAppender {
        fn table_name(&self) -> &str {
            "events"
        }

        fn table_type(&self) -> TableType {
            TableType::Log
        }

        fn columns(&self) -> &Columns {
            &self.columns
        }

        async fn append(&mut self, values: Vec<Value>) -> Result<()> {
            crate::appender::check_arity(&self.columns, &values)?;
            self.rows.push(values);
            Ok(())
        }

        async fn append_with_timestamp(
            &mut self,
            _ts: chrono::DateTime<Utc>,
            values: Vec<Value>,
        ) -> Result<()> {
            self.append(values).await
        }

        async fn close(&mut self) -> Result<AppendSummary> {
            self.closed = true;
            Ok(AppendSummary {
                success: self.rows.len() as u64,
                fail: 0,
            })
        }
    }

    fn columns() -> Columns {
        Columns::from(vec![
            Column::new("name", ColumnType::String),
            Column::new("ts", ColumnType::Datetime),
            Column::new("value", ColumnType::Double),
        ])
    }

    fn sample_rows() -> Vec<Vec<Value>> {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap();
        vec![
            vec![Value::from("cpu"), Value::Datetime(ts), Value::Double(0.5)],
            vec![Value::from("mem"), Value::Datetime(ts), Value::Null],
        ]
    }

    #[tokio::test]
    async fn test_encode_rows_closes_both() {
        let ctx = Context::new();
        let mut rows = VecRows {
            cursor: RowCursor::new(columns()),
            pending: sample_rows().into_iter(),
            closes: 0,
        };
        let mut encoder = TsvEncoder::new(
            EncoderContext::new(Vec::new())
                .with_heading(true)
                .with_rownum(true)
                .with_precision(2)
                .with_time_format(TimeFormat::Rfc3339)
                .with_time_location(Tz::Asia__Seoul),
        );

        let written = encode_rows(&ctx, &mut rows, &mut encoder).await.unwrap();

        assert_eq!(written, 2);
        assert!(encoder.closed);
        assert_eq!(rows.closes, 1);
        assert_eq!(
            encoder.output(),
            "name\tts(Asia/Seoul)\tvalue\n\
             1\tcpu\t2024-03-01T21:30:15+09:00\t0.50\n\
             2\tmem\t2024-03-01T21:30:15+09:00\tNULL\n"
        );
    }

    #[tokio::test]
    async fn test_encode_rows_cancelled_still_closes() {
        let ctx = Context::new();
        ctx.cancel();
        let mut rows = VecRows {
            cursor: RowCursor::new(columns()),
            pending: sample_rows().into_iter(),
            closes: 0,
        };
        let mut encoder = TsvEncoder::new(EncoderContext::new(Vec::new()));

        let err = encode_rows(&ctx, &mut rows, &mut encoder).await.unwrap_err();

        assert!(matches!(err, Error::UserCancel));
        assert!(encoder.closed);
        assert_eq!(rows.closes, 1);
    }

    #[tokio::test]
    async fn test_decoder_reads_what_encoder_wrote() {
        let ctx = Context::new();
        let mut rows = VecRows {
            cursor: RowCursor::new(columns()),
            pending: sample_rows().into_iter(),
            closes: 0,
        };
        let format: TimeFormat = "%Y-%m-%d %H:%M:%S".parse().unwrap();
        let mut encoder = TsvEncoder::new(
            EncoderContext::new(Vec::new())
                .with_heading(true)
                .with_time_format(format.clone())
                .with_time_location(Tz::America__New_York),
        );
        encode_rows(&ctx, &mut rows, &mut encoder).await.unwrap();
        let bytes = encoder.ctx.sink.clone();

        let mut decoder = TsvDecoder {
            ctx: DecoderContext::new(bytes.as_slice(), columns())
                .with_header(true)
                .with_time_format(format)
                .with_time_location(Tz::America__New_York),
            started: false,
        };
        let mut appender = CollectingAppender {
            columns: columns(),
            rows: Vec::new(),
            closed: false,
        };

        let summary = decode_into(&ctx, &mut decoder, &mut appender).await.unwrap();

        assert_eq!(summary, AppendSummary { success: 2, fail: 0 });
        assert!(appender.closed);
        assert_eq!(appender.rows, sample_rows());
    }

    #[tokio::test]
    async fn test_malformed_input_is_error_not_end() {
        let ctx = Context::new();
        let input = b"cpu\tnot a time\t1.0\n".as_slice();
        let mut decoder = TsvDecoder {
            ctx: DecoderContext::new(input, columns()),
            started: false,
        };
        let mut appender = CollectingAppender {
            columns: columns(),
            rows: Vec::new(),
            closed: false,
        };

        let err = decode_into(&ctx, &mut decoder, &mut appender).await.unwrap_err();

        assert!(matches!(err, Error::Malformed(_)));
        assert!(appender.closed);
    }

    #[tokio::test]
    async fn test_empty_input_ends_cleanly() {
        let mut decoder = TsvDecoder {
            ctx: DecoderContext::new(b"".as_slice(), columns()),
            started: false,
        };
        assert!(decoder.next_row().await.unwrap().is_none());
        assert!(decoder.next_row().await.unwrap().is_none());
    }

    #[test]
    fn test_every_column_type_reads_back_as_written() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap();
        let cases = vec![
            (ColumnType::Int16, Value::Int16(-12)),
            (ColumnType::Int32, Value::Int32(70_000)),
            (ColumnType::Int64, Value::Int64(-9_000_000_000)),
            (ColumnType::Int8, Value::Int8(255)),
            (ColumnType::Float, Value::Float(0.5)),
            (ColumnType::Double, Value::Double(0.25)),
            (ColumnType::Datetime, Value::Datetime(ts)),
            (ColumnType::Ipv4, Value::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))),
            (
                ColumnType::Ipv6,
                Value::Ip(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))),
            ),
            (ColumnType::String, Value::from("cpu")),
            (ColumnType::String, Value::from("NULL")),
            (ColumnType::String, Value::from("")),
            (ColumnType::Binary, Value::Binary(Bytes::from_static(&[0xde, 0xad]))),
            (ColumnType::Binary, Value::Binary(Bytes::new())),
            (ColumnType::Bool, Value::Bool(true)),
        ];
        let columns = Columns::from(
            cases
                .iter()
                .enumerate()
                .map(|(idx, (column_type, _))| Column::new(format!("c{idx}"), *column_type))
                .collect::<Vec<_>>(),
        );
        let encoder = EncoderContext::new(Vec::new());
        let decoder = DecoderContext::new(b"".as_slice(), columns);

        for (idx, (column_type, value)) in cases.into_iter().enumerate() {
            let text = encoder.format_value(&value);
            let read = decoder.parse_field(idx, &text).unwrap();
            assert_eq!(read, value, "{column_type} written as `{text}`");
        }
    }

    #[test]
    fn test_null_text_is_null_outside_strings() {
        let columns = Columns::from(vec![
            Column::new("name", ColumnType::String),
            Column::new("value", ColumnType::Double),
            Column::new("payload", ColumnType::Binary),
        ]);
        let encoder = EncoderContext::new(Vec::new()).with_null_value("\\N");
        let decoder = DecoderContext::new(b"".as_slice(), columns).with_null_value("\\N");

        assert_eq!(encoder.format_value(&Value::Null), "\\N");
        assert_eq!(decoder.parse_field(1, "\\N").unwrap(), Value::Null);
        assert_eq!(decoder.parse_field(1, "").unwrap(), Value::Null);
        assert_eq!(decoder.parse_field(2, "\\N").unwrap(), Value::Null);
        assert_eq!(decoder.parse_field(0, "\\N").unwrap(), Value::from("\\N"));
        assert!(matches!(
            decoder.parse_field(1, "NULL").unwrap_err(),
            Error::Malformed(_)
        ));
    }

    #[test]
    fn test_bad_hex_is_malformed() {
        let columns = Columns::from(vec![Column::new("payload", ColumnType::Binary)]);
        let decoder = DecoderContext::new(b"".as_slice(), columns);

        assert_eq!(
            decoder.parse_field(0, "DEAD").unwrap(),
            Value::Binary(Bytes::from_static(&[0xde, 0xad]))
        );
        for field in ["abc", "zz", "+f", "\u{e9}"] {
            assert!(
                matches!(decoder.parse_field(0, field).unwrap_err(), Error::Malformed(_)),
                "{field}"
            );
        }
    }

    #[tokio::test]
    async fn test_stalled_source_gives_up_at_deadline() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut decoder = TsvDecoder {
            ctx: DecoderContext::new(BufReader::new(reader), columns()),
            started: false,
        };
        let mut appender = CollectingAppender {
            columns: columns(),
            rows: Vec::new(),
            closed: false,
        };
        let ctx = Context::with_timeout(Duration::from_millis(20));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            decode_into(&ctx, &mut decoder, &mut appender),
        )
        .await
        .expect("decode_into ignored the deadline");

        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(appender.closed);
        assert!(appender.rows.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_stalled_source() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut decoder = TsvDecoder {
            ctx: DecoderContext::new(BufReader::new(reader), columns()),
            started: false,
        };
        let mut appender = CollectingAppender {
            columns: columns(),
            rows: Vec::new(),
            closed: false,
        };
        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            decode_into(&ctx, &mut decoder, &mut appender),
        )
        .await
        .expect("decode_into ignored the cancel");

        assert!(matches!(result, Err(Error::UserCancel)));
        assert!(appender.closed);
    }

    #[tokio::test]
    async fn test_stalled_sink_gives_up_at_deadline() {
        // Nobody drains the reader, so the first row fills the pipe.
        let (writer, _reader) = tokio::io::duplex(8);
        let mut rows = VecRows {
            cursor: RowCursor::new(columns()),
            pending: sample_rows().into_iter(),
            closes: 0,
        };
        let mut encoder = TsvEncoder::new(EncoderContext::new(writer));
        let ctx = Context::with_timeout(Duration::from_millis(20));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            encode_rows(&ctx, &mut rows, &mut encoder),
        )
        .await
        .expect("encode_rows ignored the deadline");

        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(encoder.closed);
        assert_eq!(rows.closes, 1);
    }
}

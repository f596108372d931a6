//! Log redaction for patient identifiers.
//!
//! The scoring core never logs raw clinical values, only field names and
//! counts. Identifiers can still slip into log lines through error messages
//! or request metadata, so the binary wraps its log writer in
//! [`RedactingMakeWriter`], which scrubs every formatted line before it
//! reaches the sink.

use std::borrow::Cow;
use std::io::Write;
use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

/// Lines longer than this are cut before redaction.
const MAX_LINE_BYTES: usize = 16 * 1024;

struct Rules {
    set: RegexSet,
    patterns: Vec<(Regex, &'static str)>,
}

static RULES: OnceLock<Rules> = OnceLock::new();

fn rules() -> &'static Rules {
    RULES.get_or_init(|| {
        let table: [(&str, &'static str); 5] = [
            // Identifying key/value pairs: name=..., patient_id: ...
            (
                r#"(?i)\b(patient_name|patient_id|name|mrn)\b(\s*[:=]\s*)("[^"]*"|'[^']*'|\S+)"#,
                "$1$2[REDACTED]",
            ),
            (
                r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
                "[REDACTED-UUID]",
            ),
            (
                r"(?i)\b[a-z0-9._%+-]{1,64}@[a-z0-9.-]{1,253}\.[a-z]{2,}\b",
                "[REDACTED-EMAIL]",
            ),
            (
                r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b",
                "[REDACTED-PHONE]",
            ),
            (r"\bMRN\d{6,10}\b", "[REDACTED-MRN]"),
        ];

        let set = RegexSet::new(table.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let patterns = table
            .into_iter()
            .map(|(p, r)| (Regex::new(p).expect("Valid regex"), r))
            .collect();
        Rules { set, patterns }
    })
}

fn truncate(input: &str) -> (&str, bool) {
    if input.len() <= MAX_LINE_BYTES {
        return (input, false);
    }
    let mut end = MAX_LINE_BYTES;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Replace identifiers in `input`.
#[must_use]
pub fn redact(input: &str) -> Cow<'_, str> {
    let rules = rules();
    let (head, truncated) = truncate(input);

    let matched: Vec<usize> = rules.set.matches(head).into_iter().collect();
    if matched.is_empty() && !truncated {
        return Cow::Borrowed(input);
    }

    let mut out = head.to_string();
    for idx in matched {
        let (regex, replacement) = &rules.patterns[idx];
        out = regex.replace_all(&out, *replacement).into_owned();
    }
    if truncated {
        out.push_str(" [TRUNCATED]");
    }
    Cow::Owned(out)
}

/// `MakeWriter` that redacts each complete log line.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
}

impl<M> RedactingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            pending: Vec::new(),
        }
    }
}

/// Buffers output until a newline, then writes the redacted line.
pub struct RedactingWriter<W: Write> {
    inner: W,
    pending: Vec<u8>,
}

impl<W: Write> RedactingWriter<W> {
    fn emit(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        self.inner.write_all(redact(&text).as_bytes())
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line)?;
        }
        if self.pending.len() > MAX_LINE_BYTES * 2 {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

//! Status records and their fixed slot encoding.
//!
//! A [`StatusRecord`] is what a worker announces about itself. On its way into the shared
//! table it is flattened into a [`RawStatusRecord`], a fixed-layout struct that is moved as
//! machine words so that a one-sided put never needs to coordinate with the reader.

use std::borrow::Cow;
use std::ffi::CStr;
use std::mem;

use plain::Plain;

use crate::operation::OperationKind;

/// Bytes reserved for the source file name, NUL terminator included.
pub const FILE_CAPACITY: usize = 256;
/// Bytes reserved for the call-site text, NUL terminator included.
pub const CALL_SITE_CAPACITY: usize = 256;
/// Longest file name or call-site text a slot can hold.
pub const MAX_STORED_LEN: usize = FILE_CAPACITY - 1;

/// File name used for slots nobody has written yet.
pub const UNSET_FILE: &str = "-";

/// Whether a record was published right before or right after the wrapped call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entering,
    Completed,
}

impl Phase {
    /// Status word shown next to the elapsed time.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Entering => "started",
            Phase::Completed => "completed",
        }
    }
}

/// Where an instrumented call was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub file: Cow<'static, str>,
    pub line: u32,
    pub text: Cow<'static, str>,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32, text: &'static str) -> Self {
        CallSite {
            file: Cow::Borrowed(file),
            line,
            text: Cow::Borrowed(text),
        }
    }

    /// Call site of whoever called this function, with the given text.
    #[track_caller]
    pub fn caller(text: impl Into<Cow<'static, str>>) -> Self {
        let location = std::panic::Location::caller();
        CallSite {
            file: Cow::Borrowed(location.file()),
            line: location.line(),
            text: text.into(),
        }
    }
}

/// Build a [`CallSite`] for the current source location.
///
/// With arguments, the tokens are stringified into the call-site text.
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::record::CallSite::new(file!(), line!(), "")
    };
    ($($text:tt)+) => {
        $crate::record::CallSite::new(file!(), line!(), stringify!($($text)+))
    };
}

/// Maximum stored lengths for the free-text fields of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    pub max_file_len: usize,
    pub max_call_site_len: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        FieldLimits {
            max_file_len: MAX_STORED_LEN,
            max_call_site_len: MAX_STORED_LEN,
        }
    }
}

/// One worker's most recent announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub operation: OperationKind,
    pub phase: Phase,
    pub source_file: String,
    pub source_line: u32,
    /// Seconds on the transport's monotonic clock.
    pub timestamp: f64,
    pub call_site_text: String,
    /// Reserved, never populated.
    pub bytes_sent: u64,
    /// Reserved, never populated.
    pub bytes_received: u64,
}

impl StatusRecord {
    pub fn new(
        operation: OperationKind,
        phase: Phase,
        site: &CallSite,
        timestamp: f64,
        limits: &FieldLimits,
    ) -> Self {
        StatusRecord {
            operation,
            phase,
            source_file: truncated(&site.file, limits.max_file_len),
            source_line: site.line,
            timestamp,
            call_site_text: truncated(&site.text, limits.max_call_site_len),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// The value every slot holds before its worker publishes anything.
    pub fn uninitialized(timestamp: f64) -> Self {
        StatusRecord {
            operation: OperationKind::Uninitialized,
            phase: Phase::Completed,
            source_file: UNSET_FILE.to_string(),
            source_line: 0,
            timestamp,
            call_site_text: String::new(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// `file:line` as shown in the *Where* column.
    pub fn location(&self) -> String {
        format!("{}:{}", self.source_file, self.source_line)
    }

    pub fn is_finalized(&self) -> bool {
        self.operation == OperationKind::Finalized
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncated(s: &str, max: usize) -> String {
    let max = max.min(MAX_STORED_LEN);
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Fixed layout of one status slot. No implicit padding: every field is naturally aligned.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawStatusRecord {
    pub operation: u32,
    pub phase: u32,
    pub line: u32,
    pub reserved: u32,
    pub timestamp: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub file: [u8; FILE_CAPACITY],
    pub call_site: [u8; CALL_SITE_CAPACITY],
}

unsafe impl Plain for RawStatusRecord {}

impl Default for RawStatusRecord {
    fn default() -> Self {
        RawStatusRecord {
            operation: 0,
            phase: 0,
            line: 0,
            reserved: 0,
            timestamp: 0.0,
            bytes_sent: 0,
            bytes_received: 0,
            file: [0; FILE_CAPACITY],
            call_site: [0; CALL_SITE_CAPACITY],
        }
    }
}

/// Size of one slot in 64-bit words.
pub const SLOT_WORDS: usize = mem::size_of::<RawStatusRecord>() / 8;

const _: () = assert!(mem::size_of::<RawStatusRecord>() == 552);
const _: () = assert!(mem::size_of::<RawStatusRecord>() % 8 == 0);

const PHASE_ENTERING: u32 = 1;
const PHASE_COMPLETED: u32 = 0;

fn copy_c_string(dst: &mut [u8], src: &str) {
    let len = src.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&src.as_bytes()[..len]);
    dst[len..].fill(0);
}

fn parse_c_string(raw: &[u8]) -> String {
    match CStr::from_bytes_until_nul(raw) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

impl From<&StatusRecord> for RawStatusRecord {
    fn from(record: &StatusRecord) -> Self {
        let mut raw = RawStatusRecord {
            operation: record.operation.code(),
            phase: match record.phase {
                Phase::Entering => PHASE_ENTERING,
                Phase::Completed => PHASE_COMPLETED,
            },
            line: record.source_line,
            timestamp: record.timestamp,
            bytes_sent: record.bytes_sent,
            bytes_received: record.bytes_received,
            ..RawStatusRecord::default()
        };
        copy_c_string(&mut raw.file, &record.source_file);
        copy_c_string(&mut raw.call_site, &record.call_site_text);
        raw
    }
}

impl From<&RawStatusRecord> for StatusRecord {
    fn from(raw: &RawStatusRecord) -> Self {
        StatusRecord {
            // A slot read mid-write can mix two records; an unknown code shows as unset.
            operation: OperationKind::from_code(raw.operation)
                .unwrap_or(OperationKind::Uninitialized),
            phase: if raw.phase == PHASE_ENTERING {
                Phase::Entering
            } else {
                Phase::Completed
            },
            source_file: parse_c_string(&raw.file),
            source_line: raw.line,
            timestamp: raw.timestamp,
            call_site_text: parse_c_string(&raw.call_site),
            bytes_sent: raw.bytes_sent,
            bytes_received: raw.bytes_received,
        }
    }
}

impl RawStatusRecord {
    /// Flatten into the words a put moves.
    pub fn to_words(&self) -> [u64; SLOT_WORDS] {
        // SAFETY: repr(C) with no padding bytes, so every byte is initialized.
        let bytes = unsafe { plain::as_bytes(self) };
        let mut words = [0u64; SLOT_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_ne_bytes(buf);
        }
        words
    }

    pub fn from_words(words: &[u64]) -> Result<Self, plain::Error> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();
        let mut raw = RawStatusRecord::default();
        plain::copy_from_bytes(&mut raw, &bytes)?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusRecord {
        StatusRecord::new(
            OperationKind::Ssend,
            Phase::Entering,
            &CallSite::new("src/job.rs", 42, "&buffer, 1, peer, 0"),
            12.5,
            &FieldLimits::default(),
        )
    }

    #[test]
    fn test_slot_words() {
        assert_eq!(SLOT_WORDS, 69);
    }

    #[test]
    fn test_uninitialized_defaults() {
        let record = StatusRecord::uninitialized(3.0);
        assert_eq!(record.operation, OperationKind::Uninitialized);
        assert_eq!(record.phase, Phase::Completed);
        assert_eq!(record.location(), "-:0");
        assert_eq!(record.phase.label(), "completed");
    }

    #[test]
    fn test_raw_conversion_preserves_record() {
        let record = sample();
        let raw = RawStatusRecord::from(&record);
        let words = raw.to_words();
        let decoded = RawStatusRecord::from_words(&words).unwrap();
        assert_eq!(StatusRecord::from(&decoded), record);
    }

    #[test]
    fn test_from_words_too_short() {
        assert!(RawStatusRecord::from_words(&[0u64; SLOT_WORDS - 1]).is_err());
    }

    #[test]
    fn test_unknown_code_reads_as_uninitialized() {
        let mut raw = RawStatusRecord::from(&sample());
        raw.operation = 9999;
        let record = StatusRecord::from(&raw);
        assert_eq!(record.operation, OperationKind::Uninitialized);
        assert_eq!(record.source_line, 42);
    }

    #[test]
    fn test_truncation_is_silent() {
        let long = "x".repeat(1000);
        let site = CallSite {
            file: Cow::Owned(long.clone()),
            line: 1,
            text: Cow::Owned(long),
        };
        let limits = FieldLimits {
            max_file_len: 10,
            max_call_site_len: 20,
        };
        let record = StatusRecord::new(OperationKind::Recv, Phase::Completed, &site, 0.0, &limits);
        assert_eq!(record.source_file.len(), 10);
        assert_eq!(record.call_site_text.len(), 20);
    }

    #[test]
    fn test_truncation_never_exceeds_slot() {
        let site = CallSite {
            file: Cow::Owned("f".repeat(400)),
            line: 1,
            text: Cow::Borrowed(""),
        };
        let limits = FieldLimits {
            max_file_len: 4096,
            max_call_site_len: 4096,
        };
        let record = StatusRecord::new(OperationKind::Recv, Phase::Completed, &site, 0.0, &limits);
        assert_eq!(record.source_file.len(), MAX_STORED_LEN);
        let decoded = StatusRecord::from(&RawStatusRecord::from(&record));
        assert_eq!(decoded.source_file, record.source_file);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 'é' is two bytes; cutting at 3 would split the second one.
        assert_eq!(truncated("éé", 3), "é");
        assert_eq!(truncated("abc", 3), "abc");
        assert_eq!(truncated("", 0), "");
    }

    #[test]
    fn test_call_site_macro() {
        let site = call_site!(comm.ssend(1, 0));
        assert!(site.file.ends_with("record.rs"));
        assert!(site.line > 0);
        assert!(site.text.contains("ssend"));

        let bare = call_site!();
        assert_eq!(bare.text, "");
    }

    #[test]
    fn test_caller_location() {
        let site = CallSite::caller("here");
        assert!(site.file.ends_with("record.rs"));
        assert_eq!(site.text, "here");
    }
}

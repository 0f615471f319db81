//! Text rendering of a table snapshot.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::record::StatusRecord;

/// Erase the display, then home the cursor.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[1;1H";

const WHO: &str = "Who";
const WHAT: &str = "What";
const WHERE: &str = "Where";
const WHEN: &str = "When";

/// Width of the status word in front of the elapsed time, plus its trailing space.
const STATUS_WIDTH: usize = 10;

/// How long ago `timestamp` was, as shown in the *When* column.
pub fn when_text(now: f64, timestamp: f64) -> String {
    let elapsed = (now - timestamp).abs();
    if elapsed > 0.01 {
        format!("{:.2}s ago", elapsed)
    } else {
        "just now".to_string()
    }
}

/// First line of a frame.
pub fn runtime_line(runtime: f64) -> String {
    let prefix = if runtime < 0.01 { "<" } else { "" };
    format!("Runtime: {}{:.2} seconds", prefix, runtime)
}

struct Row {
    what: &'static str,
    place: String,
    status: &'static str,
    when: String,
}

fn separator(out: &mut String, what: usize, place: usize, when: usize) {
    let _ = writeln!(
        out,
        "+-----+-{}-+-{}-+-{}-----------+",
        "-".repeat(what),
        "-".repeat(place),
        "-".repeat(when)
    );
}

/// Lay out one frame: runtime, then one row per rank in rank order.
///
/// `now` and every record timestamp are on the same clock; `runtime` is how long the monitor
/// has been running.
pub fn render_frame(records: &[StatusRecord], now: f64, runtime: f64) -> String {
    let rows: Vec<Row> = records
        .iter()
        .map(|record| Row {
            what: record.operation.name(),
            place: record.location(),
            status: record.phase.label(),
            when: when_text(now, record.timestamp),
        })
        .collect();

    let what_width = rows.iter().map(|r| r.what.len()).fold(WHAT.len(), usize::max);
    let place_width = rows.iter().map(|r| r.place.len()).fold(WHERE.len(), usize::max);
    let when_width = rows.iter().map(|r| r.when.len()).max().unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "{}", runtime_line(runtime));
    separator(&mut out, what_width, place_width, when_width);
    let _ = writeln!(
        out,
        "| {:>3} | {:>w1$} | {:>w2$} | {:>w3$} |",
        WHO,
        WHAT,
        WHERE,
        WHEN,
        w1 = what_width,
        w2 = place_width,
        w3 = when_width + STATUS_WIDTH,
    );
    separator(&mut out, what_width, place_width, when_width);
    for (rank, row) in rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {:>3} | {:>w1$} | {:>w2$} | {:>9} {:>w3$} |",
            rank,
            row.what,
            row.place,
            row.status,
            row.when,
            w1 = what_width,
            w2 = place_width,
            w3 = when_width,
        );
    }
    separator(&mut out, what_width, place_width, when_width);
    out
}

/// Write a rendered frame, optionally clearing the display first.
pub fn write_frame<W: Write + ?Sized>(out: &mut W, frame: &str, clear: bool) -> io::Result<()> {
    if clear {
        out.write_all(CLEAR_SCREEN.as_bytes())?;
    }
    out.write_all(frame.as_bytes())?;
    out.flush()
}

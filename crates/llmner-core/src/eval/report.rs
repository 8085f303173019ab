//! Plain-text rendering of evaluation rows.

use std::fmt::Write;

use super::metrics::LabelMetrics;

const HEADERS: [&str; 4] = ["precision", "recall", "f1-score", "support"];
const LONGEST_AVG: &str = "weighted avg";

/// Render per-label rows followed by the average rows, column-aligned the
/// same way seqeval's `classification_report` does.
pub(crate) fn render(rows: &[LabelMetrics], averages: &[LabelMetrics], digits: usize) -> String {
    let name_width = rows.iter().map(|r| r.label.len()).max().unwrap_or(0);
    let width = name_width.max(LONGEST_AVG.len()).max(digits);

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write!(out, "{:>width$} ", "");
    for h in HEADERS {
        let _ = write!(out, " {h:>9}");
    }
    out.push_str("\n\n");

    for row in rows {
        push_row(&mut out, row, width, digits);
    }
    out.push('\n');
    for row in averages {
        push_row(&mut out, row, width, digits);
    }
    out
}

fn push_row(out: &mut String, row: &LabelMetrics, width: usize, digits: usize) {
    let _ = writeln!(
        out,
        "{:>width$}  {:>9.digits$} {:>9.digits$} {:>9.digits$} {:>9}",
        row.label, row.precision, row.recall, row.f1_score, row.support
    );
}

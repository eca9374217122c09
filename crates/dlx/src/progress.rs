// AI
//! 📊 Progress: how far through the export are we, and how fast is it going.
//!
//! Two views of the same run. While it runs, [`ProgressMetrics`] drives an indicatif
//! bar over the compressed bytes of the object, with a small comfy-table of rates
//! underneath. When it ends, [`report_table`] renders the [`RunReport`] as a table
//! for humans. The JSON report is for machines; this one is for the person watching.
//!
//! ⚠️ Watching the bar will not make the table accept writes any faster.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::report::RunReport;

const MIB: u64 = 1024 * 1024;
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 Bytes in the unit that suits the object's size.
///
/// The unit is picked from `scale` (the whole object), not from `bytes`, so the
/// "read / total" pair on the bar always shares one unit and the numerator does
/// not hop from bytes to KiB to MiB as the run goes on.
///
/// - under 1 MiB objects: raw bytes, `"812 bytes"`
/// - 1 MiB up to 512 MiB: `"2048.00 KiB"`
/// - bigger than that: `"1.00 MiB"` (a typical export lands here)
fn format_bytes(bytes: u64, scale: u64) -> String {
    if scale >= 512 * MIB {
        // -- 🚀 big export. the table is going to be busy for a while.
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if scale >= MIB {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        // -- 🐛 a test fixture, or a very quiet day for the exporter
        format!("{} bytes", bytes)
    }
}

/// 🔢 Thousands separators for the record counters: `1234567` → `1,234,567`.
///
/// Counters climb into the millions on a real export, and "41000123 records"
/// takes a second look to read where "41,000,123 records" does not.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    // -- one comma per three digits, so reserve for them up front
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Elapsed and remaining time as `MM:SS`, growing an hours column (`HH:MM:SS`)
/// only when a run actually takes that long.
///
/// Sub-second precision is dropped: the bar redraws per batch, and a timer that
/// flickers through milliseconds is noise.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    records_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Live progress for one run.
///
/// Progress is measured in compressed bytes read against the object's advertised
/// size. With no advertised size the bar stays hidden and only the log lines remain.
pub(crate) struct ProgressMetrics {
    label: String,
    total_size: u64,
    bytes_read: u64,
    records: u64,
    written: u64,
    progress_bar: ProgressBar,
    // (when, bytes_read, records) samples inside the rate window
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_size", &self.total_size)
            .field("bytes_read", &self.bytes_read)
            .field("records", &self.records)
            .field("written", &self.written)
            .finish()
    }
}

impl ProgressMetrics {
    pub(crate) fn new(label: String, total_size: Option<u64>) -> Self {
        let progress_bar = match total_size {
            Some(size) if size > 0 => {
                let bar = ProgressBar::new(size);
                if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
                    bar.set_style(style.progress_chars("=>-"));
                }
                bar
            }
            _ => ProgressBar::hidden(),
        };

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            label,
            total_size: total_size.unwrap_or(0),
            bytes_read: 0,
            records: 0,
            written: 0,
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    /// 🔄 Record the run's running totals after a batch goes out.
    pub(crate) fn update(&mut self, bytes_read: u64, records: u64, written: u64) {
        self.bytes_read = bytes_read;
        self.records = records;
        self.written = written;

        let rates = self.calculate_rates();
        self.render(rates);
        self.progress_bar.set_position(self.bytes_read);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.bytes_read, self.records));

        if let Some(&(oldest_time, oldest_bytes, oldest_records)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.bytes_read.saturating_sub(oldest_bytes);
                let records_delta = self.records.saturating_sub(oldest_records);
                return Rates {
                    records_per_sec: records_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                };
            }
        }
        Rates {
            records_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    fn render(&self, rates: Rates) {
        let percent = if self.total_size > 0 {
            (self.bytes_read as f64 / self.total_size as f64) * 100.0
        } else {
            0.0
        };
        let elapsed = self.start_time.elapsed();
        let remaining = if percent > 0.0 {
            // linear extrapolation over compressed bytes
            let remaining_secs = elapsed.as_secs_f64() / (percent / 100.0) - elapsed.as_secs_f64();
            if remaining_secs > 0.0 {
                format_duration(Duration::from_secs_f64(remaining_secs))
            } else {
                "--:--".to_string()
            }
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} records/s", format_number(rates.records_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} read, {} written",
                format_number(self.records),
                format_number(self.written)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {}",
                format_bytes(self.bytes_read, self.total_size),
                format_bytes(self.total_size, self.total_size)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} remaining ({:.2}%)", remaining, percent))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.label, table));
    }
}

/// 📋 The finished report as a two-column table, for stderr.
pub fn report_table(report: &RunReport) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let outcome = if report.success {
        "✅ success"
    } else if report.cancelled {
        "🛑 cancelled"
    } else {
        "💀 failed"
    };
    let mut rows = vec![
        ("outcome", outcome.to_string()),
        ("file size", format_bytes(report.file_size_bytes, report.file_size_bytes)),
        ("bytes read", format_bytes(report.bytes_read, report.file_size_bytes)),
        ("records processed", format_number(report.records_processed)),
        ("records written", format_number(report.records_written)),
        ("batches written", format_number(report.batches_written)),
        ("retry attempts", format_number(report.retry_attempts)),
        (
            "elapsed",
            format_duration(Duration::from_millis(report.execution_time_ms)),
        ),
    ];
    if let Some(error) = &report.error {
        rows.push(("error", error.clone()));
    }
    for (name, value) in rows {
        table.add_row(vec![
            Cell::new(name).set_alignment(CellAlignment::Right),
            Cell::new(value),
        ]);
    }
    table.to_string()
}

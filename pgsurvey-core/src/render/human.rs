//! Narrative text report for people.

use super::{Encoder, write_error};
use crate::Result;
use crate::models::{Backend, Report};
use chrono::{DateTime, Utc};
use std::io::{self, Write};

/// Renders a report as aligned text sections. Empty sections are skipped.
#[derive(Debug, Clone, Copy)]
pub struct HumanEncoder {
    too_long_secs: u32,
}

impl HumanEncoder {
    /// Transactions open longer than `too_long_secs` are called out.
    pub const fn new(too_long_secs: u32) -> Self {
        Self { too_long_secs }
    }

    fn is_too_long(&self, report: &Report, backend: &Backend) -> bool {
        backend.xact_start > 0
            && report.metadata.at.saturating_sub(backend.xact_start) > i64::from(self.too_long_secs)
    }

    fn write_report(&self, report: &Report, out: &mut dyn Write) -> io::Result<()> {
        let meta = &report.metadata;
        write!(out, "\npgsurvey run at: {}", timestamp(meta.at))?;
        if !meta.user_agent.is_empty() {
            write!(out, " (by {})", meta.user_agent)?;
        }
        writeln!(out, "\n")?;

        writeln!(out, "PostgreSQL Cluster:")?;
        field(out, "Server Version", &report.server.version)?;
        field(out, "Server Started", &timestamp(report.server.start_time))?;
        field(out, "In Recovery?", yes_no(report.server.is_in_recovery))?;
        field(out, "Collected As", &meta.username)?;
        field(out, "Connection", if meta.local { "local socket" } else { "TCP" })?;
        if !meta.collected_dbs.is_empty() {
            field(out, "Databases Visited", &meta.collected_dbs.join(", "))?;
        }

        if !report.settings.is_empty() {
            writeln!(out, "\nSettings:")?;
            for (name, setting) in &report.settings {
                match &setting.unit {
                    Some(unit) => writeln!(out, "    {name} = {} ({unit})", setting.setting)?,
                    None => writeln!(out, "    {name} = {}", setting.setting)?,
                }
            }
        }

        if !report.databases.is_empty() {
            let rows = report
                .databases
                .iter()
                .map(|d| {
                    vec![
                        d.name.clone(),
                        d.num_backends.to_string(),
                        d.xact_commit.to_string(),
                        d.xact_rollback.to_string(),
                        hit_ratio(d.blks_hit, d.blks_read),
                        d.deadlocks.to_string(),
                        size(d.size),
                    ]
                })
                .collect();
            section(
                out,
                "Databases",
                &["Name", "Backends", "Commits", "Rollbacks", "Cache Hits", "Deadlocks", "Size"],
                rows,
            )?;
        }

        if !report.backends.is_empty() {
            let rows = report
                .backends
                .iter()
                .map(|b| {
                    vec![
                        b.pid.to_string(),
                        b.db_name.clone(),
                        b.role_name.clone(),
                        b.application_name.clone(),
                        b.state.clone(),
                        self.transaction_age(report, b),
                    ]
                })
                .collect();
            section(
                out,
                "Backends",
                &["PID", "Database", "User", "Application", "State", "Transaction Age"],
                rows,
            )?;

            let long: Vec<&Backend> = report
                .backends
                .iter()
                .filter(|b| self.is_too_long(report, b))
                .collect();
            if !long.is_empty() {
                writeln!(
                    out,
                    "\nTransactions open longer than {} seconds:",
                    self.too_long_secs
                )?;
                for b in long {
                    writeln!(
                        out,
                        "    pid {} ({}@{}), started {}: {}",
                        b.pid,
                        b.role_name,
                        b.db_name,
                        timestamp(b.xact_start),
                        b.query
                    )?;
                }
            }
        }

        if !report.tables.is_empty() {
            let rows = report
                .tables
                .iter()
                .map(|t| {
                    vec![
                        format!("{}.{}.{}", t.db_name, t.schema_name, t.name),
                        t.seq_scan.to_string(),
                        t.idx_scan.to_string(),
                        t.n_live_tup.to_string(),
                        t.n_dead_tup.to_string(),
                        timestamp(t.last_vacuum.max(t.last_autovacuum)),
                        size(t.size),
                    ]
                })
                .collect();
            section(
                out,
                "Tables",
                &[
                    "Table",
                    "Seq Scans",
                    "Index Scans",
                    "Live Rows",
                    "Dead Rows",
                    "Last Vacuum",
                    "Size",
                ],
                rows,
            )?;
        }

        if !report.indexes.is_empty() {
            let rows = report
                .indexes
                .iter()
                .map(|i| {
                    vec![
                        format!("{}.{}.{}", i.db_name, i.schema_name, i.name),
                        i.table_name.clone(),
                        i.idx_scan.to_string(),
                        i.idx_tup_read.to_string(),
                        size(i.size),
                    ]
                })
                .collect();
            section(out, "Indexes", &["Index", "Table", "Scans", "Rows Read", "Size"], rows)?;

            for definition in report.indexes.iter().filter_map(|i| i.definition.as_ref()) {
                writeln!(out, "    {definition}")?;
            }
        }

        if !report.sequences.is_empty() {
            let rows = report
                .sequences
                .iter()
                .map(|s| {
                    vec![
                        format!("{}.{}.{}", s.db_name, s.schema_name, s.name),
                        hit_ratio(s.blks_hit, s.blks_read),
                    ]
                })
                .collect();
            section(out, "Sequences", &["Sequence", "Cache Hits"], rows)?;
        }

        if !report.user_functions.is_empty() {
            let rows = report
                .user_functions
                .iter()
                .map(|f| {
                    vec![
                        format!("{}.{}.{}", f.db_name, f.schema_name, f.name),
                        f.calls.to_string(),
                        format!("{} ms", f.total_time_ms),
                        format!("{} ms", f.self_time_ms),
                    ]
                })
                .collect();
            section(out, "Functions", &["Function", "Calls", "Total Time", "Self Time"], rows)?;
        }

        if !report.extensions.is_empty() {
            let rows = report
                .extensions
                .iter()
                .map(|e| {
                    vec![
                        e.db_name.clone(),
                        e.name.clone(),
                        e.installed_version.clone(),
                        e.schema_name.clone(),
                        e.comment.clone(),
                    ]
                })
                .collect();
            section(
                out,
                "Extensions",
                &["Database", "Name", "Version", "Schema", "Comment"],
                rows,
            )?;
        }

        if !report.triggers.is_empty() {
            let rows = report
                .triggers
                .iter()
                .map(|t| {
                    vec![
                        t.db_name.clone(),
                        format!("{}.{}", t.schema_name, t.table_name),
                        t.name.clone(),
                        t.proc_name.clone(),
                    ]
                })
                .collect();
            section(out, "Triggers", &["Database", "Table", "Trigger", "Function"], rows)?;
        }

        if !report.statements.is_empty() {
            let rows = report
                .statements
                .iter()
                .map(|s| {
                    vec![
                        s.db_name.clone(),
                        s.role_name.clone(),
                        s.calls.to_string(),
                        format!("{} ms", s.total_time_ms),
                        s.rows.to_string(),
                        one_line(&s.query),
                    ]
                })
                .collect();
            section(
                out,
                "Statements",
                &["Database", "User", "Calls", "Total Time", "Rows", "Query"],
                rows,
            )?;
        }

        if !report.warnings.is_empty() {
            writeln!(out, "\nWarnings:")?;
            for warning in &report.warnings {
                writeln!(out, "    - {warning}")?;
            }
        }

        writeln!(out)
    }

    fn transaction_age(&self, report: &Report, backend: &Backend) -> String {
        if backend.xact_start <= 0 {
            return String::new();
        }
        let age = report.metadata.at.saturating_sub(backend.xact_start);
        if self.is_too_long(report, backend) {
            format!("{age}s (too long)")
        } else {
            format!("{age}s")
        }
    }
}

impl Encoder for HumanEncoder {
    fn format_name(&self) -> &'static str {
        "human"
    }

    fn encode(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        self.write_report(report, out)
            .map_err(|e| write_error("human-readable text", e))
    }
}

fn field(out: &mut dyn Write, label: &str, value: &str) -> io::Result<()> {
    writeln!(out, "    {:<20} {}", format!("{label}:"), value)
}

/// Writes a titled table with columns padded to their widest cell.
fn section(
    out: &mut dyn Write,
    title: &str,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> io::Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    writeln!(out, "\n{title}:")?;
    let header: Vec<String> = headers.iter().map(|h| (*h).to_string()).collect();
    write_row(out, &widths, &header)?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &widths, &rule)?;
    for row in &rows {
        write_row(out, &widths, row)?;
    }
    Ok(())
}

fn write_row(out: &mut dyn Write, widths: &[usize], cells: &[String]) -> io::Result<()> {
    let line: Vec<String> = widths
        .iter()
        .zip(cells)
        .map(|(width, cell)| format!("{cell:<width$}"))
        .collect();
    writeln!(out, "    {}", line.join("  ").trim_end())
}

fn timestamp(secs: i64) -> String {
    if secs <= 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map_or_else(|| secs.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn hit_ratio(hit: i64, read: i64) -> String {
    let total = hit.saturating_add(read);
    if total <= 0 {
        return String::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = hit as f64 * 100.0 / total as f64;
    format!("{ratio:.1}%")
}

fn size(bytes: Option<i64>) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    let Some(bytes) = bytes else {
        return String::new();
    };
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = UNITS[0];
    for next in UNITS.into_iter().skip(1) {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    if unit == "B" {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {unit}")
    }
}

fn one_line(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Rendering: write aggregated groups to an output sink.
//!
//! Layout only changes presentation. Groups and members are written in the
//! order the aggregator produced them.

use std::io::{self, Write};

use jiff::Timestamp;
use serde::Serialize;

use crate::model::{Record, Status, SubjectKind};

use super::aggregate::Groups;

/// How the report is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// A header per group followed by its members.
    #[default]
    List,
    /// One aligned table, one row per record.
    Table,
    /// Pretty JSON array of groups.
    Json,
}

/// A per-record cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Status,
    Collection,
    Number,
    Author,
    Title,
    Link,
    Tag,
    Released,
    Age,
    Kind,
}

impl Column {
    fn heading(self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::Collection => "REPOSITORY",
            Self::Number => "NUMBER",
            Self::Author => "AUTHOR",
            Self::Title => "TITLE",
            Self::Link => "LINK",
            Self::Tag => "TAG",
            Self::Released => "RELEASED",
            Self::Age => "AGE",
            Self::Kind => "KIND",
        }
    }

    fn cell(self, record: &Record, now: Timestamp) -> String {
        match self {
            Self::Status => match record.status {
                Status::Unknown => "-".to_string(),
                status => status.to_string(),
            },
            Self::Collection => record.collection().to_string(),
            Self::Number => record.number().map(|n| format!("#{n}")).unwrap_or_default(),
            Self::Author => record.author.clone().unwrap_or_default(),
            Self::Title => truncate(&record.title, TITLE_WIDTH),
            Self::Link => record.url.clone(),
            Self::Tag => record
                .release
                .as_ref()
                .map_or_else(|| "-".to_string(), |r| r.tag.clone()),
            Self::Released => released_at(record).map_or_else(
                || "-".to_string(),
                |date| date.strftime("%Y-%m-%d %H:%M UTC").to_string(),
            ),
            Self::Age => released_at(record)
                .or(record.created_at)
                .map_or_else(|| "-".to_string(), |date| relative_age(date, now)),
            Self::Kind => kind_marker(record.kind).to_string(),
        }
    }
}

const TITLE_WIDTH: usize = 60;

fn released_at(record: &Record) -> Option<Timestamp> {
    record.release.as_ref().and_then(|r| r.date)
}

/// `[i]` for issues, `[p]` for pull requests, `[r]` for releases.
pub fn kind_marker(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Issue => "[i]",
        SubjectKind::PullRequest => "[p]",
        SubjectKind::Release => "[r]",
        SubjectKind::Repository => "",
    }
}

/// Whole days between `then` and `now`, rounded to nearest.
///
/// Under half a day is "< 12 hours", under a day and a half is "< 24 hours".
pub fn relative_age(then: Timestamp, now: Timestamp) -> String {
    const DAY: i64 = 24 * 60 * 60;
    let seconds = now.as_second() - then.as_second();
    let days = (seconds + DAY / 2).div_euclid(DAY);
    match days {
        ..=0 => "< 12 hours".to_string(),
        1 => "< 24 hours".to_string(),
        n => format!("{n} days ago"),
    }
}

/// Cut `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

/// What a report shows and how.
#[derive(Debug, Clone)]
pub struct View {
    /// Banner line above the report.
    pub heading: String,
    /// Name of the grouping key, used as the first table column.
    pub group_label: &'static str,
    pub columns: Vec<Column>,
    pub layout: Layout,
}

#[derive(Serialize)]
struct JsonGroup<'a> {
    key: &'a str,
    members: &'a [Record],
}

/// Write the groups in the view's layout. `now` anchors relative ages.
pub fn render(w: &mut impl Write, groups: &Groups, view: &View, now: Timestamp) -> io::Result<()> {
    match view.layout {
        Layout::Json => render_json(w, groups),
        Layout::List => {
            banner(w, &view.heading)?;
            render_list(w, groups, view, now)?;
            footer(w, groups)
        }
        Layout::Table => {
            banner(w, &view.heading)?;
            render_table(w, groups, view, now)?;
            footer(w, groups)
        }
    }
}

fn banner(w: &mut impl Write, heading: &str) -> io::Result<()> {
    writeln!(w, "------")?;
    writeln!(w, "{heading}")?;
    writeln!(w, "------")?;
    writeln!(w)
}

fn footer(w: &mut impl Write, groups: &Groups) -> io::Result<()> {
    writeln!(w, "Total count: {}", groups.record_count())
}

fn render_list(w: &mut impl Write, groups: &Groups, view: &View, now: Timestamp) -> io::Result<()> {
    for group in groups {
        writeln!(w, "{} ({})", group.key, group.members.len())?;
        let rows: Vec<Vec<String>> = group
            .members
            .iter()
            .map(|r| view.columns.iter().map(|c| c.cell(r, now)).collect())
            .collect();
        write_aligned(w, "  - ", &rows)?;
        writeln!(w)?;
    }
    Ok(())
}

fn render_table(
    w: &mut impl Write,
    groups: &Groups,
    view: &View,
    now: Timestamp,
) -> io::Result<()> {
    let mut rows = vec![
        std::iter::once(view.group_label.to_string())
            .chain(view.columns.iter().map(|c| c.heading().to_string()))
            .collect::<Vec<_>>(),
    ];
    for group in groups {
        for record in &group.members {
            rows.push(
                std::iter::once(group.key.clone())
                    .chain(view.columns.iter().map(|c| c.cell(record, now)))
                    .collect(),
            );
        }
    }
    write_aligned(w, "", &rows)?;
    writeln!(w)
}

fn render_json(w: &mut impl Write, groups: &Groups) -> io::Result<()> {
    let groups: Vec<JsonGroup<'_>> = groups
        .iter()
        .map(|g| JsonGroup {
            key: &g.key,
            members: &g.members,
        })
        .collect();
    serde_json::to_writer_pretty(&mut *w, &groups)?;
    writeln!(w)
}

/// Write rows with every column padded to its widest cell. The last column is not padded.
fn write_aligned(w: &mut impl Write, prefix: &str, rows: &[Vec<String>]) -> io::Result<()> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    for row in rows {
        let mut line = String::from(prefix);
        for (i, cell) in row.iter().enumerate() {
            if i + 1 == row.len() {
                line.push_str(cell);
            } else {
                line.push_str(cell);
                let pad = widths[i] - cell.chars().count() + 2;
                line.extend(std::iter::repeat_n(' ', pad));
            }
        }
        writeln!(w, "{}", line.trim_end())?;
    }
    Ok(())
}

//! Partition list parsing and work item enumeration.
//!
//! A partition (source-deck, `sss-ddd`) is processed one month at a time.
//! [`enumerate_partition`] expands a partition's period range into one
//! [`WorkItem`] per month for which a source file exists. Months without a
//! source file are reported back as gaps — sparse coverage is expected and
//! is not an error.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MarlinError;

/// One month of one data release, the unit of processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

/// Which end of a range a bare-year period string belongs to.
///
/// `2005` as a start bound means January 2005; as an end bound, December 2005.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Start,
    End,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Parse `YYYY-MM` or a bare `YYYY`.
    pub fn parse(s: &str, bound: RangeBound) -> Result<Self, MarlinError> {
        let s = s.trim();
        let invalid = || MarlinError::InvalidPeriod(s.to_string());
        match s.split_once('-') {
            Some((y, m)) => {
                let year = y.parse().map_err(|_| invalid())?;
                let month: u32 = m.parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(Self { year, month })
            }
            None => {
                let year = s.parse().map_err(|_| invalid())?;
                let month = match bound {
                    RangeBound::Start => 1,
                    RangeBound::End => 12,
                };
                Ok(Self { year, month })
            }
        }
    }

    /// The month immediately after this one.
    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// An inclusive month range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: Period,
    pub end: Period,
}

impl PeriodRange {
    pub fn new(start: Period, end: Period) -> Self {
        Self { start, end }
    }

    pub fn from_years(year_init: i32, year_end: i32) -> Self {
        Self {
            start: Period::new(year_init, 1),
            end: Period::new(year_end, 12),
        }
    }

    /// Intersect with an optional year override from the command line.
    /// Returns `None` when the intersection is empty — the caller produces
    /// zero work items for the partition in that case.
    pub fn clip_years(&self, start_year: Option<i32>, end_year: Option<i32>) -> Option<Self> {
        let mut start = self.start;
        let mut end = self.end;
        if let Some(y) = start_year {
            start = start.max(Period::new(y, 1));
        }
        if let Some(y) = end_year {
            end = end.min(Period::new(y, 12));
        }
        if start <= end { Some(Self { start, end }) } else { None }
    }

    /// Iterate the months of the range in ascending order.
    pub fn months(&self) -> Months {
        Months {
            next: if self.start <= self.end { Some(self.start) } else { None },
            end: self.end,
        }
    }
}

/// Iterator over the months of a [`PeriodRange`].
pub struct Months {
    next: Option<Period>,
    end: Period,
}

impl Iterator for Months {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        let current = self.next?;
        self.next = if current < self.end { Some(current.succ()) } else { None };
        Some(current)
    }
}

/// One row of the partition list file: `sid-dck [start end]`.
///
/// A row without a range falls back to the release periods file; a row with
/// a range overrides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    pub sid_dck: String,
    pub range: Option<PeriodRange>,
}

impl PartitionEntry {
    pub fn parse_line(line: &str) -> Result<Self, MarlinError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [sid] => Ok(Self {
                sid_dck: (*sid).to_string(),
                range: None,
            }),
            [sid, start, end] => Ok(Self {
                sid_dck: (*sid).to_string(),
                range: Some(PeriodRange::new(
                    Period::parse(start, RangeBound::Start)?,
                    Period::parse(end, RangeBound::End)?,
                )),
            }),
            _ => Err(MarlinError::InvalidListLine(line.to_string())),
        }
    }
}

/// Load the partition list file. Blank lines and `#` comments are ignored.
pub fn load_list(path: &Path) -> Result<Vec<PartitionEntry>, MarlinError> {
    if !path.is_file() {
        return Err(MarlinError::MissingFile(path.to_path_buf()));
    }
    std::fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PartitionEntry::parse_line)
        .collect()
}

/// Release identity shared by every work item of one launcher invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelContext {
    pub release: String,
    pub update: String,
    pub dataset: String,
    pub source_level: String,
    pub target_level: String,
}

/// One unit of processable data: a (partition, month) slice of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub sid_dck: String,
    pub period: Period,
    pub release: String,
    pub update: String,
    pub dataset: String,
    pub source_level: String,
    pub target_level: String,
}

impl WorkItem {
    /// The file id embedded in every artifact name:
    /// `<YYYY>-<MM>-<release>-<update>`.
    pub fn canonical_id(&self) -> String {
        format!("{}-{}-{}", self.period, self.release, self.update)
    }

    /// Source file name for a given CDM table.
    pub fn source_filename(&self, table: &str) -> String {
        format!("{table}-{}.psv", self.canonical_id())
    }
}

/// Root of the source level tree. level0 data lives outside the release tree,
/// under `datasets/` (it is the raw input, not a release product).
pub fn source_tree_root(
    data_dir: &Path,
    release: &str,
    dataset: &str,
    source_level: &str,
) -> PathBuf {
    if source_level == "level0" {
        data_dir.join("datasets").join(dataset).join(source_level)
    } else {
        data_dir.join(release).join(dataset).join(source_level)
    }
}

/// The result of enumerating one partition: the eligible items in ascending
/// period order, and the months skipped for lack of a source file.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub items: Vec<WorkItem>,
    pub missing: Vec<Period>,
}

/// Expand a partition's range into work items, keeping only months whose
/// source file exists. The output order is ascending so array indices map
/// deterministically to periods across reruns.
pub fn enumerate_partition(
    source_root: &Path,
    sid_dck: &str,
    range: &PeriodRange,
    table: &str,
    ctx: &LevelContext,
) -> Enumeration {
    let dir = source_root.join(sid_dck);
    let mut out = Enumeration::default();
    for period in range.months() {
        let item = WorkItem {
            sid_dck: sid_dck.to_string(),
            period,
            release: ctx.release.clone(),
            update: ctx.update.clone(),
            dataset: ctx.dataset.clone(),
            source_level: ctx.source_level.clone(),
            target_level: ctx.target_level.clone(),
        };
        if dir.join(item.source_filename(table)).is_file() {
            out.items.push(item);
        } else {
            out.missing.push(period);
        }
    }
    out
}

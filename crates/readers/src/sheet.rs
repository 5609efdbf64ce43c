//! Tabular marker-row reader
//!
//! Reads delimiter-separated text (tab by default) laid out the way resource
//! spreadsheets are exported: one or more sheets stacked vertically.
//!
//! ```text
//! Item
//! SERVER  id   model  price
//!         1    A      10
//!         2    B      12
//! END     3    C      8
//!
//! Shop
//! SERVER  id   name
//! END     1    north
//! ```
//!
//! - A sheet starts at a title row whose first cell names the resource type.
//! - The first row whose first cell is `SERVER` is the header row; its
//!   remaining cells name the attribute columns.
//! - Every later row is a data row. A row whose first cell is `END` is the
//!   last data row of the sheet (and is still read).
//! - The next non-blank row after `END` starts a new sheet.
//!
//! Sheets titled for other types are skipped and sheets sharing a title are
//! concatenated.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Lines, Read};

use tracing::warn;

use restable_core::{AttributeKind, Error, Record, ResourceType, Result};
use restable_index::ResourceSchema;

use crate::{RecordStream, ResourceReader};

/// First cell of the header row
pub const HEADER_MARKER: &str = "SERVER";

/// First cell of a sheet's last data row
pub const END_MARKER: &str = "END";

/// Reader for stacked tabular sheets
#[derive(Debug, Clone, Copy)]
pub struct SheetReader {
    delimiter: char,
}

impl SheetReader {
    /// Tab-separated reader
    pub fn new() -> Self {
        SheetReader { delimiter: '\t' }
    }

    /// Reader splitting cells on `delimiter`
    pub fn with_delimiter(delimiter: char) -> Self {
        SheetReader { delimiter }
    }

    /// Cell delimiter
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Distinct sheet titles in `input`, in order of first appearance
    pub fn sheet_titles<R: Read>(&self, input: R) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let mut seen = BTreeSet::new();
        let mut in_sheet = false;
        for line in BufReader::new(input).lines() {
            let line = line?;
            let cells = split(&line, self.delimiter);
            let first = cells.first().map(|c| c.trim()).unwrap_or("");
            if !in_sheet {
                if is_blank(&cells) {
                    continue;
                }
                in_sheet = true;
                if seen.insert(first.to_string()) {
                    titles.push(first.to_string());
                }
            } else if first == END_MARKER {
                in_sheet = false;
            }
        }
        Ok(titles)
    }
}

impl Default for SheetReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceReader for SheetReader {
    fn format(&self) -> &str {
        "sheet"
    }

    fn read(&self, input: Box<dyn Read + Send>, schema: &ResourceSchema) -> Result<RecordStream> {
        let kinds = schema
            .attributes()
            .iter()
            .map(|a| (a.name().to_string(), a.kind()))
            .collect();
        Ok(Box::new(SheetRows {
            lines: BufReader::new(input).lines(),
            delimiter: self.delimiter,
            resource: schema.resource_type().clone(),
            kinds,
            state: State::Outside,
            columns: Vec::new(),
            line_no: 0,
            found: false,
            done: false,
        }))
    }
}

/// Position of the scanner within the stacked sheets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between sheets, waiting for a title row
    Outside,
    /// After a title row, waiting for the header row
    Header { matching: bool },
    /// Reading data rows
    Data { matching: bool },
}

/// Column binding: attribute name and kind, or skipped
type Column = Option<(String, AttributeKind)>;

struct SheetRows {
    lines: Lines<BufReader<Box<dyn Read + Send>>>,
    delimiter: char,
    resource: ResourceType,
    kinds: BTreeMap<String, AttributeKind>,
    state: State,
    columns: Vec<Column>,
    line_no: usize,
    found: bool,
    done: bool,
}

impl SheetRows {
    fn fail(&mut self, reason: impl Into<String>) -> Option<Result<Record>> {
        self.done = true;
        Some(Err(Error::decode(
            self.resource.name(),
            format!("line {}", self.line_no),
            reason,
        )))
    }

    fn bind_columns(&mut self, cells: &[&str]) {
        self.columns = cells
            .iter()
            .skip(1)
            .map(|cell| {
                let name = cell.trim();
                if name.is_empty() {
                    return None;
                }
                match self.kinds.get(name) {
                    Some(kind) => Some((name.to_string(), *kind)),
                    None => {
                        warn!(
                            target: "restable::reader",
                            resource = %self.resource,
                            column = name,
                            "Skipping undeclared column"
                        );
                        None
                    }
                }
            })
            .collect();
    }

    fn to_record(&self, cells: &[&str]) -> Result<Record> {
        let mut record = Record::new(self.resource.clone());
        for (cell, column) in cells.iter().skip(1).zip(&self.columns) {
            let Some((name, kind)) = column else {
                continue;
            };
            if cell.trim().is_empty() {
                continue;
            }
            let value = kind.parse(cell).map_err(|reason| {
                Error::decode(
                    self.resource.name(),
                    format!("line {}", self.line_no),
                    format!("{}: {}", name, reason),
                )
            })?;
            record.set(name.as_str(), value);
        }
        Ok(record)
    }
}

impl Iterator for SheetRows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return self.fail(e.to_string()),
                None => {
                    if let State::Header { matching: true } = self.state {
                        return self.fail(format!("sheet has no {} row", HEADER_MARKER));
                    }
                    if !self.found {
                        return self.fail(format!("no sheet titled '{}'", self.resource));
                    }
                    self.done = true;
                    return None;
                }
            };
            self.line_no += 1;
            let cells = split(&line, self.delimiter);
            let first = cells.first().map(|c| c.trim()).unwrap_or("");

            match self.state {
                State::Outside => {
                    if is_blank(&cells) {
                        continue;
                    }
                    let matching = first == self.resource.name();
                    self.found |= matching;
                    self.state = State::Header { matching };
                }
                State::Header { matching } => {
                    if first == HEADER_MARKER {
                        if matching {
                            self.bind_columns(&cells);
                        }
                        self.state = State::Data { matching };
                    } else if first == END_MARKER {
                        if matching {
                            return self.fail(format!("sheet has no {} row", HEADER_MARKER));
                        }
                        self.state = State::Outside;
                    }
                }
                State::Data { matching } => {
                    let last = first == END_MARKER;
                    if last {
                        self.state = State::Outside;
                    }
                    if !matching || is_blank(&cells[1..]) {
                        continue;
                    }
                    return match self.to_record(&cells) {
                        Ok(record) => Some(Ok(record)),
                        Err(e) => {
                            self.done = true;
                            Some(Err(e))
                        }
                    };
                }
            }
        }
    }
}

fn split(line: &str, delimiter: char) -> Vec<&str> {
    line.trim_end_matches(['\r', '\n']).split(delimiter).collect()
}

fn is_blank(cells: &[&str]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

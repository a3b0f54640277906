/// A delimited table lifted out of a document: header row plus data rows, all the same width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// One line per data row, each cell labelled with its column header.
    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, cell)| !cell.is_empty())
                    .map(|(index, cell)| format!("{}: {cell}", self.column_name(index)))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn column_name(&self, index: usize) -> String {
        match self.header.get(index) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Column {}", index + 1),
        }
    }
}

/// Splits a pipe- or tab-delimited line into trimmed cells. Lines with fewer than two cells
/// are not table rows.
pub fn split_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    let cells: Vec<String> = if trimmed.contains('|') {
        trimmed
            .trim_start_matches('|')
            .trim_end_matches('|')
            .split('|')
            .map(|cell| cell.trim().to_string())
            .collect()
    } else if line.contains('\t') {
        line.split('\t')
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect()
    } else {
        return None;
    };

    (cells.len() >= 2).then_some(cells)
}

/// Markdown alignment rows such as `|---|:--:|`.
pub fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('-')
        && trimmed.contains('|')
        && trimmed.chars().all(|character| matches!(character, '|' | '-' | ':' | ' '))
}

/// Reads a table starting at `start`. Returns the table and the number of lines consumed.
pub fn detect(lines: &[&str], start: usize) -> Option<(Table, usize)> {
    let header = split_cells(lines.get(start)?)?;
    let columns = header.len();
    let mut rows = Vec::new();
    let mut cursor = start + 1;

    while let Some(line) = lines.get(cursor) {
        if is_separator(line) {
            cursor += 1;
            continue;
        }
        match split_cells(line) {
            Some(cells) if cells.len() == columns => {
                rows.push(cells);
                cursor += 1;
            }
            _ => break,
        }
    }

    if rows.is_empty() {
        return None;
    }
    Some((Table { header, rows }, cursor - start))
}

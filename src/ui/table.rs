//! Table rendering for the node listing.

/// A simple table for formatted output.
#[derive(Debug)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    column_widths: Vec<usize>,
}

impl Table {
    /// Create a new table with the given headers.
    pub fn new(headers: Vec<&str>) -> Self {
        let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        let column_widths = headers.iter().map(|h| h.len()).collect();

        Self {
            headers,
            rows: Vec::new(),
            column_widths,
        }
    }

    /// Add a row to the table.
    pub fn add_row(&mut self, row: Vec<&str>) {
        let row: Vec<String> = row.iter().map(|s| s.to_string()).collect();

        // Update column widths
        for (i, cell) in row.iter().enumerate() {
            if i < self.column_widths.len() {
                self.column_widths[i] = self.column_widths[i].max(cell.len());
            }
        }

        self.rows.push(row);
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the table as a string.
    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.render_border('┌', '┬', '┐'));
        output.push('\n');

        output.push_str(&self.render_row(&self.headers));
        output.push('\n');

        output.push_str(&self.render_border('├', '┼', '┤'));
        output.push('\n');

        for row in &self.rows {
            output.push_str(&self.render_row(row));
            output.push('\n');
        }

        output.push_str(&self.render_border('└', '┴', '┘'));

        output
    }

    fn render_border(&self, left: char, mid: char, right: char) -> String {
        let mut s = String::new();
        s.push(left);

        for (i, width) in self.column_widths.iter().enumerate() {
            s.push_str(&"─".repeat(width + 2));
            if i < self.column_widths.len() - 1 {
                s.push(mid);
            }
        }

        s.push(right);
        s
    }

    fn render_row(&self, row: &[String]) -> String {
        let mut s = String::from("│");

        for (i, width) in self.column_widths.iter().enumerate() {
            let cell = row.get(i).map(|s| s.as_str()).unwrap_or("");
            s.push_str(&format!(" {:width$} │", cell, width = width));
        }

        s
    }
}

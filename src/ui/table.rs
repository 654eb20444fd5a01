use tabled::builder::Builder;
use tabled::settings::Style;

/// Rounded table with a header row. Renders to an empty string when no rows
/// were added.
pub struct TableBuilder {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableBuilder {
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        let mut builder = Builder::default();
        builder.push_record(self.header.clone());
        for row in &self.rows {
            builder.push_record(row.clone());
        }
        let mut table = builder.build();
        table.with(Style::rounded());
        table.to_string()
    }
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    let mut builder = TableBuilder::new(&["Metric", "Value"]);
    for (label, value) in stats {
        builder.add_row([label.to_string(), value.clone()]);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_renders_nothing() {
        assert_eq!(TableBuilder::new(&["A"]).build(), "");
    }

    #[test]
    fn test_rows_are_rendered() {
        let mut table = TableBuilder::new(&["Table", "Columns"]);
        table.add_row(["users", "4"]);
        table.add_row(["posts", "3"]);
        let out = table.build();
        assert!(out.contains("Table"));
        assert!(out.contains("users"));
        assert_eq!(out.lines().filter(|l| l.contains("posts")).count(), 1);

        let stats = stats_table(&[("Files", "12".to_string())]);
        assert!(stats.contains("Metric") && stats.contains("12"));
    }
}

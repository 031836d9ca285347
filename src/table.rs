use crate::engine::AggregatedRow;
use crate::error::Result;
use crate::schema::{ColumnDef, ColumnKind};
use std::io;

const KIND_HEADER: &str = "Row Type";

/// Text rendering of an applied report: one line per row, the row kind first.
pub struct TableRenderer<'a> {
    columns: Vec<&'a ColumnDef>,
}

impl<'a> TableRenderer<'a> {
    pub fn new(columns: &'a [ColumnDef]) -> Self {
        Self {
            columns: columns.iter().collect(),
        }
    }

    /// Keeps only the columns whose id is listed in `visible`, in layout order.
    pub fn with_visible<S: AsRef<str>>(columns: &'a [ColumnDef], visible: &[S]) -> Self {
        Self {
            columns: columns
                .iter()
                .filter(|c| visible.iter().any(|v| v.as_ref() == c.id))
                .collect(),
        }
    }

    pub fn to_csv(&self, rows: &[AggregatedRow]) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec![KIND_HEADER.to_string()];
        header.extend(self.columns.iter().map(|c| c.label.clone()));
        writer.write_record(&header).map_err(io::Error::from)?;

        for row in rows {
            let mut record = vec![kind_name(row).to_string()];
            record.extend(self.cells(row));
            writer.write_record(&record).map_err(io::Error::from)?;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_markdown(&self, rows: &[AggregatedRow]) -> String {
        let mut output = String::new();

        output.push_str(&format!("| {} |", KIND_HEADER));
        for column in &self.columns {
            output.push_str(&format!(" {} |", escape_cell(&column.label)));
        }
        output.push('\n');

        output.push_str("|---|");
        for column in &self.columns {
            let rule = match column.kind {
                ColumnKind::Hierarchy => "---",
                _ => "---:",
            };
            output.push_str(&format!("{}|", rule));
        }
        output.push('\n');

        for row in rows {
            let emphasis = match row {
                AggregatedRow::GroupSubtotal { .. } | AggregatedRow::GrandTotal { .. } => "**",
                _ => "",
            };
            output.push_str(&format!("| {} |", kind_name(row)));
            for cell in self.cells(row) {
                if cell.is_empty() {
                    output.push_str("  |");
                } else {
                    output.push_str(&format!(" {}{}{} |", emphasis, escape_cell(&cell), emphasis));
                }
            }
            output.push('\n');
        }

        output
    }

    fn cells(&self, row: &AggregatedRow) -> Vec<String> {
        let first_level = self
            .columns
            .iter()
            .position(|c| c.kind == ColumnKind::Hierarchy);

        self.columns
            .iter()
            .enumerate()
            .map(|(idx, column)| match column.kind {
                ColumnKind::Hierarchy => match row {
                    AggregatedRow::Data { .. } => {
                        row.label(&column.id).unwrap_or_default().to_string()
                    }
                    // structural rows put their caption in the first hierarchy column
                    _ if Some(idx) == first_level => row.display_label(),
                    _ => String::new(),
                },
                _ => match row.values() {
                    Some(_) => format!("{:.2}", row.value(&column.id)),
                    None => String::new(),
                },
            })
            .collect()
    }
}

fn kind_name(row: &AggregatedRow) -> &'static str {
    match row {
        AggregatedRow::GroupHeader { .. } => "group_header",
        AggregatedRow::Data { .. } => "data",
        AggregatedRow::GroupSubtotal { .. } => "group_subtotal",
        AggregatedRow::GrandTotal { .. } => "grand_total",
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

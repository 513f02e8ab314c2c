use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use tvs_model::{LogEntry, Severity};
use tvs_cli::types::{ExtDbRow, ImportReport, ListReport};

pub fn print_import_summary(report: &ImportReport) {
    println!("Study: {} ({})", report.study, report.study_type);
    if let Some(path) = &report.saved_to {
        println!("Saved to: {}", path.display());
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Key"),
        header_cell("Scenario"),
        header_cell("Sources"),
        header_cell("Desired"),
        header_cell("Undesired"),
        header_cell("Children"),
    ]);
    apply_summary_table_style(&mut table);
    for index in [0, 2, 3, 4, 5] {
        align_column(&mut table, index, CellAlignment::Right);
    }
    for row in &report.scenarios {
        table.add_row(vec![
            dim_cell(row.key),
            Cell::new(&row.name).fg(Color::Blue).add_attribute(Attribute::Bold),
            Cell::new(row.sources),
            count_cell(row.desired, Color::Green),
            Cell::new(row.undesired),
            count_cell(row.children, Color::Cyan),
        ]);
    }
    table.add_row(vec![
        dim_cell("-"),
        Cell::new("TOTAL").fg(Color::Cyan).add_attribute(Attribute::Bold),
        Cell::new(report.sources).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
    ]);
    println!("{table}");
    println!(
        "Lookups: {}  Warnings: {}  Valid: {}",
        report.lookup_calls,
        report.warning_count(),
        if report.valid { "yes" } else { "no" }
    );
    print_messages(&report.messages);
}

pub fn print_list(report: &ListReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Call sign"),
        header_cell("Service"),
        header_cell("Channel"),
        header_cell("Location"),
        header_cell("Country"),
        header_cell("Record"),
        header_cell("DTS"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 6, CellAlignment::Right);
    for row in &report.sources {
        let record = match &row.record_id {
            Some(id) if row.locked => Cell::new(id),
            Some(id) => Cell::new(format!("{id} (edited)")).fg(Color::Yellow),
            None => dim_cell("-"),
        };
        table.add_row(vec![
            Cell::new(&row.call_sign).add_attribute(Attribute::Bold),
            Cell::new(&row.service),
            Cell::new(row.channel),
            Cell::new(format!("{}, {}", row.city, row.state)),
            Cell::new(&row.country),
            record,
            count_cell(row.dts_sites, Color::Cyan),
        ]);
    }
    println!("{table}");
    print_messages(&report.messages);
}

pub fn print_ext_dbs(rows: &[ExtDbRow]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Key"),
        header_cell("Type"),
        header_cell("Version"),
        header_cell("Date"),
        header_cell("Name"),
        header_cell("Lock"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 5, CellAlignment::Center);
    for row in rows {
        let lock = if row.locked {
            Cell::new("locked").fg(Color::Red).add_attribute(Attribute::Bold)
        } else {
            dim_cell("-")
        };
        table.add_row(vec![
            Cell::new(row.key),
            Cell::new(&row.db_type),
            Cell::new(row.version),
            Cell::new(&row.date),
            Cell::new(&row.name),
            lock,
        ]);
    }
    println!("{table}");
}

fn print_messages(messages: &[LogEntry]) {
    let notable: Vec<&LogEntry> = messages
        .iter()
        .filter(|entry| entry.severity != Severity::Message)
        .collect();
    if notable.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![header_cell("Severity"), header_cell("Message")]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Center);
    for entry in notable {
        table.add_row(vec![severity_cell(entry.severity), Cell::new(&entry.message)]);
    }
    println!();
    println!("Messages:");
    println!("{table}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("ERROR").fg(Color::Red).add_attribute(Attribute::Bold),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
        Severity::Message => dim_cell("INFO"),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label).fg(Color::Cyan).add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

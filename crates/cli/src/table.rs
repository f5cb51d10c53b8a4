//! Terminal rendering of a completed run.

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, ContentArrangement, Table};

use prconflict_core::eligibility::Excluded;
use prconflict_core::matrix::{ConflictMatrix, Verdict};
use prconflict_core::RunReport;

use crate::style;

fn verdict_cell(verdict: Verdict, diagonal: bool) -> Cell {
    let cell = match verdict {
        _ if diagonal => Cell::new("·").fg(Color::DarkGrey),
        Verdict::Clean => Cell::new("✓").fg(Color::Green),
        Verdict::Conflict => Cell::new("✗").fg(Color::Red),
        Verdict::Unknown => Cell::new("?").fg(Color::DarkGrey),
    };
    cell.set_alignment(CellAlignment::Center)
}

/// Rows are the PR merged first (base), columns the PR merged second (target).
pub fn matrix_table(matrix: &ConflictMatrix) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("Base \\ Target")];
    header.extend(matrix.ids().iter().map(|id| Cell::new(format!("#{}", id))));
    table.set_header(header);

    for (i, row) in matrix.rows().iter().enumerate() {
        let mut cells = vec![Cell::new(format!("#{}", matrix.ids()[i]))];
        cells.extend(row.iter().enumerate().map(|(j, v)| verdict_cell(*v, i == j)));
        table.add_row(cells);
    }
    table
}

pub fn print_exclusions(excluded: &[Excluded]) {
    if excluded.is_empty() {
        return;
    }
    println!("{}", style::header(&format!("Excluded ({})", excluded.len())));
    for e in excluded {
        println!("  {} {}", style::pr(e.number), style::dim(&e.reason.to_string()));
    }
    println!();
}

pub fn print_report(report: &RunReport) {
    println!();
    println!(
        "{}",
        style::header(&format!(
            "Conflict matrix for {} open pull requests into '{}'",
            report.matrix.len(),
            report.base
        ))
    );
    println!("{}", style::dim("rows: merged first, columns: merged second"));
    println!("{}", matrix_table(&report.matrix));
    println!();

    let pairs = report.matrix.conflicting_pairs();
    if pairs.is_empty() {
        println!("{}", style::success("No pull requests conflict with each other"));
    } else {
        println!("{}", style::header(&format!("Conflicting pairs ({})", pairs.len())));
        for (a, b) in &pairs {
            let title = |n: u64| {
                report
                    .candidates
                    .iter()
                    .find(|c| c.number == n)
                    .map(|c| c.title.as_str())
                    .unwrap_or("")
            };
            println!(
                "  {} {} {}  {}",
                style::pr(*a),
                style::error(""),
                style::pr(*b),
                style::dim(&format!("{} / {}", title(*a), title(*b)))
            );
        }
    }
    for (a, b) in report.matrix.asymmetric_pairs() {
        println!(
            "{}",
            style::warn(&format!("#{} and #{} conflict in one merge order only", a, b))
        );
    }
    for number in &report.stale {
        println!(
            "{}",
            style::warn(&format!(
                "#{} no longer merges cleanly into '{}'; its row is unknown",
                number, report.base
            ))
        );
    }
    println!();
    print_exclusions(&report.excluded);
}

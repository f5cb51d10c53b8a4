//! Output artifacts for a completed run: a JSON document and an SVG heatmap.
//!
//! Rendering reads the matrix; it never decides what conflicts.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::eligibility::Excluded;
use crate::errors::RenderError;
use crate::matrix::{ConflictMatrix, Verdict};
use crate::run::RunReport;

pub const JSON_FILE_NAME: &str = "conflict_matrix.json";
pub const SVG_FILE_NAME: &str = "conflict_matrix.svg";

#[derive(Debug, Serialize)]
struct CandidateEntry<'a> {
    number: u64,
    label: String,
    title: &'a str,
    fork: bool,
}

#[derive(Debug, Serialize)]
struct MatrixDocument<'a> {
    generated_at: DateTime<Utc>,
    run_id: &'a str,
    base: &'a str,
    candidates: Vec<CandidateEntry<'a>>,
    /// `verdicts[i][j]`: merge candidate `i`, then `j`.
    verdicts: &'a [Vec<Verdict>],
    conflicting_pairs: Vec<(u64, u64)>,
    excluded: &'a [Excluded],
    stale: &'a [u64],
}

/// Serialize a report to pretty JSON.
pub fn to_json(report: &RunReport, generated_at: DateTime<Utc>) -> Result<String, RenderError> {
    let doc = MatrixDocument {
        generated_at,
        run_id: &report.run_id,
        base: &report.base,
        candidates: report
            .candidates
            .iter()
            .map(|c| CandidateEntry {
                number: c.number,
                label: c.label(),
                title: &c.title,
                fork: c.source.is_fork(),
            })
            .collect(),
        verdicts: report.matrix.rows(),
        conflicting_pairs: report.matrix.conflicting_pairs(),
        excluded: &report.excluded,
        stale: &report.stale,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

const CELL: usize = 44;
const LEFT: usize = 96;
const TOP: usize = 96;
const RIGHT: usize = 24;
const BOTTOM: usize = 56;

fn fill(verdict: Verdict, diagonal: bool) -> &'static str {
    match verdict {
        _ if diagonal => "#eeeeee",
        Verdict::Clean => "#d9f0d3",
        Verdict::Conflict => "#d73027",
        Verdict::Unknown => "#9e9e9e",
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Heatmap of the matrix. Rows are the base-applied candidate (y axis),
/// columns the target-applied one (x axis).
pub fn to_svg(matrix: &ConflictMatrix) -> String {
    let n = matrix.len();
    let width = LEFT + n * CELL + RIGHT;
    let height = TOP + n * CELL + BOTTOM;
    let labels: Vec<String> = matrix.ids().iter().map(|id| format!("#{}", id)).collect();

    let mut svg = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
        w = width,
        h = height
    );
    let _ = writeln!(svg, r#"  <rect width="{}" height="{}" fill="white"/>"#, width, height);
    let _ = writeln!(
        svg,
        r#"  <text x="{}" y="28" font-size="18" font-weight="bold" text-anchor="middle">PR Conflict Matrix</text>"#,
        width / 2
    );
    let _ = writeln!(
        svg,
        r#"  <text x="{}" y="{}" font-size="13" text-anchor="middle">Target PR</text>"#,
        LEFT + n * CELL / 2,
        TOP + n * CELL + 36
    );
    let _ = writeln!(
        svg,
        r#"  <text x="20" y="{y}" font-size="13" text-anchor="middle" transform="rotate(-90 20 {y})">Base PR</text>"#,
        y = TOP + n * CELL / 2
    );

    for (k, label) in labels.iter().enumerate() {
        let centre = k * CELL + CELL / 2;
        let _ = writeln!(
            svg,
            r#"  <text x="{}" y="{}" font-size="12" text-anchor="middle">{}</text>"#,
            LEFT + centre,
            TOP - 10,
            escape(label)
        );
        let _ = writeln!(
            svg,
            r#"  <text x="{}" y="{}" font-size="12" text-anchor="end" dominant-baseline="middle">{}</text>"#,
            LEFT - 10,
            TOP + centre,
            escape(label)
        );
    }

    for (i, row) in matrix.rows().iter().enumerate() {
        for (j, verdict) in row.iter().enumerate() {
            let _ = writeln!(
                svg,
                r#"  <rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="white"><title>{} then {}: {}</title></rect>"#,
                LEFT + j * CELL,
                TOP + i * CELL,
                CELL,
                CELL,
                fill(*verdict, i == j),
                escape(&labels[i]),
                escape(&labels[j]),
                verdict
            );
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// Paths of the artifacts that were written.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub json: Option<PathBuf>,
    pub svg: Option<PathBuf>,
}

fn io_error(path: &Path, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write the enabled artifacts into `dir`, creating it if needed.
pub fn write_artifacts(
    report: &RunReport,
    dir: &Path,
    json: bool,
    svg: bool,
) -> Result<Artifacts, RenderError> {
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let mut written = Artifacts::default();

    if json {
        let path = dir.join(JSON_FILE_NAME);
        let body = to_json(report, Utc::now())?;
        std::fs::write(&path, body).map_err(|e| io_error(&path, e))?;
        info!(path = %path.display(), "wrote matrix JSON");
        written.json = Some(path);
    }
    if svg {
        let path = dir.join(SVG_FILE_NAME);
        std::fs::write(&path, to_svg(&report.matrix)).map_err(|e| io_error(&path, e))?;
        info!(path = %path.display(), "wrote matrix heatmap");
        written.svg = Some(path);
    }
    Ok(written)
}

//! Render a match report as an A4 PDF in memory.

use super::report::MatchReport;
use super::util::ServiceError;
use log::debug;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rect, Rgb,
};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const ROW_HEIGHT: f32 = 7.0;
const SUGGESTION_WIDTH: usize = 95;

fn render_error(e: printpdf::Error) -> ServiceError {
    ServiceError::Render {
        reason: e.to_string(),
    }
}

/// Builtin fonts only cover a Latin charset, anything else is replaced.
fn printable(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

/// Greedy word wrap on `width` characters. A single word longer than `width` gets its own line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = vec![];
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ServiceError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Page 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(render_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(render_error)?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(PageWriter {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height >= MARGIN {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Page {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn text(&self, text: &str, size: f32, x: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(printable(text), size, Mm(x), Mm(self.y), font);
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        let height = size * 0.5;
        self.ensure_space(height);
        self.y -= height;
        self.text(text, size, MARGIN, bold);
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn set_fill(&self, r: f32, g: f32, b: f32) {
        self.layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }

    fn rule(&self, x1: f32, x2: f32, y: f32) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y)), false),
                (Point::new(Mm(x2), Mm(y)), false),
            ],
            is_closed: false,
        });
    }

    /// A simple grid table. The header row is drawn on a coloured band.
    fn table(
        &mut self,
        widths: &[f32],
        header: &[&str],
        rows: &[Vec<String>],
        header_rgb: (f32, f32, f32),
        header_white: bool,
    ) {
        let total: f32 = widths.iter().sum();
        self.ensure_space(ROW_HEIGHT * (rows.len() + 1) as f32);

        let top = self.y;
        self.set_fill(header_rgb.0, header_rgb.1, header_rgb.2);
        self.layer.add_rect(Rect::new(
            Mm(MARGIN),
            Mm(top - ROW_HEIGHT),
            Mm(MARGIN + total),
            Mm(top),
        ));
        if header_white {
            self.set_fill(1.0, 1.0, 1.0);
        } else {
            self.set_fill(0.0, 0.0, 0.0);
        }

        self.y = top - ROW_HEIGHT + 2.0;
        let mut x = MARGIN + 2.0;
        for (cell, w) in header.iter().zip(widths) {
            self.text(cell, 10.0, x, true);
            x += w;
        }
        self.set_fill(0.0, 0.0, 0.0);

        let mut row_top = top - ROW_HEIGHT;
        for row in rows {
            self.y = row_top - ROW_HEIGHT + 2.0;
            let mut x = MARGIN + 2.0;
            for (cell, w) in row.iter().zip(widths) {
                self.text(cell, 10.0, x, false);
                x += w;
            }
            row_top -= ROW_HEIGHT;
            self.rule(MARGIN, MARGIN + total, row_top);
        }

        self.rule(MARGIN, MARGIN + total, top);
        let mut x = MARGIN;
        for w in std::iter::once(&0.0).chain(widths.iter()) {
            x += w;
            self.layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(x), Mm(top)), false),
                    (Point::new(Mm(x), Mm(row_top)), false),
                ],
                is_closed: false,
            });
        }

        self.y = row_top;
    }

    fn finish(self) -> Result<Vec<u8>, ServiceError> {
        self.doc.save_to_bytes().map_err(render_error)
    }
}

pub fn render_report_pdf(report: &MatchReport) -> Result<Vec<u8>, ServiceError> {
    let mut writer = PageWriter::new(&report.title)?;

    writer.line(&report.title, 20.0, true);
    writer.gap(3.0);
    writer.line(
        &format!(
            "{} vs {} - {}",
            report.team_name, report.opponent_name, report.match_date
        ),
        11.0,
        false,
    );
    writer.gap(6.0);

    let overview: Vec<Vec<String>> = report
        .team_lines
        .iter()
        .map(|l| {
            vec![
                l.team.clone(),
                l.runs.to_string(),
                l.wkts.to_string(),
                l.overs.clone(),
            ]
        })
        .collect();
    writer.table(
        &[70.0, 21.0, 21.0, 21.0],
        &["Team", "Runs", "Wkts", "Overs"],
        &overview,
        (13.0 / 255.0, 110.0 / 255.0, 253.0 / 255.0),
        true,
    );
    writer.gap(8.0);

    writer.line("Top Performers", 13.0, true);
    writer.gap(2.0);
    let performers: Vec<Vec<String>> = report
        .performers()
        .into_iter()
        .map(|p| vec![p.category, p.player, p.detail])
        .collect();
    writer.table(
        &[35.0, 63.0, 57.0],
        &["Category", "Player", "Detail"],
        &performers,
        (0.83, 0.83, 0.83),
        false,
    );
    writer.gap(8.0);

    writer.line("Coach Suggestions (automated)", 13.0, true);
    writer.gap(2.0);
    for suggestion in &report.suggestions {
        for (i, line) in wrap_text(suggestion, SUGGESTION_WIDTH).iter().enumerate() {
            let text = if i == 0 {
                format!("- {}", line)
            } else {
                format!("  {}", line)
            };
            writer.line(&text, 10.0, false);
            writer.gap(1.0);
        }
        writer.gap(2.0);
    }

    debug!(
        "Rendered the report of match {} on {} page(s).",
        report.match_id, writer.pages
    );
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::report::{PlayerAggregate, TeamLine};
    use chrono::NaiveDate;

    fn sample_report(suggestions: usize) -> MatchReport {
        MatchReport {
            match_id: 5,
            title: "Zonal Semi Final".to_string(),
            team_name: "Falcons".to_string(),
            opponent_name: "Hawks".to_string(),
            match_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            team_lines: vec![
                TeamLine {
                    team: "Falcons".to_string(),
                    runs: 182,
                    wkts: 5,
                    overs: "20.0".to_string(),
                },
                TeamLine {
                    team: "Hawks".to_string(),
                    runs: 160,
                    wkts: 9,
                    overs: "20.0".to_string(),
                },
            ],
            top_batter: Some(PlayerAggregate {
                player_id: 1,
                name: "arjun".to_string(),
                runs: 71,
                balls: 48,
                outs: 1,
                fours: 7,
                sixes: 3,
                wickets: 0,
                balls_bowled: 0,
                runs_conceded: 0,
                catches: 0,
            }),
            top_bowler: None,
            top_fielder: None,
            suggestions: (0..suggestions)
                .map(|i| {
                    format!(
                        "Suggestion number {} about improving the running between the wickets in the middle overs of the innings.",
                        i
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(
            wrap_text("practice direct hit drills", 12),
            vec!["practice", "direct hit", "drills"]
        );
        assert_eq!(wrap_text("", 10), Vec::<String>::new());
        assert_eq!(wrap_text("supercalifragilistic", 5), vec!["supercalifragilistic"]);
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable("Falcons vs Hawks"), "Falcons vs Hawks");
        assert_eq!(printable("Sélection"), "S?lection");
    }

    #[test]
    fn test_render_report_pdf() {
        let bytes = render_report_pdf(&sample_report(3)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_long_report_spans_pages() {
        let bytes = render_report_pdf(&sample_report(120)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}

// Report assembly and emission.
//
// One record set per run: an entity table, a per-field distribution table
// with a summary block, and a JSON summary record. CSVs are written with
// minimal quoting (only cells containing the separator, quotes or newlines).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use followcheck_common::{
    DigitDistribution, DigitRow, DistributionTable, EntityRow, RunReport, SummaryRecord,
};

use crate::analysis::benford::DIGITS;
use crate::analysis::scorer::BotLikelihoodScorer;

const SEP: char = ',';

/// Per-digit rows plus the summary row for one distribution. An empty
/// distribution yields no digit rows and an `INSUFFICIENT_DATA` verdict.
pub fn build_distribution_table(
    dist: &DigitDistribution,
    scorer: &BotLikelihoodScorer,
) -> DistributionTable {
    let rows = if dist.has_data() {
        DIGITS
            .map(|d| {
                let observed = dist.observed_pct.get(&d).copied().unwrap_or(0.0);
                let expected = dist.expected_pct.get(&d).copied().unwrap_or(0.0);
                DigitRow {
                    digit: d,
                    count: dist.counts.get(&d).copied().unwrap_or(0),
                    observed_pct: observed,
                    expected_pct: expected,
                    deviation_pct: (observed - expected).abs(),
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    DistributionTable {
        field: dist.field.clone(),
        rows,
        avg_deviation: dist.avg_deviation,
        chi_squared: dist.chi_squared,
        total_samples: dist.total_samples,
        verdict: scorer.classify(dist),
    }
}

pub fn build_report(
    summary: SummaryRecord,
    entities: Vec<EntityRow>,
    distributions: &[DigitDistribution],
    scorer: &BotLikelihoodScorer,
) -> RunReport {
    RunReport {
        summary,
        entities,
        distributions: distributions
            .iter()
            .map(|d| build_distribution_table(d, scorer))
            .collect(),
    }
}

// --- CSV ---

fn needs_quotes(cell: &str) -> bool {
    cell.contains(SEP) || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{SEP}")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

fn row<const N: usize>(cells: [&str; N]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

pub fn write_entities<W: Write>(w: &mut W, entities: &[EntityRow]) -> io::Result<()> {
    write_row(w, &row(["id", "field", "metric", "first_digit"]))?;
    for e in entities {
        write_row(
            w,
            &[
                e.id.clone(),
                e.field.clone(),
                e.metric.to_string(),
                e.first_digit.clone(),
            ],
        )?;
    }
    Ok(())
}

pub fn write_distributions<W: Write>(w: &mut W, tables: &[DistributionTable]) -> io::Result<()> {
    write_row(
        w,
        &row(["field", "digit", "count", "observed_pct", "expected_pct", "deviation_pct"]),
    )?;
    for table in tables {
        for r in &table.rows {
            write_row(
                w,
                &[
                    table.field.clone(),
                    r.digit.to_string(),
                    r.count.to_string(),
                    format!("{:.2}", r.observed_pct),
                    format!("{:.2}", r.expected_pct),
                    format!("{:.2}", r.deviation_pct),
                ],
            )?;
        }
    }

    writeln!(w)?;
    write_row(
        w,
        &row(["field", "avg_deviation", "chi_squared", "total_samples", "verdict"]),
    )?;
    for table in tables {
        write_row(
            w,
            &[
                table.field.clone(),
                format!("{:.2}", table.avg_deviation),
                format!("{:.2}", table.chi_squared),
                table.total_samples.to_string(),
                table.verdict.to_string(),
            ],
        )?;
    }
    Ok(())
}

// --- Writer ---

/// Persists a `RunReport` as `<profile>_<mode>_{entities.csv,distribution.csv,summary.json}`.
pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Write all three files and return their paths.
    pub fn write(&self, report: &RunReport) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Failed to create {}", self.out_dir.display()))?;

        let stem = format!(
            "{}_{}",
            file_safe(&report.summary.profile_id),
            report.summary.mode.as_str()
        );

        let entities_path = self.out_dir.join(format!("{stem}_entities.csv"));
        let mut w = create(&entities_path)?;
        write_entities(&mut w, &report.entities)
            .and_then(|_| w.flush())
            .with_context(|| format!("Failed to write {}", entities_path.display()))?;

        let dist_path = self.out_dir.join(format!("{stem}_distribution.csv"));
        let mut w = create(&dist_path)?;
        write_distributions(&mut w, &report.distributions)
            .and_then(|_| w.flush())
            .with_context(|| format!("Failed to write {}", dist_path.display()))?;

        let summary_path = self.out_dir.join(format!("{stem}_summary.json"));
        let json = serde_json::to_string_pretty(&report.summary)
            .context("Failed to serialize summary")?;
        std::fs::write(&summary_path, json)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;

        info!(
            dir = %self.out_dir.display(),
            entities = report.entities.len(),
            "Report written"
        );
        Ok(vec![entities_path, dist_path, summary_path])
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::benford::analyze;
    use chrono::Utc;
    use followcheck_common::{AuditMode, Entity, ScoringConfig, Verdict};

    fn scorer() -> BotLikelihoodScorer {
        BotLikelihoodScorer::new(ScoringConfig::default())
    }

    fn summary() -> SummaryRecord {
        SummaryRecord {
            run_id: uuid::Uuid::new_v4(),
            profile_id: "some.profile".into(),
            mode: AuditMode::Followers,
            timestamp: Utc::now(),
            profile_metric: Some(1_200),
            total_harvested: 2,
            total_analyzed: 1,
            score: 0,
            max_score: 0,
            verdict: Verdict::InsufficientData,
            reasons: vec![],
            termination: "converged".into(),
            aborted: None,
        }
    }

    #[test]
    fn empty_distribution_has_no_digit_rows() {
        let table = build_distribution_table(&analyze("followers", Vec::<u64>::new()), &scorer());
        assert!(table.rows.is_empty());
        assert_eq!(table.verdict, Verdict::InsufficientData);
    }

    #[test]
    fn populated_distribution_has_nine_rows() {
        let table = build_distribution_table(&analyze("followers", vec![1u64, 22, 333]), &scorer());
        assert_eq!(table.rows.len(), 9);
        assert_eq!(table.rows[0].count, 1);
        assert!((table.rows[8].deviation_pct - table.rows[8].expected_pct).abs() < 1e-9);
    }

    #[test]
    fn cells_with_separators_are_quoted() {
        let mut buf = Vec::new();
        write_row(&mut buf, &row(["plain", "a,b", "say \"hi\""])).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "plain,\"a,b\",\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let entities = vec![
            EntityRow::new(&Entity::with_metric("alice", 320), "followers"),
            EntityRow::new(&Entity::new("bob"), "followers"),
        ];
        let report = build_report(
            summary(),
            entities,
            &[analyze("followers", vec![320u64])],
            &scorer(),
        );

        let paths = ReportWriter::new(dir.path()).write(&report).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("some.profile_followers_entities.csv"));

        let entities_csv = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(
            entities_csv,
            "id,field,metric,first_digit\nalice,followers,320,3\nbob,followers,0,N/A\n"
        );

        let dist_csv = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(dist_csv.contains("followers,3,1,100.00,12.49,87.51"));
        assert!(dist_csv.contains("\n\nfield,avg_deviation"));

        let summary: SummaryRecord =
            serde_json::from_str(&std::fs::read_to_string(&paths[2]).unwrap()).unwrap();
        assert_eq!(summary.profile_id, "some.profile");
        assert_eq!(summary.profile_metric, Some(1_200));
    }
}

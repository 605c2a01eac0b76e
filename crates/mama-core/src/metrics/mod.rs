//! Coverage, quality, and restart observability.
//!
//! Coverage asks "are decisions recorded with their full narrative"; quality
//! asks "are links worth traversing"; restart stats close the loop on how
//! well resume actually works. The quality report bundles all three with
//! threshold-gated recommendations.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MamaError, Result};
use crate::memory::{RestartMode, RestartStatus};
use crate::storage::Storage;

use rusqlite::params;

/// Reason length above which a link reason counts as rich
const RICH_REASON_LEN: usize = 50;

// ============================================================================
// METRIC TYPES
// ============================================================================

/// Narrative and link coverage over decisions.
///
/// Ratios are vacuously 1.0 when there are no decisions, so an empty store
/// never triggers recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageMetrics {
    /// Total decisions
    pub decisions: i64,
    /// Decisions with reasoning, evidence, alternatives, and risks all
    /// non-empty
    pub complete: i64,
    /// complete / decisions
    pub narrative_coverage: f64,
    /// Decisions with at least one approved link
    pub linked: i64,
    /// linked / decisions
    pub link_coverage: f64,
}

/// Per-field presence and link quality ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Total decisions
    pub decisions: i64,
    /// Decisions with non-empty evidence
    pub evidence_ratio: f64,
    /// Decisions with non-empty alternatives
    pub alternatives_ratio: f64,
    /// Decisions with non-empty risks
    pub risks_ratio: f64,
    /// Total links
    pub total_links: i64,
    /// Links whose reason is longer than 50 chars
    pub rich_reason_ratio: f64,
    /// Approved links / all links
    pub approved_ratio: f64,
}

/// Reporting window for restart stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsPeriod {
    /// Last 24 hours
    Day,
    /// Last 7 days
    #[default]
    Week,
    /// Last 30 days
    Month,
}

impl MetricsPeriod {
    /// Canonical short name ("24h", "7d", "30d")
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsPeriod::Day => "24h",
            MetricsPeriod::Week => "7d",
            MetricsPeriod::Month => "30d",
        }
    }

    /// Parse from string, case-insensitive; accepts both short forms and
    /// names.
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "24h" | "day" | "daily" => Ok(MetricsPeriod::Day),
            "7d" | "week" | "weekly" => Ok(MetricsPeriod::Week),
            "30d" | "month" | "monthly" => Ok(MetricsPeriod::Month),
            _ => Err(MamaError::unknown_variant(
                "period",
                s,
                &["24h", "7d", "30d"],
            )),
        }
    }

    fn window(&self) -> Duration {
        match self {
            MetricsPeriod::Day => Duration::hours(24),
            MetricsPeriod::Week => Duration::days(7),
            MetricsPeriod::Month => Duration::days(30),
        }
    }
}

/// Latency percentiles over successful restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPercentiles {
    /// Median
    pub p50_ms: Option<i64>,
    /// 95th percentile
    pub p95_ms: Option<i64>,
    /// 99th percentile
    pub p99_ms: Option<i64>,
}

/// Restart success and latency over a period
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartStats {
    /// Reporting window
    pub period: MetricsPeriod,
    /// Resume attempts in the window
    pub total: i64,
    /// Successful attempts
    pub successes: i64,
    /// Failed attempts
    pub failures: i64,
    /// successes / total (vacuously 1.0 with no attempts)
    pub success_rate: f64,
    /// Latency over all successful restarts
    pub overall: LatencyPercentiles,
    /// Latency over full-mode restarts
    pub full: LatencyPercentiles,
    /// Latency over summary-mode restarts
    pub summary: LatencyPercentiles,
}

/// Thresholds below which the report emits recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportThresholds {
    /// Narrative coverage target
    pub narrative_coverage: f64,
    /// Link coverage target
    pub link_coverage: f64,
    /// Link quality target (rich reasons, approval ratio)
    pub link_quality: f64,
    /// Restart success-rate target
    pub restart_success: f64,
    /// Full-mode p95 latency target in ms
    pub full_latency_ms: i64,
    /// Summary-mode p95 latency target in ms
    pub summary_latency_ms: i64,
}

impl Default for ReportThresholds {
    fn default() -> Self {
        Self {
            narrative_coverage: 0.8,
            link_coverage: 0.7,
            link_quality: 0.7,
            restart_success: 0.95,
            full_latency_ms: crate::checkpoint::FULL_LATENCY_TARGET_MS,
            summary_latency_ms: crate::checkpoint::SUMMARY_LATENCY_TARGET_MS,
        }
    }
}

/// Output format for the quality report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Structured JSON
    #[default]
    Json,
    /// Human-readable Markdown
    Markdown,
}

impl ReportFormat {
    /// Parse from string, case-insensitive
    pub fn parse_name(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            _ => Err(MamaError::unknown_variant(
                "format",
                s,
                &["json", "markdown"],
            )),
        }
    }
}

/// The assembled quality report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    /// When the report was generated (ms epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub generated_at: chrono::DateTime<Utc>,
    /// Coverage block
    pub coverage: CoverageMetrics,
    /// Quality block
    pub quality: QualityMetrics,
    /// Restart block
    pub restart: RestartStats,
    /// Emitted only where a metric is below its threshold
    pub recommendations: Vec<String>,
}

// ============================================================================
// OPERATIONS
// ============================================================================

impl Storage {
    /// Narrative and link coverage over decisions.
    pub fn coverage_metrics(&self) -> Result<CoverageMetrics> {
        let reader = self.read()?;
        let count = |sql: &str| -> Result<i64> {
            Ok(reader.query_row(sql, [], |row| row.get(0))?)
        };

        let decisions = count("SELECT COUNT(*) FROM entities WHERE entity_type = 'decision'")?;
        let complete = count(
            "SELECT COUNT(*) FROM entities WHERE entity_type = 'decision'
               AND reasoning IS NOT NULL AND TRIM(reasoning) <> ''
               AND evidence <> '[]'
               AND alternatives <> '[]'
               AND risks IS NOT NULL AND TRIM(risks) <> ''",
        )?;
        let linked = count(
            "SELECT COUNT(*) FROM entities WHERE entity_type = 'decision'
               AND id IN (SELECT from_id FROM links WHERE approved_by_user = 1
                          UNION
                          SELECT to_id FROM links WHERE approved_by_user = 1)",
        )?;

        Ok(CoverageMetrics {
            decisions,
            complete,
            narrative_coverage: ratio(complete, decisions),
            linked,
            link_coverage: ratio(linked, decisions),
        })
    }

    /// Per-field presence ratios and link quality.
    pub fn quality_metrics(&self) -> Result<QualityMetrics> {
        let reader = self.read()?;
        let count = |sql: &str| -> Result<i64> {
            Ok(reader.query_row(sql, [], |row| row.get(0))?)
        };

        let decisions = count("SELECT COUNT(*) FROM entities WHERE entity_type = 'decision'")?;
        let with_evidence = count(
            "SELECT COUNT(*) FROM entities WHERE entity_type = 'decision' AND evidence <> '[]'",
        )?;
        let with_alternatives = count(
            "SELECT COUNT(*) FROM entities WHERE entity_type = 'decision' AND alternatives <> '[]'",
        )?;
        let with_risks = count(
            "SELECT COUNT(*) FROM entities WHERE entity_type = 'decision'
               AND risks IS NOT NULL AND TRIM(risks) <> ''",
        )?;

        let total_links = count("SELECT COUNT(*) FROM links")?;
        let rich_reason: i64 = reader.query_row(
            "SELECT COUNT(*) FROM links WHERE LENGTH(reason) > ?1",
            params![RICH_REASON_LEN as i64],
            |row| row.get(0),
        )?;
        let approved = count("SELECT COUNT(*) FROM links WHERE approved_by_user = 1")?;

        Ok(QualityMetrics {
            decisions,
            evidence_ratio: ratio(with_evidence, decisions),
            alternatives_ratio: ratio(with_alternatives, decisions),
            risks_ratio: ratio(with_risks, decisions),
            total_links,
            rich_reason_ratio: ratio(rich_reason, total_links),
            approved_ratio: ratio(approved, total_links),
        })
    }

    /// Restart success rate and latency percentiles over a window.
    /// Percentiles are computed from successful restarts only, separable by
    /// mode.
    pub fn restart_stats(&self, period: MetricsPeriod) -> Result<RestartStats> {
        let cutoff = (Utc::now() - period.window()).timestamp_millis();

        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT status, mode, latency_ms FROM restart_metrics WHERE timestamp >= ?1",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut total = 0i64;
        let mut successes = 0i64;
        let mut all_latencies: Vec<i64> = Vec::new();
        let mut full_latencies: Vec<i64> = Vec::new();
        let mut summary_latencies: Vec<i64> = Vec::new();

        for row in rows {
            let (status, mode, latency_ms) = row?;
            total += 1;
            if RestartStatus::parse_name(&status)? != RestartStatus::Success {
                continue;
            }
            successes += 1;
            all_latencies.push(latency_ms);
            match RestartMode::parse_name(&mode)? {
                RestartMode::Full => full_latencies.push(latency_ms),
                RestartMode::Summary => summary_latencies.push(latency_ms),
            }
        }

        Ok(RestartStats {
            period,
            total,
            successes,
            failures: total - successes,
            success_rate: if total == 0 {
                1.0
            } else {
                successes as f64 / total as f64
            },
            overall: percentiles(&mut all_latencies),
            full: percentiles(&mut full_latencies),
            summary: percentiles(&mut summary_latencies),
        })
    }

    /// Assemble the full quality report.
    pub fn quality_report(
        &self,
        period: MetricsPeriod,
        thresholds: Option<ReportThresholds>,
    ) -> Result<QualityReport> {
        let thresholds = thresholds.unwrap_or_default();
        let coverage = self.coverage_metrics()?;
        let quality = self.quality_metrics()?;
        let restart = self.restart_stats(period)?;

        let mut recommendations = Vec::new();
        if coverage.narrative_coverage < thresholds.narrative_coverage {
            recommendations.push(format!(
                "Narrative coverage is {:.0}% (target {:.0}%): record reasoning, evidence, \
                 alternatives, and risks when saving decisions",
                coverage.narrative_coverage * 100.0,
                thresholds.narrative_coverage * 100.0
            ));
        }
        if coverage.link_coverage < thresholds.link_coverage {
            recommendations.push(format!(
                "Link coverage is {:.0}% (target {:.0}%): propose and approve links between \
                 related decisions",
                coverage.link_coverage * 100.0,
                thresholds.link_coverage * 100.0
            ));
        }
        if quality.total_links > 0 && quality.rich_reason_ratio < thresholds.link_quality {
            recommendations.push(format!(
                "Only {:.0}% of links have substantive reasons (target {:.0}%): explain why a \
                 link exists, not just that it does",
                quality.rich_reason_ratio * 100.0,
                thresholds.link_quality * 100.0
            ));
        }
        if quality.total_links > 0 && quality.approved_ratio < thresholds.link_quality {
            recommendations.push(format!(
                "Only {:.0}% of links are approved (target {:.0}%): review the pending queue",
                quality.approved_ratio * 100.0,
                thresholds.link_quality * 100.0
            ));
        }
        if restart.success_rate < thresholds.restart_success {
            recommendations.push(format!(
                "Restart success rate is {:.0}% over {} (target {:.0}%)",
                restart.success_rate * 100.0,
                restart.period.as_str(),
                thresholds.restart_success * 100.0
            ));
        }
        if let Some(p95) = restart.full.p95_ms {
            if p95 > thresholds.full_latency_ms {
                recommendations.push(format!(
                    "Full-mode restart p95 is {p95} ms (target {} ms)",
                    thresholds.full_latency_ms
                ));
            }
        }
        if let Some(p95) = restart.summary.p95_ms {
            if p95 > thresholds.summary_latency_ms {
                recommendations.push(format!(
                    "Summary-mode restart p95 is {p95} ms (target {} ms)",
                    thresholds.summary_latency_ms
                ));
            }
        }

        Ok(QualityReport {
            generated_at: Utc::now(),
            coverage,
            quality,
            restart,
            recommendations,
        })
    }

    /// Render the quality report as JSON or Markdown.
    pub fn generate_quality_report(
        &self,
        format: ReportFormat,
        period: MetricsPeriod,
        thresholds: Option<ReportThresholds>,
    ) -> Result<String> {
        let report = self.quality_report(period, thresholds)?;
        match format {
            ReportFormat::Json => serde_json::to_string_pretty(&report)
                .map_err(|e| MamaError::Storage(format!("report serialization failed: {e}"))),
            ReportFormat::Markdown => Ok(render_markdown(&report)),
        }
    }
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        1.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Nearest-rank percentiles; sorts in place.
fn percentiles(latencies: &mut [i64]) -> LatencyPercentiles {
    if latencies.is_empty() {
        return LatencyPercentiles::default();
    }
    latencies.sort_unstable();
    let pick = |q: f64| -> Option<i64> {
        let rank = ((q * latencies.len() as f64).ceil() as usize).clamp(1, latencies.len());
        Some(latencies[rank - 1])
    };
    LatencyPercentiles {
        p50_ms: pick(0.50),
        p95_ms: pick(0.95),
        p99_ms: pick(0.99),
    }
}

fn render_markdown(report: &QualityReport) -> String {
    let mut out = String::new();
    out.push_str("# Memory quality report\n\n");
    out.push_str(&format!(
        "Generated {} · window {}\n\n",
        report.generated_at.to_rfc3339(),
        report.restart.period.as_str()
    ));

    out.push_str("## Coverage\n\n");
    out.push_str(&format!(
        "- Narrative coverage: {:.0}% ({}/{} decisions complete)\n",
        report.coverage.narrative_coverage * 100.0,
        report.coverage.complete,
        report.coverage.decisions
    ));
    out.push_str(&format!(
        "- Link coverage: {:.0}% ({}/{} decisions linked)\n\n",
        report.coverage.link_coverage * 100.0,
        report.coverage.linked,
        report.coverage.decisions
    ));

    out.push_str("## Quality\n\n");
    out.push_str(&format!(
        "- Evidence: {:.0}% · Alternatives: {:.0}% · Risks: {:.0}%\n",
        report.quality.evidence_ratio * 100.0,
        report.quality.alternatives_ratio * 100.0,
        report.quality.risks_ratio * 100.0
    ));
    out.push_str(&format!(
        "- Links: {} total, {:.0}% with rich reasons, {:.0}% approved\n\n",
        report.quality.total_links,
        report.quality.rich_reason_ratio * 100.0,
        report.quality.approved_ratio * 100.0
    ));

    out.push_str("## Restart\n\n");
    out.push_str(&format!(
        "- Success rate: {:.1}% ({}/{} attempts)\n",
        report.restart.success_rate * 100.0,
        report.restart.successes,
        report.restart.total
    ));
    let fmt_latency = |p: &LatencyPercentiles| match (p.p50_ms, p.p95_ms, p.p99_ms) {
        (Some(p50), Some(p95), Some(p99)) => format!("p50 {p50} ms · p95 {p95} ms · p99 {p99} ms"),
        _ => "no data".to_string(),
    };
    out.push_str(&format!("- Full mode: {}\n", fmt_latency(&report.restart.full)));
    out.push_str(&format!(
        "- Summary mode: {}\n\n",
        fmt_latency(&report.restart.summary)
    ));

    if report.recommendations.is_empty() {
        out.push_str("No recommendations. All metrics meet their targets.\n");
    } else {
        out.push_str("## Recommendations\n\n");
        for recommendation in &report.recommendations {
            out.push_str(&format!("- {recommendation}\n"));
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

//! Markdown rendering of a tiered report.
//!
//! One section per list (top tier, operational pool, competition). Each
//! blogger gets a heading with a link to the blog, the two report lines, the
//! tags, and a table of the keywords it was exposed for.

use crate::models::{BlogKind, BloggerReport, ExposurePotential, TieredReport};
use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{self, Write};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

/// Render the whole report as a Markdown document.
pub fn report_to_markdown(report: &TieredReport) -> String {
    let mut md = String::new();
    // writing into a String cannot fail
    let _ = render(report, &mut md);
    md
}

fn render(report: &TieredReport, md: &mut String) -> fmt::Result {
    let meta = &report.meta;
    writeln!(md, "# Blogger report for store {}\n", meta.store_id)?;
    writeln!(
        md,
        "Window: last {} days · keywords checked: {} · facts: {} · candidates: {}  ",
        meta.window_days, meta.total_keywords, meta.fact_count, meta.candidate_count
    )?;
    writeln!(md, "Generated at {}\n", meta.generated_at.to_rfc3339())?;

    render_section(md, "Top tier", &report.top_tier)?;
    render_section(md, "Operational pool", &report.operational_pool)?;
    if !report.competition.is_empty() {
        render_section(md, "Store and competitor blogs", &report.competition)?;
    }
    Ok(())
}

fn render_section(md: &mut String, title: &str, entries: &[BloggerReport]) -> fmt::Result {
    writeln!(md, "## {title} ({})\n", entries.len())?;
    if entries.is_empty() {
        writeln!(md, "_No bloggers._\n")?;
        return Ok(());
    }
    for (i, entry) in entries.iter().enumerate() {
        render_entry(md, i + 1, entry)?;
    }
    Ok(())
}

fn render_entry(md: &mut String, position: usize, entry: &BloggerReport) -> fmt::Result {
    let name = entry.blogger_name.as_deref().unwrap_or(&entry.blogger_id);
    writeln!(
        md,
        "### {position}. [{}]({}) · {:.1}\n",
        escape(name),
        entry.blog_url,
        entry.performance_score
    )?;
    writeln!(md, "- {}", entry.report_line1)?;
    writeln!(md, "- {}", entry.report_line2)?;
    writeln!(
        md,
        "- Exposure potential: {} · strength {} · base score {:.1}",
        potential_label(entry.exposure_potential),
        entry.strength_sum,
        entry.base_score
    )?;
    if entry.blog_kind != BlogKind::Normal {
        writeln!(md, "- Blog kind: {}", kind_label(entry.blog_kind))?;
    }
    if !entry.tags.is_empty() {
        let tags: Vec<String> = entry.tags.iter().map(|t| format!("`{t}`")).collect();
        writeln!(md, "- Tags: {}", tags.join(" "))?;
    }
    writeln!(md)?;

    if entry.exposure_details.is_empty() {
        return Ok(());
    }
    writeln!(md, "| Keyword | Rank | Points | Post |")?;
    writeln!(md, "|---|---|---|---|")?;
    for d in &entry.exposure_details {
        let post = match (&d.post_link, &d.post_title) {
            (Some(link), Some(title)) if !title.is_empty() => format!("[{}]({link})", escape(title)),
            (Some(link), _) => format!("<{link}>"),
            _ => "-".to_string(),
        };
        writeln!(md, "| {} | {} | {} | {post} |", escape(&d.keyword), d.rank, d.strength_points)?;
    }
    writeln!(md)
}

fn potential_label(p: ExposurePotential) -> &'static str {
    match p {
        ExposurePotential::VeryHigh => "very high",
        ExposurePotential::High => "high",
        ExposurePotential::Medium => "medium",
        ExposurePotential::Low => "low",
    }
}

fn kind_label(kind: BlogKind) -> &'static str {
    match kind {
        BlogKind::Normal => "normal",
        BlogKind::OwnStore => "store's own blog",
        BlogKind::Competitor => "competitor",
    }
}

/// Escape characters that break table cells or link text.
fn escape(s: &str) -> String {
    s.replace('|', "\\|").replace('[', "\\[").replace(']', "\\]")
}

/// Write the rendered report to `{markdown_output_dir}/{store_id}/{date}.md`.
#[instrument(level = "info", skip_all, fields(markdown_output_dir = %markdown_output_dir, store_id = store_id))]
pub async fn write_markdown(
    markdown_output_dir: &str,
    store_id: u64,
    date: NaiveDate,
    report: &TieredReport,
) -> Result<PathBuf, Box<dyn Error>> {
    let dir = PathBuf::from(markdown_output_dir).join(store_id.to_string());
    fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{date}.md"));
    fs::write(&path, report_to_markdown(report)).await?;
    info!(path = %path.display(), "Wrote Markdown report");
    Ok(path)
}

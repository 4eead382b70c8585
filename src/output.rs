use std::fmt::{self, Write};
use std::fs;
use std::io;
use std::path::Path;

use colored::Colorize;

use crate::executor::ExecutionReport;
use crate::models::{DeletionPlan, ImageDecision};
use crate::settings::RetentionPolicy;

/// Print the deletion plan for a repository
pub fn print_plan(plan: &DeletionPlan, repository: &str, dry_run: bool) {
    let header = if dry_run {
        format!(" {} ", "DRY RUN".yellow().bold())
    } else {
        String::new()
    };

    println!(
        "\n{}Repository: {}{}",
        header,
        repository.bold(),
        if dry_run { " (no changes will be made)" } else { "" }
    );
    println!("{}", "─".repeat(60));

    let to_delete: Vec<&ImageDecision> = plan.images_to_delete().collect();
    let to_keep: Vec<&ImageDecision> = plan.images_to_keep().collect();

    if !to_delete.is_empty() {
        println!("  {} ({}):", "TO DELETE".red().bold(), to_delete.len());
        for decision in &to_delete {
            print_image_line(decision);
        }
    }

    if !to_keep.is_empty() {
        println!("  {} ({}):", "KEEP".green().bold(), to_keep.len());
        for decision in &to_keep {
            print_image_line(decision);
        }
    }

    if to_delete.is_empty() {
        println!("  {}", "Nothing to delete.".green());
    }
}

fn print_image_line(decision: &ImageDecision) {
    let label = if decision.is_delete() {
        "DELETE".red().bold().to_string()
    } else {
        "  KEEP".green().bold().to_string()
    };

    println!(
        "    [{}] {:<30} {} {}",
        label,
        tags_label(decision),
        decision.image.short_id().dimmed(),
        decision.message().dimmed(),
    );
}

fn tags_label(decision: &ImageDecision) -> String {
    if decision.image.is_untagged() {
        "untagged".to_string()
    } else {
        decision.image.tags.join(", ")
    }
}

/// Print final summary
pub fn print_summary(plan: &DeletionPlan, report: &ExecutionReport, dry_run: bool) {
    let to_delete = plan.images_to_delete().count();
    let kept = plan.images_to_keep().count();
    let errors = if report.errors > 0 {
        report.errors.to_string().red().bold().to_string()
    } else {
        report.errors.to_string()
    };

    println!("\n{}", "═".repeat(60));
    if dry_run {
        println!(
            "{} Would delete {} images ({} tags), keep {} images ({} tags), {} errors",
            "DRY RUN SUMMARY:".yellow().bold(),
            to_delete.to_string().red().bold(),
            plan.tags_to_delete_count(),
            kept.to_string().green().bold(),
            plan.tags_to_keep_count(),
            errors
        );
    } else {
        println!(
            "{} Deleted {} of {} images, skipped {}, kept {} images ({} tags), {} errors",
            "SUMMARY:".bold(),
            report.deleted.to_string().red().bold(),
            to_delete,
            report.skipped,
            kept.to_string().green().bold(),
            plan.tags_to_keep_count(),
            errors
        );
    }
}

/// Markdown summary for a CI step summary file.
pub fn render_summary(
    plan: &DeletionPlan,
    errors: usize,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_markdown(&mut out, plan, errors, policy, dry_run)?;
    Ok(out)
}

fn write_markdown(
    out: &mut impl Write,
    plan: &DeletionPlan,
    errors: usize,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> fmt::Result {
    let to_delete: Vec<&ImageDecision> = plan.images_to_delete().collect();
    let to_keep: Vec<&ImageDecision> = plan.images_to_keep().collect();
    let (delete_label, keep_label, mode) = if dry_run {
        ("To delete", "To keep", "Dry Run")
    } else {
        ("Deleted", "Kept", "Live")
    };

    writeln!(out, "### Container Image Cleanup\n")?;
    writeln!(out, "| Metric | Count |\n|--------|-------|")?;
    writeln!(out, "| Images: kept | {} |", to_keep.len())?;
    writeln!(out, "| Images: deleted | {} |", to_delete.len())?;
    writeln!(out, "| Errors | {} |\n", errors)?;
    writeln!(
        out,
        "**Mode:** {} | **Retention:** Test={}d, Others={}d\n",
        mode, policy.test_retention_days, policy.others_retention_days
    )?;

    write_section(out, delete_label, &to_delete, plan.tags_to_delete_count())?;
    write_section(out, keep_label, &to_keep, plan.tags_to_keep_count())
}

fn write_section(
    out: &mut impl Write,
    label: &str,
    decisions: &[&ImageDecision],
    tags: usize,
) -> fmt::Result {
    writeln!(out, "**{}: {} images ({} tags)**\n", label, decisions.len(), tags)?;
    if decisions.is_empty() {
        return Ok(());
    }
    writeln!(out, "| Image ID | Tags | Type | Reason |\n|----------|------|------|--------|")?;
    for decision in decisions {
        let manifest_type = decision
            .manifest_type
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        writeln!(
            out,
            "| `{}` | {} | {} | {} |",
            decision.image.short_id(),
            tags_label(decision),
            manifest_type,
            decision.message()
        )?;
    }
    writeln!(out)
}

/// Write (overwrite) the markdown summary to `path`.
pub fn write_summary(
    path: &Path,
    plan: &DeletionPlan,
    errors: usize,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> io::Result<()> {
    let content = render_summary(plan, errors, policy, dry_run).map_err(io::Error::other)?;
    fs::write(path, content)
}

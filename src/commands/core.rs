//! Core command handlers.
//!
//! Contains the implementation of core CLI commands:
//! recompute, ingest, status, validate-variant.

use std::path::Path;

use cohortcache::config::CohortCacheConfig;
use cohortcache::models::validate_variant;

use super::Services;

/// Recompute command.
pub fn cmd_recompute(
    config: &CohortCacheConfig,
    slug: Option<String>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::open(config)?;

    if all {
        let report = services.aggregator.recompute_all()?;
        for course in &report.recomputed {
            println!("{}", course.summary());
        }
        for (slug, error) in &report.failures {
            eprintln!("{slug}: {error}");
        }
        println!("{}", report.summary());
        if !report.is_success() {
            return Err(format!("{} courses failed to recompute", report.failures.len()).into());
        }
        return Ok(());
    }

    let Some(slug) = slug else {
        return Err("a course slug or --all is required".into());
    };
    let course = services.courses.get_course_by_slug(&slug)?;
    let report = services.aggregator.recompute(&course.id)?;
    println!("{}", report.summary());
    Ok(())
}

/// Ingest command.
pub fn cmd_ingest(config: &CohortCacheConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let services = Services::open(config)?;
    let report = services.ingestor.ingest_json(&json)?;
    println!("{}", report.summary());
    Ok(())
}

/// Status command.
pub fn cmd_status(config: &CohortCacheConfig) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::open(config)?;
    let courses = services.courses.list_courses()?;

    println!("cohortcache status");
    println!("==================");
    println!("Database: {}", config.resolved_database_path()?.display());
    println!("Courses: {}", courses.len());
    println!();

    for course in &courses {
        let updated = course
            .cache_updated_at
            .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
        println!(
            "{:<24} {:<22} {:>5} students {:>5} trained {:>5} articles {:>7} revisions  updated {}",
            course.slug,
            course.variant.as_str(),
            course.cache.user_count,
            course.cache.trained_count,
            course.cache.article_count,
            course.cache.revision_count,
            updated
        );
        if course.recompute_anomalies > 0 {
            println!("  {} anomalies at last recompute", course.recompute_anomalies);
        }
    }
    Ok(())
}

/// Validate-variant command.
pub fn cmd_validate_variant(tag: &str) -> Result<(), Box<dyn std::error::Error>> {
    let variant = validate_variant(tag)?;
    let traits = variant.traits();
    println!("{variant}");
    println!("  prefix: {}", traits.string_prefix);
    println!("  wiki edits: {}", traits.wiki_edits_enabled);
    println!("  passcode required: {}", traits.passcode_required);
    Ok(())
}

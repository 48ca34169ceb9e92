//! Course and cohort command handlers.

use cohortcache::config::CohortCacheConfig;
use cohortcache::models::NewCourse;

use super::{CohortAction, CourseAction, Services};

/// Course command.
pub fn cmd_course(
    config: &CohortCacheConfig,
    action: CourseAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::open(config)?;

    match action {
        CourseAction::Create {
            slug,
            title,
            start,
            end,
            variant,
            passcode,
        } => {
            let mut request = NewCourse::new(slug, title, start, end).with_variant(variant);
            if let Some(passcode) = passcode {
                request = request.with_passcode(passcode);
            }
            let course = services.courses.create_course(request)?;
            println!("Created course {} ({})", course.slug, course.id);
        },
        CourseAction::Show { slug, json } => {
            let course = services.courses.get_course_by_slug(&slug)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&course)?);
                return Ok(());
            }
            let cache = &course.cache;
            println!("{} ({})", course.title, course.slug);
            println!("  id: {}", course.id);
            println!("  variant: {}", course.variant);
            println!("  window: {} .. {}", course.start, course.end);
            println!("  timeline: {} .. {}", course.timeline_start, course.timeline_end);
            println!("  students: {} ({} trained)", cache.user_count, cache.trained_count);
            println!(
                "  articles: {} ({} new)",
                cache.article_count, cache.new_article_count
            );
            println!("  revisions: {}", cache.revision_count);
            println!("  characters: {}", cache.character_sum);
            println!("  views: {}", cache.view_sum);
        },
    }
    Ok(())
}

/// Cohort command.
pub fn cmd_cohort(
    config: &CohortCacheConfig,
    action: CohortAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::open(config)?;

    match action {
        CohortAction::Create { slug, title } => {
            let title = if title.is_empty() { slug.clone() } else { title };
            let cohort = services.courses.create_cohort(&slug, &title)?;
            println!("Created cohort {} ({})", cohort.slug, cohort.id);
        },
        CohortAction::Add { cohort, course } => {
            services.courses.add_course_to_cohort(&cohort, &course)?;
            println!("Added {course} to {cohort}");
        },
    }
    Ok(())
}

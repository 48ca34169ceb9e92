//! Roster command handlers.

use cohortcache::config::CohortCacheConfig;
use cohortcache::models::RosterSnapshot;
use cohortcache::services::{JsonFileRosterSource, RosterSource};

use super::{RosterAction, Services};

/// Roster command.
pub fn cmd_roster(
    config: &CohortCacheConfig,
    action: RosterAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let RosterAction::Import {
        course,
        file,
        dry_run,
    } = action;

    let services = Services::open(config)?;
    let course = services.courses.get_course_by_slug(&course)?;

    let snapshot = match file {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            RosterSnapshot::from_json(&json)?
        },
        None => {
            let Some(dir) = config.roster.directory.as_ref() else {
                return Err("no roster file given and [roster] directory is not configured".into());
            };
            JsonFileRosterSource::new(dir).fetch(&course)?
        },
    };

    if dry_run {
        let changes = services.reconciler.plan(&course.id, &snapshot)?;
        let diff = &changes.diff;
        for addition in &diff.additions {
            println!("+ {} as {}", addition.username, addition.role.as_str());
        }
        for removal in &diff.removals {
            println!("- {} as {}", removal.username, removal.role.as_str());
        }
        for change in &diff.role_changes {
            println!(
                "~ {}: {} -> {}",
                change.username,
                change.from.as_str(),
                change.to.as_str()
            );
        }
        for article in &changes.cascaded_articles {
            println!("x association {article}");
        }
        if changes.is_empty() {
            println!("roster unchanged");
        }
        return Ok(());
    }

    let report = services.reconciler.reconcile(&course.id, &snapshot)?;
    println!("{}: {}", course.slug, report.summary());
    Ok(())
}

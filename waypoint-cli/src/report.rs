use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

use waypoint_engine::{
    Access, AccessReason, ChapterStatus, JourneyCatalog, JourneyOrigin, JourneyPhase,
    ProgressStatus, StructureIssue, ValidationOutcome,
};

pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// One-line explanation of an accessibility result.
pub fn describe_access(access: &Access) -> String {
    match access.reason {
        AccessReason::AllConditionsMet => "open".to_string(),
        AccessReason::InvalidChapter => "no such chapter".to_string(),
        AccessReason::InvalidChallenge => "no such challenge".to_string(),
        AccessReason::InsufficientLevel => format!(
            "needs level {} (currently {})",
            access.required_level.unwrap_or_default(),
            access.user_level.unwrap_or_default()
        ),
        AccessReason::MissingAchievements => {
            format!("requires {}", access.missing_achievements.join(", "))
        }
        AccessReason::CommittedElsewhere => match access.committed_chapter {
            Some(holder) => format!("level committed to chapter {holder}"),
            None => "level committed elsewhere".to_string(),
        },
    }
}

pub fn write_catalog<W: Write>(out: &mut W, catalog: &JourneyCatalog) -> Result<()> {
    writeln!(out, "{}", "🧭 Available Journeys".bright_cyan().bold())?;
    writeln!(out, "{}", "=====================".cyan())?;
    if catalog.is_empty() {
        writeln!(out, "No journeys found.")?;
    }
    for entry in catalog {
        let source = match entry.source {
            JourneyOrigin::Official => "official".normal(),
            JourneyOrigin::Personal => "personal".magenta(),
        };
        writeln!(
            out,
            "{} {} ({} chapters, {source})",
            entry.name.bold(),
            entry.definition.title,
            entry.chapter_count
        )?;
    }
    for skipped in catalog.skipped() {
        writeln!(out, "⚠️  Skipped {}: {}", skipped.name.yellow(), skipped.reason)?;
    }
    Ok(())
}

fn write_chapter<W: Write>(out: &mut W, chapter: &ChapterStatus) -> Result<()> {
    let icon = if chapter.validated {
        "✅"
    } else if chapter.access.accessible {
        "🔓"
    } else {
        "🔒"
    };
    let date = chapter
        .date
        .map_or_else(String::new, |date| format!(" {date}"));
    write!(
        out,
        "  {icon} {:>2}. {} [level {}]{date} {}/{} challenges",
        chapter.number,
        chapter.title.bold(),
        chapter.required_level,
        chapter.completed_challenges,
        chapter.total_challenges
    )?;
    if let Some(preview) = chapter.preview.filter(|_| !chapter.validated) {
        write!(out, " (worth {:.2} xp)", preview.total)?;
    }
    if !chapter.access.accessible {
        write!(out, " {}", describe_access(&chapter.access).dimmed())?;
    }
    writeln!(out)?;
    Ok(())
}

pub fn write_status<W: Write>(out: &mut W, status: &ProgressStatus) -> Result<()> {
    writeln!(out, "{}", format!("📍 {}", status.username).bright_cyan().bold())?;
    writeln!(out, "{}", "=================".cyan())?;

    let (Some(title), Some(start)) = (&status.journey_title, status.start_date) else {
        writeln!(out, "No journey in progress.")?;
        return Ok(());
    };
    let name = status.journey_name.as_deref().unwrap_or("?");
    writeln!(out, "Journey: {} ({name})", title.bold())?;
    writeln!(out, "Started: {start} ({})", status.timezone)?;
    let override_note = if status.fast_forward {
        " [fast-forward]".yellow().to_string()
    } else {
        String::new()
    };
    writeln!(out, "Today: {}{override_note}", status.today)?;
    let phase = match status.phase {
        JourneyPhase::Completed => "completed".green().bold(),
        JourneyPhase::Intro => "intro".yellow(),
        other => other.as_str().normal(),
    };
    writeln!(out, "Phase: {phase}")?;

    let xp = &status.xp;
    writeln!(
        out,
        "Level {} · {:.2} xp ({:.0}% of level, {:.2} to next)",
        xp.level.to_string().green().bold(),
        xp.total_xp,
        xp.progress_in_level * 100.0,
        xp.xp_to_next
    )?;
    writeln!(
        out,
        "Validation credits: {} ({} days elapsed, {} validated)",
        status.credits.credits.to_string().bold(),
        status.credits.days_elapsed,
        status.credits.validated
    )?;

    writeln!(out)?;
    writeln!(out, "{}", "Chapters".bright_yellow().bold())?;
    for chapter in &status.chapters {
        write_chapter(out, chapter)?;
    }

    if !status.achievements.is_empty() {
        writeln!(out)?;
        writeln!(out, "🏅 Achievements: {}", status.achievements.join(", "))?;
    }
    Ok(())
}

pub fn write_outcome<W: Write>(out: &mut W, outcome: &ValidationOutcome) -> Result<()> {
    writeln!(
        out,
        "✅ Chapter {} validated: +{:.2} xp, now level {}",
        outcome.chapter,
        outcome.xp_gained,
        outcome.level.to_string().green().bold()
    )?;
    if outcome.journey_completed {
        writeln!(out, "{}", "🎉 Journey completed!".bright_green().bold())?;
    }
    Ok(())
}

pub fn write_issues<W: Write>(out: &mut W, source: &str, issues: &[StructureIssue]) -> Result<()> {
    if issues.is_empty() {
        writeln!(out, "✅ {source}: no issues found")?;
        return Ok(());
    }
    writeln!(out, "❌ {source}: {} issue(s)", issues.len())?;
    for issue in issues {
        writeln!(out, "   • {}", issue.to_string().red())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use waypoint_engine::{
        DayContext, JourneyDefinition, ProgressSession, User, toggle_challenge_completion,
    };

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn status_lists_locked_chapters_with_reason() {
        let mut user = User::new("rae");
        user.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        user.journey_name = Some("draft".to_string());
        user.active_journey_data = Some(JourneyDefinition::empty_template("Draft", 2));
        toggle_challenge_completion(&mut user, 1, 0, true).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let status = ProgressSession::new(user, DayContext::on(today)).status();

        let text = render(|out| write_status(out, &status));
        assert!(text.contains("Draft"));
        assert!(text.contains("Validation credits"));
        assert!(text.contains("level committed to chapter 1"));
    }

    #[test]
    fn status_without_journey_says_so() {
        let status =
            ProgressSession::new(User::new("sam"), DayContext::on(NaiveDate::MIN)).status();
        let text = render(|out| write_status(out, &status));
        assert!(text.contains("No journey in progress."));
    }

    #[test]
    fn issues_render_one_per_line() {
        let issues = vec![StructureIssue::NoChapters, StructureIssue::MissingTitle];
        let text = render(|out| write_issues(out, "x.json", &issues));
        assert!(text.contains("2 issue(s)"));
        assert_eq!(text.lines().count(), 3);
        let clean = render(|out| write_issues(out, "y.json", &[]));
        assert!(clean.contains("no issues"));
    }
}

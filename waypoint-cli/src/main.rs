mod report;
mod store;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Local, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Value, json};
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};

use store::{DirectoryJourneySource, FileUserStore};
use waypoint_engine::{DayContext, JourneyDefinition, ProgressionEngine, parse_journey};

type Engine = ProgressionEngine<DirectoryJourneySource, FileUserStore>;

#[derive(Debug, Parser)]
#[command(name = "waypoint", version)]
#[command(about = "Track progress through gamified journeys stored as JSON files")]
struct Args {
    /// Directory holding one JSON record per user
    #[arg(long, global = true, default_value = "data/users")]
    data_dir: PathBuf,

    /// Directory of official journey definitions (*.json)
    #[arg(long, global = true, default_value = "journeys")]
    journeys_dir: PathBuf,

    /// Date to evaluate against (YYYY-MM-DD); defaults to the current date
    /// in the user's timezone
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    /// Treat every day as elapsed and always grant one validation credit
    #[arg(long, global = true)]
    fast_forward: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a user with no journey
    Register { username: String },
    /// List official journeys, plus a user's personal ones
    Journeys {
        #[arg(long)]
        user: Option<String>,
    },
    /// Report authoring problems in a journey file
    Check { path: PathBuf },
    /// Write an empty journey skeleton
    Template {
        title: String,
        #[arg(long, default_value_t = 3)]
        chapters: u32,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Start a journey, replacing any journey in progress
    Start {
        username: String,
        journey: String,
        /// Defaults to the evaluation date
        #[arg(long)]
        start_date: Option<NaiveDate>,
        /// IANA zone name; defaults to the user's current timezone
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Show level, credits and chapter accessibility
    Status { username: String },
    /// Record that the journey intro has been shown
    IntroSeen { username: String },
    /// Mark a challenge as completed (or not, with --undo)
    Complete {
        username: String,
        chapter: u32,
        challenge: usize,
        #[arg(long)]
        undo: bool,
    },
    /// Validate a chapter, spending one validation credit
    Validate { username: String, chapter: u32 },
    /// Unlock an achievement
    Achieve {
        username: String,
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Save a journey file, or a copy of an official journey, into a
    /// user's personal collection
    SaveJourney {
        username: String,
        #[arg(required_unless_present = "from", conflicts_with = "from")]
        path: Option<PathBuf>,
        /// Official journey to copy for editing
        #[arg(long)]
        from: Option<String>,
        /// Collection name; defaults to the file or official journey name
        #[arg(long)]
        name: Option<String>,
    },
    /// Abandon the journey in progress
    Reset { username: String },
}

impl Args {
    /// `--today` when given, otherwise the current date in the zone that
    /// `timezone` names. The zone is only looked up when needed.
    fn day_with(&self, timezone: impl FnOnce() -> Result<String>) -> Result<DayContext> {
        let today = match self.today {
            Some(today) => today,
            None => {
                let zone = parse_timezone(&timezone()?)?;
                Utc::now().with_timezone(&zone).date_naive()
            }
        };
        Ok(DayContext {
            today,
            fast_forward: self.fast_forward,
        })
    }

    fn user_day(&self, engine: &Engine, username: &str) -> Result<DayContext> {
        self.day_with(|| Ok(engine.load_user(username)?.timezone))
    }

    fn engine(&self) -> Engine {
        ProgressionEngine::new(
            DirectoryJourneySource::new(&self.journeys_dir),
            FileUserStore::new(&self.data_dir),
        )
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut out = stdout().lock();
    run(&args, &mut out)?;
    out.flush()?;
    Ok(())
}

fn run<W: Write>(args: &Args, out: &mut W) -> Result<()> {
    let engine = args.engine();

    match &args.command {
        Command::Register { username } => {
            let user = engine.register_user(username)?;
            emit(args, out, &user, |out| {
                writeln!(out, "✅ Registered {}", user.username.bold())
            })?;
        }
        Command::Journeys { user } => {
            let user = user.as_deref().map(|name| engine.load_user(name)).transpose()?;
            let catalog = engine.available_journeys(user.as_ref())?;
            if args.json {
                report::write_json(out, &catalog)?;
            } else {
                report::write_catalog(out, &catalog)?;
            }
        }
        Command::Check { path } => check_journey_file(args, out, path)?,
        Command::Template {
            title,
            chapters,
            output,
        } => {
            let template = JourneyDefinition::empty_template(title, *chapters);
            match output {
                Some(path) => {
                    let mut target = create_output(path)?;
                    report::write_json(&mut target, &template)?;
                    target.flush()?;
                    if !args.json {
                        writeln!(out, "📝 Wrote template to {}", path.display())?;
                    }
                }
                None => report::write_json(out, &template)?,
            }
        }
        Command::Start {
            username,
            journey,
            start_date,
            timezone,
        } => {
            let zone = timezone.as_deref().map(parse_timezone).transpose()?;
            let day = args.day_with(|| match zone {
                Some(zone) => Ok(zone.name().to_string()),
                None => Ok(engine.load_user(username)?.timezone),
            })?;
            let start = start_date.unwrap_or(day.today);
            let user = engine.start_journey(username, journey, start, zone.map(|z| z.name()))?;
            let status = engine.status(&user.username, day)?;
            emit(args, out, &status, |out| {
                writeln!(
                    out,
                    "🚀 {} started {} on {start}",
                    user.username.bold(),
                    journey.bold()
                )
            })?;
        }
        Command::Status { username } => {
            let day = args.user_day(&engine, username)?;
            let status = engine.status(username, day)?;
            if args.json {
                report::write_json(out, &status)?;
            } else {
                report::write_status(out, &status)?;
            }
        }
        Command::IntroSeen { username } => {
            engine.mark_intro_shown(username)?;
            emit(args, out, &json!({ "intro_shown": true }), |out| {
                writeln!(out, "📖 Intro marked as shown")
            })?;
        }
        Command::Complete {
            username,
            chapter,
            challenge,
            undo,
        } => {
            let completed = !undo;
            engine.toggle_challenge(username, *chapter, *challenge, completed)?;
            let summary = json!({
                "chapter": chapter,
                "challenge": challenge,
                "completed": completed,
            });
            emit(args, out, &summary, |out| {
                let state = if completed { "completed" } else { "not completed" };
                writeln!(out, "☑️  Chapter {chapter} challenge {challenge} marked {state}")
            })?;
        }
        Command::Validate { username, chapter } => {
            let day = args.user_day(&engine, username)?;
            let outcome = engine
                .validate_chapter(username, *chapter, &day)
                .with_context(|| format!("cannot validate chapter {chapter}"))?;
            if args.json {
                report::write_json(out, &outcome)?;
            } else {
                report::write_outcome(out, &outcome)?;
            }
        }
        Command::Achieve {
            username,
            id,
            title,
            description,
        } => {
            let unlocked = engine.unlock_achievement(
                username,
                id,
                title.as_deref(),
                description.as_deref(),
            )?;
            let summary = json!({ "id": id, "unlocked": unlocked });
            emit(args, out, &summary, |out| {
                if unlocked {
                    writeln!(out, "🏅 Unlocked {}", id.bold())
                } else {
                    writeln!(out, "{} already unlocked", id.yellow())
                }
            })?;
        }
        Command::SaveJourney {
            username,
            path,
            from,
            name,
        } => {
            let now = Local::now().naive_local();
            let key = match (from, path) {
                (Some(official), _) => {
                    engine.copy_official_journey(username, official, name.as_deref(), now)?
                }
                (None, Some(path)) => {
                    let body = fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let definition = parse_journey(&body)
                        .with_context(|| format!("{} is not a usable journey", path.display()))?;
                    let name = match name {
                        Some(name) => name.clone(),
                        None => file_name(path)?,
                    };
                    engine.save_custom_journey(username, &name, definition, now)?
                }
                (None, None) => bail!("give a journey file or --from <official journey>"),
            };
            emit(args, out, &json!({ "key": key }), |out| {
                writeln!(out, "💾 Saved personal journey {}", key.bold())
            })?;
        }
        Command::Reset { username } => {
            engine.reset_journey(username)?;
            emit(args, out, &json!({ "reset": true }), |out| {
                writeln!(out, "🔄 Journey reset")
            })?;
        }
    }
    Ok(())
}

/// Print `value` as JSON in `--json` mode, otherwise run the text printer.
fn emit<W, T, F>(args: &Args, out: &mut W, value: &T, text: F) -> Result<()>
where
    W: Write,
    T: serde::Serialize + ?Sized,
    F: FnOnce(&mut W) -> std::io::Result<()>,
{
    if args.json {
        report::write_json(out, value)
    } else {
        text(out)?;
        Ok(())
    }
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|err| anyhow!("unknown timezone '{name}': {err}"))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

fn check_journey_file<W: Write>(args: &Args, out: &mut W, path: &Path) -> Result<()> {
    let body =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let raw: Value = serde_json::from_str(&body)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let issues = waypoint_engine::validate_structure(&raw);
    let source = path.display().to_string();

    if args.json {
        let messages: Vec<String> = issues.iter().map(ToString::to_string).collect();
        report::write_json(out, &json!({ "file": source, "issues": messages }))?;
    } else {
        report::write_issues(out, &source, &issues)?;
    }
    if !issues.is_empty() {
        bail!("{source} has {} structure issue(s)", issues.len());
    }
    Ok(())
}

/// Buffered writer for `path`, creating parent directories as needed.
fn create_output(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

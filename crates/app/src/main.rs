//! `mentor` command-line front end.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use mentor_core::model::{Profile, RegistrationDraft, TemplateId, UserId};
use services::{AppConfig, AppServices, Clock, MeetingRequest};

mod db_url;
mod seed;

use db_url::{normalize_sqlite_url, prepare_sqlite_file};
use seed::SeedFile;

#[derive(Parser)]
#[command(name = "mentor", version, about = "Mentorship progress tracking")]
struct Cli {
    /// Config file path (defaults to ./mentor.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides the config file and MENTOR_DB_URL
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TestChoice {
    Intro,
    Exit,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Load session templates (bundled starter curriculum by default)
    Seed {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Insert even when templates already exist
        #[arg(long)]
        force: bool,
    },

    /// Register a user
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        mentor: bool,
    },

    /// Become a learner's mentor
    Assign {
        #[arg(long)]
        mentor: UserId,
        #[arg(long)]
        learner: UserId,
    },

    /// Stop mentoring a learner
    Unassign {
        #[arg(long)]
        mentor: UserId,
        #[arg(long)]
        learner: UserId,
    },

    /// Schedule the next meeting with a mentee
    Meeting {
        #[arg(long)]
        mentor: UserId,
        #[arg(long)]
        learner: UserId,
        /// RFC 3339 or YYYY-MM-DDTHH:MM (UTC)
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// zoom, meet, teams or other
        #[arg(long)]
        tool: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Set your own default meeting link and tool
    Defaults {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        tool: Option<String>,
    },

    /// Mark a session complete (or not, with --undo)
    Complete {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        template: TemplateId,
        #[arg(long)]
        undo: bool,
    },

    /// Set a mentee's completed sessions to exactly the given list
    BulkComplete {
        #[arg(long)]
        mentor: UserId,
        #[arg(long)]
        learner: UserId,
        #[arg(long, value_delimiter = ',')]
        templates: Vec<TemplateId>,
    },

    /// Show a user's dashboard (and mentees, for mentors)
    Status {
        #[arg(long)]
        user: UserId,
    },

    /// Show one session as seen by a user
    Session {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        template: TemplateId,
    },

    /// Send a message (to your mentor when --to is omitted)
    Send {
        #[arg(long)]
        from: UserId,
        #[arg(long)]
        to: Option<UserId>,
        body: String,
    },

    /// Read a conversation, marking incoming messages read
    Thread {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        with: UserId,
    },

    /// List conversations
    Inbox {
        #[arg(long)]
        user: UserId,
    },

    /// Clear tests, meeting and completions for a user
    Reset {
        #[arg(long)]
        user: UserId,
    },

    /// Show a test, or submit answers with --answers
    TakeTest {
        #[arg(long)]
        user: UserId,
        #[arg(value_enum)]
        test: TestChoice,
        /// Comma-separated option indexes; leave an entry empty to skip it
        #[arg(long)]
        answers: Option<String>,
    },
}

#[derive(Serialize)]
struct PairingView {
    learner: UserId,
    assigned_mentor: Option<UserId>,
}

impl From<&Profile> for PairingView {
    fn from(profile: &Profile) -> Self {
        Self {
            learner: profile.user_id(),
            assigned_mentor: profile.assigned_mentor(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_answers(raw: &str) -> Vec<Option<String>> {
    raw.split(',')
        .map(str::trim)
        .map(|a| (!a.is_empty()).then(|| a.to_owned()))
        .collect()
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.override_db_url(cli.db.clone());
    config.db_url = normalize_sqlite_url(&config.db_url);
    prepare_sqlite_file(&config.db_url)?;
    Ok(config)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    tracing::debug!(db_url = %config.db_url, "configuration resolved");

    // Opening the services applies pending migrations.
    let app = AppServices::from_config(&config, Clock::system()).await?;

    match cli.command {
        Commands::Migrate => print_json(&serde_json::json!({ "migrated": config.db_url })),
        Commands::Seed { file, force } => {
            let progress = app.progress();
            if !force && progress.template_count().await? > 0 {
                tracing::info!("templates already present; use --force to add more");
                return print_json(&serde_json::json!({ "inserted": 0 }));
            }
            let seed = SeedFile::load(file.as_deref())?;
            let mut inserted = Vec::new();
            for draft in seed.templates {
                let template = progress.add_template(draft).await?;
                inserted.push(serde_json::json!({
                    "id": template.id(),
                    "title": template.title(),
                    "order": template.order(),
                }));
            }
            print_json(&serde_json::json!({ "inserted": inserted.len(), "templates": inserted }))
        }
        Commands::Register {
            email,
            username,
            first_name,
            last_name,
            mentor,
        } => {
            let user = app
                .accounts()
                .register(RegistrationDraft {
                    email,
                    username,
                    first_name,
                    last_name,
                    is_mentor: mentor,
                })
                .await?;
            print_json(&serde_json::json!({
                "id": user.id(),
                "username": user.username(),
                "email": user.email(),
                "mentor": mentor,
            }))
        }
        Commands::Assign { mentor, learner } => {
            let profile = app.pairing().assign_mentor(mentor, learner).await?;
            print_json(&PairingView::from(&profile))
        }
        Commands::Unassign { mentor, learner } => {
            let profile = app.pairing().unassign_mentor(mentor, learner).await?;
            print_json(&PairingView::from(&profile))
        }
        Commands::Meeting {
            mentor,
            learner,
            at,
            url,
            tool,
            notes,
        } => {
            let meeting = app
                .pairing()
                .set_next_meeting(
                    mentor,
                    learner,
                    MeetingRequest {
                        scheduled_at: at,
                        url,
                        tool,
                        notes,
                    },
                )
                .await?;
            print_json(&meeting)
        }
        Commands::Defaults { user, url, tool } => {
            let profile = app
                .accounts()
                .set_meeting_defaults(user, url.as_deref(), tool.as_deref())
                .await?;
            let defaults = profile.default_meeting();
            print_json(&serde_json::json!({
                "user": user,
                "url": defaults.url,
                "tool": defaults.tool,
            }))
        }
        Commands::Complete {
            user,
            template,
            undo,
        } => {
            let record = app
                .progress()
                .toggle_completion(user, template, !undo)
                .await?;
            let eligibility = app.progress().compute_eligibility(user).await?;
            print_json(&serde_json::json!({
                "completion": record,
                "eligible_for_end_test": eligibility.eligible_for_end_test(),
            }))
        }
        Commands::BulkComplete {
            mentor,
            learner,
            templates,
        } => {
            let wanted: HashSet<TemplateId> = templates.into_iter().collect();
            let records = app
                .pairing()
                .bulk_set_completions(mentor, learner, &wanted)
                .await?;
            print_json(&records)
        }
        Commands::Status { user } => {
            let dashboard = app.accounts().dashboard(user).await?;
            let sessions = app.progress().session_list(user).await?;
            let mentoring = if dashboard.is_mentor {
                Some(app.pairing().mentor_dashboard(user).await?)
            } else {
                None
            };
            print_json(&serde_json::json!({
                "dashboard": dashboard,
                "sessions": sessions,
                "mentoring": mentoring,
            }))
        }
        Commands::Session { user, template } => {
            let detail = app.progress().session_detail(user, template).await?;
            print_json(&detail)
        }
        Commands::Send { from, to, body } => {
            let messaging = app.messaging();
            let message = match to {
                Some(to) => messaging.send_in_thread(from, to, &body).await?,
                None => messaging.send_message_to_mentor(from, &body).await?,
            };
            print_json(&message)
        }
        Commands::Thread { user, with } => {
            let thread = app.messaging().open_thread(user, with).await?;
            print_json(&thread)
        }
        Commands::Inbox { user } => {
            let inbox = app.messaging().inbox(user).await?;
            print_json(&inbox)
        }
        Commands::Reset { user } => {
            app.progress().reset_progress(user).await?;
            print_json(&serde_json::json!({ "reset": user }))
        }
        Commands::TakeTest {
            user,
            test,
            answers,
        } => {
            let testing = app.testing();
            match (test, answers) {
                (TestChoice::Intro, None) => print_json(&serde_json::json!({
                    "version": testing.bank_version(),
                    "bank": testing.intro_test_questions(user).await?,
                })),
                (TestChoice::Exit, None) => print_json(&serde_json::json!({
                    "version": testing.bank_version(),
                    "bank": testing.exit_test_questions(user).await?,
                })),
                (TestChoice::Intro, Some(raw)) => {
                    print_json(&testing.submit_intro_test(user, &parse_answers(&raw)).await?)
                }
                (TestChoice::Exit, Some(raw)) => {
                    print_json(&testing.submit_exit_test(user, &parse_answers(&raw)).await?)
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,mentor=info,services=info")),
        )
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn answers_keep_positions_of_skipped_entries() {
        assert_eq!(
            parse_answers("1, ,2,"),
            vec![Some("1".to_owned()), None, Some("2".to_owned()), None]
        );
    }

    #[test]
    fn migrate_takes_global_db_flag() {
        let cli = Cli::try_parse_from(["mentor", "migrate", "--db", "sqlite::memory:"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate));
        assert_eq!(cli.db.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn bulk_complete_parses_template_list() {
        let cli = Cli::try_parse_from([
            "mentor",
            "bulk-complete",
            "--mentor",
            "1",
            "--learner",
            "2",
            "--templates",
            "3,4",
        ])
        .unwrap();
        match cli.command {
            Commands::BulkComplete { templates, .. } => {
                assert_eq!(templates, vec![TemplateId::new(3), TemplateId::new(4)]);
            }
            _ => panic!("expected bulk-complete"),
        }
    }
}

//! CLI interface for tfteam.
//!
//! Every command is one run of the enrichment pipeline with its own
//! listing, classifier, per-record operation and grouping:
//!
//! - `tfteam notifications [--cleanup [--dry-run]]`
//! - `tfteam prs [--group-by author|repository] [--status ...]`
//! - `tfteam releases [--sort released|version]`
//! - `tfteam triage` / `tfteam waiting` `[--pulls|--all] [--every-repo]`
//!
//! Output goes to stdout; logs go to stderr.

mod format;

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use tracing::warn;

use crate::config::Config;
use crate::credential;
use crate::model::{Collection, ReviewState, Status};
use crate::pipeline::{
    Aggregation, CancelToken, Classifier, Column, EnrichmentMode, GroupBy, Keep, Layout,
    MemberOrder, Namespace, NotificationClassifier, OnListError, Outcome, PaginatedSource,
    Pipeline, PullRequestClassifier, Query, RepositoryClassifier, SearchIssueClassifier, View,
    WorkerPool, member_logins, render, repository_record,
};
use crate::remote::{GhRemote, ListQuery, RemoteSource};

/// tfteam: what needs the team's attention on GitHub.
#[derive(Debug, Parser)]
#[command(name = "tfteam", version, after_long_help = USAGE_HELP)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

const USAGE_HELP: &str = r#"Credential:
  Set GITHUB_API_TOKEN (or GH_TOKEN) to a personal access token.

Configuration:
  ~/.tfteam/config.toml, or --config <path>. All keys optional.

Examples:
  tfteam notifications
  tfteam notifications --cleanup --dry-run
  tfteam prs --group-by repository --status waiting
  tfteam releases --sort version --table
  tfteam triage --pulls --every-repo"#;

/// Flags shared by every command.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Render one table instead of a list per group.
    #[arg(long, global = true, conflicts_with = "json")]
    table: bool,

    /// Render groups as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Number of concurrent workers (overrides config).
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Per-call timeout in seconds (overrides config).
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Config file (default: ~/.tfteam/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging on stderr: -v for progress, -vv for every request.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Notifications on issues and pull requests no team member has commented on.
    ///
    /// With `--cleanup`, instead mark threads for closed issues as read.
    Notifications {
        /// Mark notification threads read when their issue is closed.
        #[arg(long)]
        cleanup: bool,

        /// With `--cleanup`, show what would be marked read without doing it.
        #[arg(long, requires = "cleanup")]
        dry_run: bool,
    },

    /// Open pull requests by team members and their latest review state.
    Prs {
        /// Group by author or by repository.
        #[arg(long, value_enum, default_value_t = PrGrouping::Author)]
        group_by: PrGrouping,

        /// Only show pull requests in this review state.
        #[arg(long, value_enum)]
        status: Option<PrStatus>,
    },

    /// Latest release tag of every organization repository.
    Releases {
        /// Order within each owner.
        #[arg(long, value_enum, default_value_t = ReleaseSort::Released)]
        sort: ReleaseSort,
    },

    /// Open items with no label.
    Triage(SearchArgs),

    /// Open items labeled `waiting-response` and updated in the last three days.
    Waiting(SearchArgs),
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Pull requests instead of issues.
    #[arg(short, long, conflicts_with = "all")]
    pulls: bool,

    /// Issues and pull requests.
    #[arg(short, long)]
    all: bool,

    /// Search every organization repository with issues enabled.
    #[arg(long)]
    every_repo: bool,
}

impl SearchArgs {
    fn kind(&self) -> &'static str {
        if self.all {
            ""
        } else if self.pulls {
            "is:pr"
        } else {
            "is:issue"
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PrGrouping {
    Author,
    Repository,
}

/// CLI-facing review state, mapped to a status filter.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PrStatus {
    Approved,
    ChangesRequested,
    Commented,
    /// No review yet.
    Waiting,
}

impl PrStatus {
    fn keep(self) -> Keep {
        match self {
            Self::Approved => Keep::Status(Status::Review(ReviewState::Approved)),
            Self::ChangesRequested => Keep::Status(Status::Review(ReviewState::ChangesRequested)),
            Self::Commented => Keep::Status(Status::Review(ReviewState::Commented)),
            Self::Waiting => Keep::Status(Status::Unknown),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReleaseSort {
    /// Most recently released first.
    Released,
    /// Highest version first.
    Version,
}

/// Effective run settings: config overridden by flags.
struct Settings {
    workers: usize,
    call_timeout: Duration,
    layout: Layout,
    cancel: CancelToken,
}

impl Settings {
    fn resolve(args: &GlobalArgs, config: &Config) -> Result<Self, String> {
        let workers = args.workers.unwrap_or(config.workers);
        if workers == 0 {
            return Err("--workers must be at least 1".to_string());
        }
        let call_timeout = args.timeout.map_or_else(|| config.call_timeout(), Duration::from_secs);
        if call_timeout.is_zero() {
            return Err("--timeout must be at least 1".to_string());
        }

        let layout = if args.json {
            Layout::Json
        } else if args.table {
            Layout::Table
        } else {
            Layout::List
        };

        let cancel = match config.run_timeout() {
            Some(limit) => CancelToken::with_deadline(Instant::now() + limit),
            None => CancelToken::new(),
        };

        Ok(Self {
            workers,
            call_timeout,
            layout,
            cancel,
        })
    }

    fn pool(&self, mode: EnrichmentMode) -> WorkerPool {
        WorkerPool::new(self.workers, mode).with_cancel(self.cancel.clone())
    }

    fn view(
        &self,
        heading: impl Into<String>,
        group_label: &'static str,
        columns: Vec<Column>,
    ) -> View {
        View {
            heading: heading.into(),
            group_label,
            columns,
            layout: self.layout,
        }
    }
}

/// A finished run and how to show it.
struct Report {
    view: View,
    outcome: Outcome,
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli) -> Result<(), String> {
    let config = Config::load(cli.global.config.as_deref()).map_err(|e| e.to_string())?;
    let settings = Settings::resolve(&cli.global, &config)?;
    let token = credential::resolve_token().map_err(|e| e.to_string())?;
    let remote = GhRemote::new(token, settings.call_timeout);
    let now = Timestamp::now();

    let report = execute(&cli.command, &remote, &config, &settings, now)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, &report, now).map_err(|e| format!("failed to write report: {e}"))
}

fn execute(
    command: &Command,
    remote: &dyn RemoteSource,
    config: &Config,
    settings: &Settings,
    now: Timestamp,
) -> Result<Report, String> {
    match command {
        Command::Notifications { cleanup, dry_run } => {
            cmd_notifications(remote, config, settings, *cleanup, *dry_run)
        }
        Command::Prs { group_by, status } => cmd_prs(remote, config, settings, *group_by, *status),
        Command::Releases { sort } => cmd_releases(remote, config, settings, *sort),
        Command::Triage(args) => cmd_search(
            remote,
            config,
            settings,
            args,
            "Open items with no label",
            "no:label",
        ),
        Command::Waiting(args) => {
            let qualifiers = format!(
                "label:waiting-response updated:>={}",
                format::three_days_before(now)
            );
            cmd_search(
                remote,
                config,
                settings,
                args,
                "Items waiting on a response, updated in the last three days",
                &qualifiers,
            )
        }
    }
}

fn write_report(w: &mut impl Write, report: &Report, now: Timestamp) -> io::Result<()> {
    render(w, &report.outcome.groups, &report.view, now)?;
    if report.view.layout != Layout::Json {
        for line in format::shortfall(&report.outcome.tally) {
            writeln!(w, "{line}")?;
        }
    }
    Ok(())
}

fn cmd_notifications(
    remote: &dyn RemoteSource,
    config: &Config,
    settings: &Settings,
    cleanup: bool,
    dry_run: bool,
) -> Result<Report, String> {
    let classifier = NotificationClassifier {
        namespace: Namespace::new(config.accepted_repositories.clone()),
    };
    let (mode, keep) = if cleanup {
        (EnrichmentMode::MutateIfClosed { dry_run }, Keep::Terminal)
    } else {
        let team = config.team_members.clone();
        (EnrichmentMode::Query(Query::TeamReview { team }), Keep::NotReviewed)
    };
    let aggregation = Aggregation::new(GroupBy::Collection, MemberOrder::NumberAsc).keep(keep);

    let outcome = Pipeline::new(remote, classifier, aggregation)
        .query(ListQuery::Notifications)
        .enrich(settings.pool(mode))
        .run()
        .map_err(|e| e.to_string())?;

    Ok(Report {
        view: settings.view(
            format::notifications_heading(cleanup, dry_run),
            "REPOSITORY",
            vec![Column::Kind, Column::Number, Column::Title, Column::Link],
        ),
        outcome,
    })
}

fn cmd_prs(
    remote: &dyn RemoteSource,
    config: &Config,
    settings: &Settings,
    group_by: PrGrouping,
    status: Option<PrStatus>,
) -> Result<Report, String> {
    let members = PaginatedSource::new(
        remote,
        ListQuery::TeamMembers {
            team_id: config.team_id,
        },
        OnListError::Abort,
    )
    .collect()
    .map_err(|e| format!("failed to list members of team {}: {e}", config.team_id))?;
    let members = member_logins(members, &config.excluded_members);

    let (group, label, columns) = match group_by {
        PrGrouping::Author => (
            GroupBy::Author,
            "AUTHOR",
            vec![Column::Status, Column::Collection, Column::Number, Column::Title, Column::Link],
        ),
        PrGrouping::Repository => (
            GroupBy::Collection,
            "REPOSITORY",
            vec![Column::Status, Column::Author, Column::Number, Column::Title, Column::Link],
        ),
    };
    let aggregation = Aggregation::new(group, MemberOrder::NumberAsc)
        .keep(status.map_or(Keep::All, PrStatus::keep));
    let classifier = PullRequestClassifier {
        markers: config.pull_request_markers.clone(),
    };

    let mut pipeline = Pipeline::new(remote, classifier, aggregation)
        .enrich(settings.pool(EnrichmentMode::Query(Query::LatestReview)));
    if members.is_empty() {
        warn!(team = config.team_id, "team has no members to search for");
    } else {
        pipeline = pipeline.query(ListQuery::SearchIssues {
            query: format::author_search(&members),
            sort: None,
        });
    }
    let outcome = pipeline.run().map_err(|e| e.to_string())?;

    Ok(Report {
        view: settings.view("Open pull requests by team members", label, columns),
        outcome,
    })
}

fn cmd_releases(
    remote: &dyn RemoteSource,
    config: &Config,
    settings: &Settings,
    sort: ReleaseSort,
) -> Result<Report, String> {
    let core = Collection::parse(&config.core_repository)
        .ok_or_else(|| format!("core-repository {:?} is not owner/name", config.core_repository))?;
    let order = match sort {
        ReleaseSort::Released => MemberOrder::ReleasedDesc,
        ReleaseSort::Version => MemberOrder::VersionDesc,
    };

    let outcome = Pipeline::new(
        remote,
        RepositoryClassifier::default(),
        Aggregation::new(GroupBy::Owner, order),
    )
    .query(ListQuery::OrganizationRepositories {
        organization: config.organization.clone(),
    })
    .seed(repository_record(core))
    .enrich(settings.pool(EnrichmentMode::Query(Query::LatestRelease)))
    .run()
    .map_err(|e| e.to_string())?;

    Ok(Report {
        view: settings.view(
            format!("Latest releases in {}", config.organization),
            "OWNER",
            vec![Column::Collection, Column::Tag, Column::Released, Column::Age],
        ),
        outcome,
    })
}

fn cmd_search(
    remote: &dyn RemoteSource,
    config: &Config,
    settings: &Settings,
    args: &SearchArgs,
    title: &str,
    qualifiers: &str,
) -> Result<Report, String> {
    let repositories = if args.every_repo {
        let listing = ListQuery::OrganizationRepositories {
            organization: config.organization.clone(),
        };
        let items = PaginatedSource::new(remote, listing, OnListError::Abort)
            .collect()
            .map_err(|e| format!("failed to list repositories of {}: {e}", config.organization))?;
        RepositoryClassifier {
            require_issues: true,
        }
        .classify_all(items)
        .iter()
        .map(|r| r.collection().to_string())
        .collect()
    } else {
        config.triage_repositories.clone()
    };

    let aggregation = Aggregation::new(GroupBy::CollectionName, MemberOrder::CreatedDesc);
    let mut pipeline = Pipeline::new(remote, SearchIssueClassifier, aggregation)
        .on_error(OnListError::Truncate);
    for query in format::repository_searches(qualifiers, args.kind(), &repositories) {
        pipeline = pipeline.query(ListQuery::SearchIssues {
            query,
            sort: Some("updated".to_string()),
        });
    }
    let outcome = pipeline.run().map_err(|e| e.to_string())?;

    Ok(Report {
        view: settings.view(
            format::search_heading(title, &outcome.groups),
            "REPOSITORY",
            vec![Column::Number, Column::Kind, Column::Link, Column::Title],
        ),
        outcome,
    })
}

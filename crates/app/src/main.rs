use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use grant_review_core::{
    extract_text_from_path, Database, EmbeddingProvider, HashEmbedder, NewCall, NewProposal,
    NewResearcher, NewReview, NewReviewer, ProposalStatus, RemoteEmbedder, StoreError,
    SuggestionEngine,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "grant-review", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database path.
    #[arg(long, default_value = "grant-review.db")]
    db: PathBuf,

    /// Remote embedding service base URL; the local hashing embedder is
    /// used when unset.
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Bearer key for the remote embedding service.
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Vector dimension expected from the remote embedding service.
    #[arg(long, default_value = "384")]
    embedding_dimensions: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Create a funding call.
    AddCall {
        #[arg(long)]
        title: String,
        #[arg(long)]
        identifier: String,
        #[arg(long, default_value = "")]
        background: String,
        #[arg(long, default_value = "")]
        objectives: String,
        /// Comma- or newline-separated priority/thematic areas.
        #[arg(long, default_value = "")]
        priority_areas: String,
        #[arg(long, default_value = "")]
        funding_details: String,
        #[arg(long, default_value = "")]
        timeline: String,
    },
    /// List funding calls with their proposal counts.
    ListCalls,
    /// Register a reviewer; CV text is extracted from the uploaded PDF.
    RegisterReviewer {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        expertise: String,
        /// Path to the reviewer's CV PDF.
        #[arg(long)]
        cv: PathBuf,
    },
    /// Register a researcher.
    RegisterResearcher {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        expertise: String,
    },
    ListReviewers,
    /// Submit a proposal to a call, from inline text or a PDF.
    SubmitProposal {
        #[arg(long)]
        call_id: i64,
        #[arg(long)]
        title: String,
        #[arg(long = "abstract", default_value = "")]
        abstract_text: String,
        #[arg(long, default_value = "")]
        keywords: String,
        #[arg(long, conflicts_with = "pdf")]
        text: Option<String>,
        #[arg(long)]
        pdf: Option<PathBuf>,
        #[arg(long)]
        researcher_id: Option<i64>,
    },
    /// List a call's proposals, optionally filtered by priority area.
    ListProposals {
        #[arg(long)]
        call_id: i64,
        #[arg(long)]
        area: Option<String>,
    },
    /// Change a proposal's status ("Under Review", "Accepted", "Rejected").
    SetStatus {
        #[arg(long)]
        proposal_id: i64,
        #[arg(long)]
        status: String,
    },
    /// Delete a proposal and its assignments and reviews.
    DeleteProposal {
        #[arg(long)]
        proposal_id: i64,
    },
    /// Save reviewing criteria for a call, optionally scoped to one area.
    AddCriteria {
        #[arg(long)]
        call_id: i64,
        /// Priority area the criteria apply to; omit for call-wide criteria.
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        criteria: String,
    },
    /// List the reviewing criteria saved for a call.
    ListCriteria {
        #[arg(long)]
        call_id: i64,
    },
    /// Check credentials for an admin, reviewer, or researcher account.
    Login {
        #[arg(long, value_enum)]
        role: Role,
        /// Admin username, or the account email for the other roles.
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
    },
    /// List a researcher's own submissions, behind their credentials.
    MyProposals {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Rank reviewers for a proposal; --confirm persists the assignments.
    Suggest {
        #[arg(long)]
        proposal_id: i64,
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// List assignments for a proposal.
    Assignments {
        #[arg(long)]
        proposal_id: i64,
    },
    /// List a reviewer's assigned proposals.
    MyAssignments {
        #[arg(long)]
        reviewer_id: i64,
    },
    /// Submit review scores (1-10 per criterion) for an assigned proposal.
    SubmitReview {
        #[arg(long)]
        proposal_id: i64,
        #[arg(long)]
        reviewer_id: i64,
        #[arg(long)]
        originality: f32,
        #[arg(long)]
        methodology: f32,
        #[arg(long)]
        impact: f32,
        #[arg(long)]
        feasibility: f32,
        #[arg(long, default_value = "")]
        comments: String,
    },
    /// Dashboard counters.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Admin,
    Reviewer,
    Researcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let db = Database::open(&cli.db)?;
    if db.ensure_admin("admin", "admin123")? {
        info!("seeded demo admin account");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %cli.db.display(),
        started_at = %Utc::now().to_rfc3339(),
        "grant-review boot"
    );

    match cli.command {
        Command::AddCall {
            title,
            identifier,
            background,
            objectives,
            priority_areas,
            funding_details,
            timeline,
        } => {
            let id = db.create_call(&NewCall {
                title: title.clone(),
                identifier,
                background,
                objectives,
                priority_areas,
                funding_details,
                timeline,
            })?;
            println!("call {id} created: {title}");
        }
        Command::ListCalls => {
            let calls = db.list_calls()?;
            if calls.is_empty() {
                println!("no calls in the database yet");
            }
            for call in calls {
                let proposals = db.proposals_for_call(call.id)?;
                println!(
                    "[{}] {} ({}) proposals={} areas={}",
                    call.id,
                    call.title,
                    call.identifier,
                    proposals.len(),
                    call.priority_area_list().join(", ")
                );
            }
        }
        Command::RegisterReviewer {
            name,
            email,
            password,
            expertise,
            cv,
        } => {
            let cv_text = extract_text_from_path(&cv)?;
            let id = db.register_reviewer(&NewReviewer {
                name: name.clone(),
                email,
                password,
                expertise,
                cv_text,
            })?;
            println!("reviewer {id} registered: {name}");
        }
        Command::RegisterResearcher {
            name,
            email,
            password,
            expertise,
        } => {
            let id = db.register_researcher(&NewResearcher {
                name: name.clone(),
                email,
                password,
                expertise,
            })?;
            println!("researcher {id} registered: {name}");
        }
        Command::ListReviewers => {
            let reviewers = db.list_reviewers()?;
            if reviewers.is_empty() {
                println!("no reviewers found");
            }
            for reviewer in reviewers {
                println!(
                    "[{}] {} <{}> expertise: {}",
                    reviewer.id, reviewer.name, reviewer.email, reviewer.expertise
                );
            }
        }
        Command::SubmitProposal {
            call_id,
            title,
            abstract_text,
            keywords,
            text,
            pdf,
            researcher_id,
        } => {
            // Confirm the call exists before accepting the submission.
            let call = db.get_call(call_id)?;

            let proposal_text = match (text, pdf) {
                (Some(text), _) => text,
                (None, Some(path)) => extract_text_from_path(&path)?,
                (None, None) => {
                    warn!("proposal submitted without text or pdf; it cannot be ranked");
                    String::new()
                }
            };

            let id = db.submit_proposal(&NewProposal {
                title: title.clone(),
                abstract_text,
                keywords,
                proposal_text,
                call_id,
                submitted_by: researcher_id,
            })?;
            println!("proposal {id} submitted to call {} ({})", call.title, call.identifier);
        }
        Command::ListProposals { call_id, area } => {
            let proposals = db.proposals_for_call(call_id)?;
            let area_lower = area.as_deref().map(str::to_lowercase);

            let mut shown = 0usize;
            for proposal in proposals {
                if let Some(area_lower) = &area_lower {
                    let haystack = format!("{} {}", proposal.keywords, proposal.abstract_text)
                        .to_lowercase();
                    if !haystack.contains(area_lower) {
                        continue;
                    }
                }
                println!(
                    "[{}] {} status={} keywords={}",
                    proposal.id, proposal.title, proposal.status, proposal.keywords
                );
                shown += 1;
            }
            if shown == 0 {
                println!("no proposals found");
            }
        }
        Command::SetStatus {
            proposal_id,
            status,
        } => {
            let status = ProposalStatus::parse(&status).ok_or_else(|| {
                anyhow::anyhow!("unknown status '{status}' (expected Under Review, Accepted, or Rejected)")
            })?;
            db.set_proposal_status(proposal_id, status)?;
            println!("proposal {proposal_id} is now {status}");
        }
        Command::DeleteProposal { proposal_id } => {
            db.delete_proposal(proposal_id)?;
            println!("proposal {proposal_id} deleted");
        }
        Command::AddCriteria {
            call_id,
            area,
            criteria,
        } => {
            // The call must exist before criteria can attach to it.
            db.get_call(call_id)?;
            let id = db.add_criteria(call_id, area.as_deref(), &criteria)?;
            println!("criteria {id} saved for call {call_id}");
        }
        Command::ListCriteria { call_id } => {
            let entries = db.criteria_for_call(call_id)?;
            if entries.is_empty() {
                println!("no criteria saved for call {call_id}");
            }
            for entry in entries {
                println!(
                    "[{}] area={}",
                    entry.id,
                    entry.area.as_deref().unwrap_or("General")
                );
                println!("{}\n", entry.criteria);
            }
        }
        Command::Login {
            role,
            user,
            password,
        } => {
            let granted = match role {
                Role::Admin => db
                    .verify_admin(&user, &password)?
                    .then(|| user.clone()),
                Role::Reviewer => db
                    .authenticate_reviewer(&user, &password)?
                    .map(|reviewer| reviewer.name),
                Role::Researcher => db
                    .authenticate_researcher(&user, &password)?
                    .map(|researcher| researcher.name),
            };
            match granted {
                Some(name) => println!("login ok: {name}"),
                None => anyhow::bail!("invalid credentials for {user}"),
            }
        }
        Command::MyProposals { email, password } => {
            let researcher = db
                .authenticate_researcher(&email, &password)?
                .ok_or_else(|| anyhow::anyhow!("invalid credentials for {email}"))?;

            let proposals = db.proposals_by_researcher(researcher.id)?;
            if proposals.is_empty() {
                println!("no proposals submitted by {}", researcher.name);
            }
            for proposal in proposals {
                println!(
                    "[{}] {} call={} status={}",
                    proposal.id, proposal.title, proposal.call_id, proposal.status
                );
            }
        }
        Command::Suggest {
            proposal_id,
            confirm,
        } => {
            let proposal = db.get_proposal(proposal_id)?;
            let call = db.get_call(proposal.call_id)?;
            let reviewers = db.list_reviewers()?;
            let assigned = db.assigned_reviewer_ids(proposal_id)?;

            let provider: Box<dyn EmbeddingProvider + Send + Sync> =
                match &cli.embedding_endpoint {
                    Some(endpoint) => Box::new(RemoteEmbedder::new(
                        endpoint,
                        cli.embedding_api_key.clone(),
                        cli.embedding_dimensions,
                    )?),
                    None => Box::new(HashEmbedder::default()),
                };
            let engine = SuggestionEngine::new(provider);

            let suggestions = engine
                .suggest(
                    &proposal.proposal_text,
                    &call.priority_areas,
                    &reviewers,
                    &assigned,
                )
                .await?;

            if suggestions.is_empty() {
                println!("no new reviewer suggestions");
            }
            for suggestion in &suggestions {
                println!(
                    "reviewer={} id={} score={:.3}",
                    suggestion.reviewer_name, suggestion.reviewer_id, suggestion.score
                );
                println!("{}\n", suggestion.explanation);
            }

            if confirm {
                for suggestion in &suggestions {
                    match db.insert_assignment(
                        proposal.id,
                        suggestion.reviewer_id,
                        suggestion.score,
                        &suggestion.explanation,
                    ) {
                        Ok(id) => println!(
                            "assignment {id} saved: reviewer {} -> proposal {}",
                            suggestion.reviewer_id, proposal.id
                        ),
                        Err(StoreError::AlreadyAssigned { reviewer_id, .. }) => println!(
                            "reviewer {reviewer_id} already assigned to proposal {}",
                            proposal.id
                        ),
                        Err(error) => return Err(error.into()),
                    }
                }
            }
        }
        Command::Assignments { proposal_id } => {
            let assignments = db.assignments_for_proposal(proposal_id)?;
            if assignments.is_empty() {
                println!("no assignments for proposal {proposal_id}");
            }
            for assignment in assignments {
                let reviewer = db.get_reviewer(assignment.reviewer_id)?;
                println!(
                    "[{}] reviewer={} score={:.3} created_at={}",
                    assignment.id,
                    reviewer.name,
                    assignment.similarity_score,
                    assignment.created_at.to_rfc3339()
                );
            }
        }
        Command::MyAssignments { reviewer_id } => {
            let assignments = db.assignments_for_reviewer(reviewer_id)?;
            if assignments.is_empty() {
                println!("no proposals assigned to reviewer {reviewer_id}");
            }
            for assignment in assignments {
                let proposal = db.get_proposal(assignment.proposal_id)?;
                println!(
                    "[proposal {}] {} status={} score={:.3}",
                    proposal.id, proposal.title, proposal.status, assignment.similarity_score
                );
            }
        }
        Command::SubmitReview {
            proposal_id,
            reviewer_id,
            originality,
            methodology,
            impact,
            feasibility,
            comments,
        } => {
            let review_id = db.submit_review(&NewReview {
                proposal_id,
                reviewer_id,
                originality,
                methodology,
                impact,
                feasibility,
                comments,
            })?;
            let reviews = db.reviews_for_proposal(proposal_id)?;
            let overall = reviews
                .iter()
                .find(|review| review.id == review_id)
                .map(|review| review.overall)
                .unwrap_or_default();
            println!("review {review_id} recorded, overall={overall:.2}");
        }
        Command::Stats => {
            let stats = db.stats()?;
            println!("calls:       {}", stats.calls);
            println!("proposals:   {}", stats.proposals);
            println!("reviewers:   {}", stats.reviewers);
            println!("assignments: {}", stats.assignments);
        }
    }

    Ok(())
}

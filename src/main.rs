use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use finbox_dpr::cli::{Args, Command};
use finbox_dpr::config::Config;
use finbox_dpr::errors::DprError;
use finbox_dpr::export;
use finbox_dpr::log::Recorder;
use finbox_dpr::provider::{self, DynProvider};
use finbox_dpr::report::{self, OneShot};
use finbox_dpr::store::{ProgressStore, SqliteStore};
use finbox_dpr::ux::{self, Action};
use finbox_dpr::wizard::{Phase, ReportSession, Wizard};

/// Logs go to stderr; stdout carries report text.
fn init_tracing(debug: bool) {
    let default = if debug { "finbox_dpr=debug" } else { "finbox_dpr=info" };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_provider(cfg: &Config) -> Result<DynProvider> {
    let inner = provider::make_provider(cfg).context("configuring provider")?;
    if !(cfg.save_request || cfg.save_response) {
        return Ok(inner);
    }
    let rec = Recorder::new(
        inner,
        Path::new(&cfg.root),
        Uuid::new_v4(),
        cfg.save_request,
        cfg.save_response,
    );
    tracing::info!(dir = %rec.dir().display(), "saving provider artifacts");
    Ok(Box::new(rec))
}

fn open_store(cfg: &Config) -> Result<SqliteStore> {
    let path = cfg.database_path();
    SqliteStore::open(&path).with_context(|| format!("opening {}", path.display()))
}

/// First Ctrl-C cancels the call in flight; a second one exits.
fn install_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancel.is_cancelled() {
                std::process::exit(130);
            }
            eprintln!("\ncancelling; press Ctrl-C again to exit");
            cancel.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let mut cfg = Config::load(args.config.as_deref().map(Path::new))?;
    cfg.apply_args(&args);

    let cancel = CancellationToken::new();
    install_ctrl_c(cancel.clone());

    match &args.command {
        Command::Wizard { user, idea, promoter, out } => {
            let store = open_store(&cfg)?;
            let provider = build_provider(&cfg)?;
            run_wizard(&cfg, &store, &provider, cancel, user, idea, promoter, out.as_deref()).await
        }
        Command::Status { user, idea } => {
            let store = open_store(&cfg)?;
            let list = store.list(user).await?;
            ux::show_projects(user, &list, cfg.chapters.len());
            if let Some(idea) = idea {
                match store.load(user, idea).await? {
                    Some(project) => ux::show_progress(idea, &cfg.chapters, &project, &cfg.placeholders()?),
                    None => println!("no saved report named {idea:?}"),
                }
            }
            Ok(())
        }
        Command::Export { user, idea, out } => {
            let store = open_store(&cfg)?;
            let Some(project) = store.load(user, idea).await? else {
                bail!("no saved report named {idea:?} for {user}");
            };
            let sections = export::assemble(&cfg.chapters, &project, &cfg.placeholders()?);
            if sections.is_empty() {
                bail!("{idea:?} has no accepted chapters yet");
            }
            export::write_atomic(Path::new(out), &export::to_markdown(idea, &sections))?;
            println!("wrote {} chapter(s) to {out}", sections.len());
            Ok(())
        }
        Command::Full { idea, promoter, no_elaborate, out, json_out } => {
            let provider = build_provider(&cfg)?;
            run_full(&cfg, &provider, cancel, idea, promoter, *no_elaborate, out.as_deref(), json_out.as_deref()).await
        }
    }
}

/// Prints the error and says whether the loop should keep going.
fn report_error(e: &DprError) -> bool {
    ux::error(&e.user_message());
    if let DprError::MalformedModelOutput { raw } = e {
        tracing::debug!(raw = %raw, "unreadable model output");
    }
    !matches!(e, DprError::Cancelled)
}

#[allow(clippy::too_many_arguments)]
async fn run_wizard(
    cfg: &Config,
    store: &SqliteStore,
    provider: &DynProvider,
    cancel: CancellationToken,
    user: &str,
    idea: &str,
    promoter: &str,
    out: Option<&str>,
) -> Result<()> {
    let wizard = Wizard::new(provider.as_ref(), store, cfg.chapters.clone(), cfg.placeholders()?)
        .with_temperature(cfg.temperature)
        .with_cancellation(cancel.clone());

    let mut session = wizard.start_or_resume(user, idea, promoter).await?;
    if session.cursor() > 0 && !session.is_complete() {
        println!(
            "Resuming {idea:?} at chapter {} of {}",
            session.cursor() + 1,
            wizard.chapters().len()
        );
    }

    while !cancel.is_cancelled() {
        match session.phase() {
            Phase::Complete => break,
            Phase::Idle => bail!("no report loaded"),
            Phase::Generating(i) => {
                let title = wizard.chapters().title(i).unwrap_or_default().to_string();
                let spinner = ux::Spinner::start(&format!("Drafting {title}"));
                let res = wizard.generate_current_chapter(&mut session).await;
                let took = spinner.finish();
                match res {
                    Ok(view) => {
                        tracing::debug!(chapter = i, secs = took.as_secs_f32(), "draft ready");
                        ux::show_chapter(&view, wizard.placeholders());
                    }
                    Err(e) => {
                        if !report_error(&e) || !ux::confirm("Try again?") {
                            break;
                        }
                    }
                }
            }
            Phase::AwaitingAcceptance(_) => {
                ux::show_menu();
                let Some(line) = ux::prompt_line(">")? else {
                    break;
                };
                let Some(action) = ux::parse_action(&line) else {
                    ux::error("unknown command");
                    continue;
                };
                if !handle_action(&wizard, &mut session, action).await? {
                    break;
                }
            }
        }
    }

    if !session.is_complete() {
        println!(
            "Progress saved: {} of {} chapters accepted.",
            session.cursor(),
            wizard.chapters().len()
        );
        return Ok(());
    }

    println!("Report complete: all {} chapters accepted.", wizard.chapters().len());
    if let Some(out) = out {
        let doc = export::to_markdown(idea, &wizard.assembled_document(&session));
        export::write_atomic(Path::new(out), &doc)?;
        println!("wrote {out}");
    }
    Ok(())
}

/// Returns false when the user quits or the session cannot continue.
async fn handle_action(wizard: &Wizard<'_>, session: &mut ReportSession, action: Action) -> Result<bool> {
    let res = match action {
        Action::Quit => return Ok(false),
        Action::Accept => {
            let pending = wizard.view(session).unresolved;
            let updates = ux::ask_variables(&pending)?;
            let spinner = ux::Spinner::start("Saving and drafting the next chapter");
            let res = wizard.accept_and_advance(session, &updates).await;
            spinner.finish();
            res
        }
        Action::Revise(mut feedback) => {
            if feedback.is_empty() {
                match ux::prompt_line("What should change?")? {
                    Some(f) => feedback = f,
                    None => return Ok(false),
                }
            }
            let spinner = ux::Spinner::start("Revising");
            let res = wizard.request_revision(session, &feedback).await;
            spinner.finish();
            res
        }
        Action::Edit(mut key) => {
            if key.is_empty() {
                let known: Vec<&str> = session.project().variables.keys().map(String::as_str).collect();
                if !known.is_empty() {
                    println!("Known values: {}", known.join(", "));
                }
                match ux::prompt_line("Which value?")? {
                    Some(k) if !k.is_empty() => key = k,
                    Some(_) => return Ok(true),
                    None => return Ok(false),
                }
            }
            let current = session.project().variables.get(&key).cloned();
            let Some(value) = ux::ask_value(&key, current.as_deref())? else {
                return Ok(true);
            };
            let updates = [(key, value)].into_iter().collect();
            wizard.update_variables(session, &updates).await
        }
        Action::Regenerate => {
            let spinner = ux::Spinner::start("Regenerating");
            let res = wizard.generate_current_chapter(session).await;
            spinner.finish();
            res
        }
    };
    match res {
        Ok(view) => {
            ux::show_chapter(&view, wizard.placeholders());
            Ok(true)
        }
        Err(e) => {
            let go_on = report_error(&e);
            // an acceptance that saved but could not draft the next chapter
            if go_on && matches!(session.phase(), Phase::Generating(_)) {
                return Ok(ux::confirm("Try drafting the next chapter again?"));
            }
            Ok(go_on)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_full(
    cfg: &Config,
    provider: &DynProvider,
    cancel: CancellationToken,
    idea: &str,
    promoter: &str,
    no_elaborate: bool,
    out: Option<&str>,
    json_out: Option<&str>,
) -> Result<()> {
    let oneshot = OneShot::new(provider.as_ref())
        .with_temperature(cfg.temperature)
        .with_cancellation(cancel);

    let profile = if no_elaborate {
        report::plain_profile(idea, promoter)
    } else {
        let spinner = ux::Spinner::start("Elaborating the idea");
        let res = oneshot.elaborate(idea, promoter).await;
        spinner.finish();
        res.context("elaborating idea")?
    };

    let spinner = ux::Spinner::start("Writing the full report");
    let res = oneshot.full_report(&profile).await;
    spinner.finish();
    let full = res.context("generating full report")?;

    let heading = if profile.business_name.trim().is_empty() { idea } else { profile.business_name.as_str() };
    let doc = export::to_markdown(heading, &report::sections(&full));
    match out {
        Some(path) => {
            export::write_atomic(Path::new(path), &doc)?;
            println!("wrote {path}");
        }
        None => println!("{doc}"),
    }
    if let Some(path) = json_out {
        let json = serde_json::to_string_pretty(&full)?;
        export::write_atomic(Path::new(path), &json)?;
        println!("wrote {path}");
    }
    Ok(())
}

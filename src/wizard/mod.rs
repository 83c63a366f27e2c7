//! Chapter-by-chapter report generation.
//!
//! A [`ReportSession`] is a plain value owned by the caller. Every verb takes
//! it by `&mut`, so one session has at most one operation in flight. A verb
//! that fails leaves the session exactly as it was, with one exception: when
//! an acceptance is saved but drafting the next chapter fails, the acceptance
//! stands and the session waits in `Generating(next)` for a retry.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::errors::DprError;
use crate::export;
use crate::model::{ChapterList, ReportProject, RevisionRequest, VariableMap};
use crate::normalize;
use crate::placeholder::Placeholders;
use crate::prompt::{self, ChapterPrompt};
use crate::provider::{complete_cancellable, Provider};
use crate::store::ProgressStore;
use crate::wire::LlmRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "chapter", rename_all = "snake_case")]
pub enum Phase {
    /// No project loaded.
    Idle,
    /// Chapter needs a draft. Also the retry point after a failed generation.
    Generating(usize),
    /// Draft ready; the user may revise or accept it.
    AwaitingAcceptance(usize),
    Complete,
}

#[derive(Debug, Clone)]
pub struct ReportSession {
    user_id: String,
    idea: String,
    promoter: String,
    project: ReportProject,
    cursor: usize,
    phase: Phase,
    draft: Option<String>,
}

impl ReportSession {
    /// A session with nothing loaded yet.
    pub fn idle(user_id: impl Into<String>, idea: impl Into<String>, promoter: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            idea: idea.into(),
            promoter: promoter.into(),
            project: ReportProject::default(),
            cursor: 0,
            phase: Phase::Idle,
            draft: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn idea(&self) -> &str {
        &self.idea
    }

    pub fn promoter(&self) -> &str {
        &self.promoter
    }

    pub fn project(&self) -> &ReportProject {
        &self.project
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Draft of the chapter under the cursor, not yet accepted.
    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }
}

/// What the UI needs to show after each verb.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterView {
    pub phase: Phase,
    pub index: usize,
    pub chapter_count: usize,
    pub title: Option<String>,
    pub draft: Option<String>,
    /// Draft with known variables filled in.
    pub rendered: Option<String>,
    /// Placeholder keys in the draft that still need a value.
    pub unresolved: Vec<String>,
    pub complete: bool,
}

pub struct Wizard<'a> {
    provider: &'a (dyn Provider + Send + Sync),
    store: &'a dyn ProgressStore,
    chapters: ChapterList,
    placeholders: Placeholders,
    temperature: Option<f32>,
    cancel: CancellationToken,
}

impl<'a> Wizard<'a> {
    pub fn new(
        provider: &'a (dyn Provider + Send + Sync),
        store: &'a dyn ProgressStore,
        chapters: ChapterList,
        placeholders: Placeholders,
    ) -> Self {
        Self {
            provider,
            store,
            chapters,
            placeholders,
            temperature: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Provider calls made by this wizard stop with `Cancelled` once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn chapters(&self) -> &ChapterList {
        &self.chapters
    }

    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    /// Load saved progress and position the cursor at the first chapter
    /// without a draft. Does not call the provider.
    pub async fn start_or_resume(
        &self,
        user_id: &str,
        idea: &str,
        promoter: &str,
    ) -> Result<ReportSession, DprError> {
        if idea.trim().is_empty() || promoter.trim().is_empty() {
            return Err(DprError::InvalidState("idea and promoter name are required".into()));
        }
        let mut session = ReportSession::idle(user_id, idea, promoter);
        self.resume(&mut session).await?;
        Ok(session)
    }

    /// `start_or_resume` for a session value the caller already holds.
    pub async fn resume(&self, session: &mut ReportSession) -> Result<ChapterView, DprError> {
        let project = self
            .store
            .load(&session.user_id, &session.idea)
            .await?
            .unwrap_or_default();
        let cursor = project.first_gap(&self.chapters);

        session.project = project;
        session.cursor = cursor;
        session.draft = None;
        session.phase = if cursor == self.chapters.len() {
            Phase::Complete
        } else {
            Phase::Generating(cursor)
        };
        tracing::info!(
            user_id = %session.user_id,
            idea = %session.idea,
            cursor,
            chapters = self.chapters.len(),
            "report session loaded"
        );
        Ok(self.view(session))
    }

    /// Draft the chapter under the cursor. Allowed while `Generating(i)`, and
    /// while `AwaitingAcceptance(i)` to discard the draft and start over.
    pub async fn generate_current_chapter(
        &self,
        session: &mut ReportSession,
    ) -> Result<ChapterView, DprError> {
        let index = match session.phase {
            Phase::Generating(i) | Phase::AwaitingAcceptance(i) => i,
            Phase::Idle => return Err(DprError::InvalidState("no report loaded".into())),
            Phase::Complete => return Err(DprError::InvalidState("every chapter is already accepted".into())),
        };
        let text = self.draft_chapter(session, index, None).await?;
        session.draft = Some(text);
        session.phase = Phase::AwaitingAcceptance(index);
        Ok(self.view(session))
    }

    /// Rewrite the pending draft from feedback. The cursor never moves.
    pub async fn request_revision(
        &self,
        session: &mut ReportSession,
        feedback: &str,
    ) -> Result<ChapterView, DprError> {
        let Phase::AwaitingAcceptance(index) = session.phase else {
            return Err(DprError::InvalidState("there is no draft to revise".into()));
        };
        if feedback.trim().is_empty() {
            return Err(DprError::InvalidState("revision feedback is empty".into()));
        }
        let original = session
            .draft
            .clone()
            .ok_or_else(|| DprError::InvalidState("there is no draft to revise".into()))?;
        let revision = RevisionRequest {
            original,
            feedback: feedback.trim().to_string(),
        };
        let text = self.draft_chapter(session, index, Some(&revision)).await?;
        session.draft = Some(text);
        Ok(self.view(session))
    }

    /// Save the pending draft and `variable_updates`, then advance. The
    /// cursor only moves after the store confirms the write.
    pub async fn accept_and_advance(
        &self,
        session: &mut ReportSession,
        variable_updates: &VariableMap,
    ) -> Result<ChapterView, DprError> {
        let Phase::AwaitingAcceptance(index) = session.phase else {
            return Err(DprError::InvalidState("there is no draft to accept".into()));
        };
        let title = self.title(index)?;
        let draft = session
            .draft
            .clone()
            .ok_or_else(|| DprError::InvalidState("there is no draft to accept".into()))?;

        let mut next = session.project.clone();
        next.sections.insert(title.to_string(), draft);
        next.merge_variables(variable_updates);

        let saved_at = self.store.save(&session.user_id, &session.idea, &next).await?;
        next.updated_at = Some(saved_at);

        session.project = next;
        session.draft = None;
        session.cursor = index + 1;
        tracing::info!(chapter = index, title, "chapter accepted");

        if session.cursor == self.chapters.len() {
            session.phase = Phase::Complete;
            tracing::info!(idea = %session.idea, "report complete");
            return Ok(self.view(session));
        }

        // A draft saved earlier for the next chapter is offered as-is.
        let next_title = self.title(session.cursor)?;
        if let Some(existing) = session.project.draft(next_title) {
            session.draft = Some(existing.to_string());
            session.phase = Phase::AwaitingAcceptance(session.cursor);
            return Ok(self.view(session));
        }

        session.phase = Phase::Generating(session.cursor);
        self.generate_current_chapter(session).await
    }

    /// Save new or changed variable values. Chapters, cursor and phase stay
    /// put; the session only takes the values once the store confirms.
    pub async fn update_variables(
        &self,
        session: &mut ReportSession,
        updates: &VariableMap,
    ) -> Result<ChapterView, DprError> {
        if session.phase == Phase::Idle {
            return Err(DprError::InvalidState("no report loaded".into()));
        }
        if updates.is_empty() {
            return Ok(self.view(session));
        }
        let delta = ReportProject {
            variables: updates.clone(),
            ..Default::default()
        };
        let saved_at = self.store.save(&session.user_id, &session.idea, &delta).await?;
        session.project.merge_variables(updates);
        session.project.updated_at = Some(saved_at);
        tracing::info!(keys = updates.len(), "variables updated");
        Ok(self.view(session))
    }

    pub fn view(&self, session: &ReportSession) -> ChapterView {
        let vars = &session.project.variables;
        let rendered = session
            .draft
            .as_deref()
            .map(|d| self.placeholders.render(d, vars));
        let unresolved = rendered
            .as_deref()
            .map(|r| self.placeholders.find(r))
            .unwrap_or_default();
        ChapterView {
            phase: session.phase,
            index: session.cursor,
            chapter_count: self.chapters.len(),
            title: self.chapters.title(session.cursor).map(str::to_string),
            draft: session.draft.clone(),
            rendered,
            unresolved,
            complete: session.is_complete(),
        }
    }

    /// Accepted chapters in report order with variables filled in.
    pub fn assembled_document(&self, session: &ReportSession) -> Vec<(String, String)> {
        export::assemble(&self.chapters, &session.project, &self.placeholders)
    }

    fn title(&self, index: usize) -> Result<&str, DprError> {
        self.chapters
            .title(index)
            .ok_or_else(|| DprError::InvalidState(format!("chapter index {index} out of range")))
    }

    async fn draft_chapter(
        &self,
        session: &ReportSession,
        index: usize,
        revision: Option<&RevisionRequest>,
    ) -> Result<String, DprError> {
        let title = self.title(index)?;
        let prior = session.project.prior_sections(&self.chapters, index);
        let instruction = prompt::compose(&ChapterPrompt {
            idea: &session.idea,
            promoter_name: &session.promoter,
            chapter_title: title,
            prior_sections: &prior,
            variables: &session.project.variables,
            revision,
            placeholder_prefix: self.placeholders.prefix(),
        });

        let stage = if revision.is_some() {
            format!("chapter.{index}.revision")
        } else {
            format!("chapter.{index}")
        };
        let mut req = LlmRequest::new(stage, prompt::system_prompt_section(), instruction);
        if let Some(t) = self.temperature {
            req = req.with_temperature(t);
        }
        tracing::debug!(chapter = index, title, prompt_chars = req.user.len(), "requesting chapter draft");

        let raw = complete_cancellable(self.provider, &req, &self.cancel).await?;
        normalize::normalize_prose(&raw).inspect_err(|_| {
            tracing::warn!(chapter = index, title, raw = %raw, "model returned an empty chapter");
        })
    }
}

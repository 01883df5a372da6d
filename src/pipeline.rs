use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agents::{apply_cleaning, Cleaner, DocFilter, Intake, Planner, Writer};
use crate::config::{PipelineConfig, Settings};
use crate::docs::types::{Decision, Document, Stage, Workspace};
use crate::docs::WorkspaceStore;
use crate::error::Result;
use crate::llm::ChatModel;
use crate::retrieve::rerank::Reranker;
use crate::retrieve::Retriever;

/// Loop budget and stagnation rule for the plan → retrieve → filter cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopControl {
    pub max_iterations: u32,
    pub stop_on_stagnation: bool,
}

impl LoopControl {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_iterations: config.max_loops,
            stop_on_stagnation: config.stop_on_stagnation,
        }
    }

    /// Whether another iteration may start after `completed` ones.
    pub fn budget_left(&self, completed: u32) -> bool {
        completed < self.max_iterations
    }

    /// An iteration that added nothing ends the loop.
    pub fn is_stagnant(&self, added: usize) -> bool {
        self.stop_on_stagnation && added == 0
    }
}

/// Why the research loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Planner reported enough evidence (or proposed no searches).
    Satisfied,
    NoRetriever,
    PlannerFailed,
    Stagnated,
    BudgetExhausted,
}

/// Dedupe ledger for one run.
///
/// `retrieved` holds the key of every candidate the filter has ruled on, so a
/// page rejected under one sub-goal is not offered again under another.
/// `accepted` holds the keys of documents in the workspace.
struct SeenDocs {
    retrieved: HashSet<String>,
    accepted: HashSet<String>,
}

impl SeenDocs {
    fn from_workspace(ws: &Workspace) -> Self {
        let accepted: HashSet<String> = ws.docs.iter().map(Document::dedupe_key).collect();
        Self {
            retrieved: accepted.clone(),
            accepted,
        }
    }

    /// Candidates not seen before in this run, first occurrence wins.
    fn fresh(&self, candidates: Vec<Document>) -> Vec<Document> {
        let mut batch = HashSet::new();
        candidates
            .into_iter()
            .filter(|d| {
                let key = d.dedupe_key();
                !self.retrieved.contains(&key) && batch.insert(key)
            })
            .collect()
    }

    /// Record candidates the filter has ruled on.
    fn offered(&mut self, docs: &[Document]) {
        self.retrieved.extend(docs.iter().map(Document::dedupe_key));
    }

    fn accept(&mut self, doc: &Document) -> bool {
        self.accepted.insert(doc.dedupe_key())
    }
}

/// Drives one research session: intake, the evidence loop, then the answer.
pub struct Pipeline {
    config: PipelineConfig,
    store: WorkspaceStore,
    intake: Intake,
    planner: Planner,
    filter: DocFilter,
    cleaner: Cleaner,
    writer: Writer,
    retriever: Option<Arc<dyn Retriever>>,
    reranker: Option<Reranker>,
}

impl Pipeline {
    /// A failed retriever construction is not fatal: the run skips evidence
    /// gathering and answers from what the workspace already holds.
    pub fn new(
        settings: &Settings,
        store: WorkspaceStore,
        model: Arc<dyn ChatModel>,
        retriever: Result<Arc<dyn Retriever>>,
    ) -> Self {
        let config = settings.pipeline.clone();
        let retriever = match retriever {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "Retriever unavailable, runs will not gather new documents");
                None
            }
        };

        Self {
            intake: Intake::new(model.clone()),
            planner: Planner::new(model.clone()),
            filter: DocFilter::new(model.clone()),
            cleaner: Cleaner::new(model.clone(), config.clean_max_chars),
            writer: Writer::new(model, config.writer_max_docs, config.writer_max_chars_per_doc),
            config,
            store,
            retriever,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Create and persist a workspace, then ask for clarifying questions.
    pub async fn begin(&self, question: &str) -> Result<(Workspace, Vec<String>)> {
        let mut ws = Workspace::new(question);
        self.store.save(&mut ws).await?;
        info!(ws_id = %ws.id, "Workspace created");

        let questions = self
            .intake
            .clarify(question, self.config.clarify_questions)
            .await?;

        ws.stage = Stage::AwaitingAnswers;
        self.store.save(&mut ws).await?;
        Ok((ws, questions))
    }

    /// Continue with the user's answers: rewrite the goal, gather evidence,
    /// and write the answer. The writer runs exactly once.
    pub async fn proceed(
        &self,
        mut ws: Workspace,
        answers: &[String],
    ) -> Result<(Workspace, String)> {
        if ws.stage != Stage::AwaitingAnswers {
            warn!(ws_id = %ws.id, stage = ?ws.stage, "Proceeding from an unexpected stage");
        }

        let goal = match self.intake.rewrite(&ws.question, answers).await {
            Ok(goal) => goal,
            Err(e) => {
                warn!(error = %e, "Goal rewrite failed, using the original question");
                ws.question.clone()
            }
        };
        ws.set_goal(goal);
        ws.stage = Stage::Planning;
        self.store.save(&mut ws).await?;

        let exit = self.research(&mut ws).await?;
        info!(ws_id = %ws.id, exit = ?exit, docs = ws.docs.len(), "Research loop finished");

        if self.config.clean_docs {
            self.clean_pending(&mut ws).await;
            self.store.save(&mut ws).await?;
        }

        let answer = self.writer.compose(&ws).await?;
        ws.stage = Stage::Done;
        self.store.save(&mut ws).await?;
        Ok((ws, answer))
    }

    /// The plan → retrieve → filter loop. Only persistence errors escape;
    /// service failures end the iteration or the loop.
    async fn research(&self, ws: &mut Workspace) -> Result<LoopExit> {
        let Some(retriever) = self.retriever.as_ref() else {
            warn!("No retriever, going straight to the writer");
            return Ok(LoopExit::NoRetriever);
        };

        let control = LoopControl::from_config(&self.config);
        let mut seen = SeenDocs::from_workspace(ws);
        let mut completed = 0u32;

        loop {
            if !control.budget_left(completed) {
                return Ok(LoopExit::BudgetExhausted);
            }
            completed += 1;

            ws.stage = Stage::Planning;
            let decision = match self
                .planner
                .decide(ws.goal_or_question(), ws.docs.len())
                .await
            {
                Ok(d) => d,
                Err(e) => {
                    warn!(iteration = completed, error = %e, "Planning failed, ending loop");
                    return Ok(LoopExit::PlannerFailed);
                }
            };

            ws.add_sub_goals(decision.sub_goals.iter().cloned());
            self.store.save(ws).await?;

            if !decision.need_more || decision.sub_goals.is_empty() {
                return Ok(LoopExit::Satisfied);
            }

            let added = self
                .gather(ws, retriever.as_ref(), &decision, &mut seen)
                .await;
            self.store.save(ws).await?;
            info!(iteration = completed, added, total = ws.docs.len(), "Iteration complete");

            if control.is_stagnant(added) {
                return Ok(LoopExit::Stagnated);
            }
        }
    }

    /// Run each sub-goal in order; returns how many documents were added.
    async fn gather(
        &self,
        ws: &mut Workspace,
        retriever: &dyn Retriever,
        decision: &Decision,
        seen: &mut SeenDocs,
    ) -> usize {
        let mut added = 0usize;

        for sg in &decision.sub_goals {
            ws.stage = Stage::Retrieving;
            let candidates = match retriever.search(&sg.query, self.config.search_limit).await {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(query = %sg.query, error = %e, "Retrieval failed, skipping sub-goal");
                    continue;
                }
            };

            let fresh = seen.fresh(candidates);
            if fresh.is_empty() {
                debug!(query = %sg.query, "No unseen candidates");
                continue;
            }
            let fresh = self.rerank(&sg.query, fresh).await;

            ws.stage = Stage::Filtering;
            let kept = match self
                .filter
                .select(&ws.question, &sg.query, &fresh, self.config.filter_top_k)
                .await
            {
                Ok(kept) => {
                    seen.offered(&fresh);
                    kept
                }
                Err(e) => {
                    warn!(query = %sg.query, error = %e, "Filtering failed, skipping sub-goal");
                    continue;
                }
            };

            let accepted: Vec<Document> = kept.into_iter().filter(|d| seen.accept(d)).collect();
            added += accepted.len();
            ws.add_docs(accepted);
        }

        added
    }

    async fn rerank(&self, query: &str, docs: Vec<Document>) -> Vec<Document> {
        let Some(reranker) = &self.reranker else {
            return docs;
        };
        match reranker.rerank(query, docs.clone()).await {
            Ok(ordered) => ordered,
            Err(e) => {
                warn!(error = %e, "Rerank failed, keeping search order");
                docs
            }
        }
    }

    /// Clean every document not cleaned yet, in place.
    async fn clean_pending(&self, ws: &mut Workspace) {
        let pending: Vec<usize> = ws
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_cleaned())
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return;
        }

        let mut batch: Vec<Document> = pending.iter().map(|&i| ws.docs[i].clone()).collect();
        let outcomes = self.cleaner.clean_all(&batch).await;
        apply_cleaning(&mut batch, outcomes);
        for (i, doc) in pending.into_iter().zip(batch) {
            ws.docs[i] = doc;
        }
    }
}

//! Scripted collaborators shared by the integration tests. Each one replays a
//! fixed script and records what it was asked.

#![allow(dead_code)]

use async_trait::async_trait;
use nlq_engine::db::{ExecutionPayload, StatementStore, StoreError};
use nlq_engine::error::{NlqError, Result};
use nlq_engine::execution::{
    ExecutionHandle, ExecutionStatus, QueryEngine, ResultSet, SubmitContext,
};
use nlq_engine::llm::{GenerationRequest, Generator};
use nlq_engine::repair::{CorrectionRequest, CorrectionService};
use nlq_engine::schema::{ColumnDescriptor, SchemaSnapshot};
use nlq_engine::validator::{ExecutionValidator, PollWait};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub fn sample_schema() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_table(
            "sample_donations",
            vec![
                ColumnDescriptor::new("donationkey", "int"),
                ColumnDescriptor::new("campaignkey", "int"),
                ColumnDescriptor::new("donationamount", "decimal(10,2)"),
            ],
        )
        .with_table(
            "sample_campaigns",
            vec![
                ColumnDescriptor::new("campaignkey", "int"),
                ColumnDescriptor::new("campaignname", "varchar"),
            ],
        )
}

pub fn tagged(sql: &str) -> String {
    format!("Here is the query:\n<SQL>{}</SQL>", sql)
}

pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompt(&self, call: usize) -> String {
        self.requests.lock().unwrap()[call].prompt().to_string()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NlqError::Llm("generator script exhausted".to_string())))
    }
}

/// How the engine treats the next submitted statement.
pub enum EngineStep {
    Pass(ResultSet),
    Fail(String),
    SubmitError(String),
}

pub fn single_value(column: &str, value: &str) -> EngineStep {
    EngineStep::Pass(ResultSet::new(
        vec![column.to_string()],
        vec![vec![value.to_string()]],
    ))
}

/// Reports each statement as running once before its terminal state.
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<EngineStep>>,
    running: Mutex<HashMap<String, (bool, EngineStep)>>,
    pub submitted: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<EngineStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            running: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, sql: &str, _context: &SubmitContext) -> Result<ExecutionHandle> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(sql.to_string());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| EngineStep::Fail("engine script exhausted".to_string()));
        if let EngineStep::SubmitError(message) = step {
            return Err(NlqError::Engine(message));
        }
        let id = format!("exec-{}", submitted.len());
        self.running.lock().unwrap().insert(id.clone(), (false, step));
        Ok(ExecutionHandle(id))
    }

    async fn poll(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let mut running = self.running.lock().unwrap();
        let (polled, step) = running
            .get_mut(&handle.0)
            .ok_or_else(|| NlqError::Engine(format!("unknown handle {}", handle)))?;
        if !*polled {
            *polled = true;
            return Ok(ExecutionStatus::Running);
        }
        Ok(match step {
            EngineStep::Pass(_) => ExecutionStatus::Succeeded,
            EngineStep::Fail(reason) => ExecutionStatus::Failed {
                reason: reason.clone(),
            },
            EngineStep::SubmitError(_) => unreachable!("submit errors never get a handle"),
        })
    }

    async fn fetch(&self, handle: &ExecutionHandle) -> Result<ResultSet> {
        match self.running.lock().unwrap().remove(&handle.0) {
            Some((_, EngineStep::Pass(results))) => Ok(results),
            _ => Err(NlqError::Engine(format!("nothing to fetch for {}", handle))),
        }
    }
}

pub struct NoWait;

#[async_trait]
impl PollWait for NoWait {
    async fn wait(&self) {}
}

pub fn validator_for(engine: Arc<ScriptedEngine>, context: SubmitContext) -> Arc<ExecutionValidator> {
    Arc::new(ExecutionValidator::new(engine, Arc::new(NoWait), context))
}

pub struct ScriptedStore {
    results: Mutex<VecDeque<std::result::Result<ExecutionPayload, StoreError>>>,
    fallback: Option<StoreError>,
    pub executed: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new(results: Vec<std::result::Result<ExecutionPayload, StoreError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            fallback: None,
            executed: Mutex::new(Vec::new()),
        })
    }

    /// Every execution fails with the same statement error.
    pub fn always_failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(VecDeque::new()),
            fallback: Some(StoreError::Statement(message.to_string())),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementStore for ScriptedStore {
    async fn execute(&self, sql: &str) -> std::result::Result<ExecutionPayload, StoreError> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Err(self
                .fallback
                .clone()
                .unwrap_or_else(|| StoreError::Connection("store script exhausted".to_string()))),
        }
    }
}

pub enum CorrectionStep {
    Replace(String),
    Nothing,
    Error(String),
}

pub struct ScriptedCorrector {
    steps: Mutex<VecDeque<CorrectionStep>>,
    numbered: bool,
    pub requests: Mutex<Vec<(CorrectionRequest, String)>>,
}

impl ScriptedCorrector {
    pub fn new(steps: Vec<CorrectionStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            numbered: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `fix_<n>` where n counts requests from 1.
    pub fn numbered() -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            numbered: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CorrectionService for ScriptedCorrector {
    async fn correct(
        &self,
        request: &CorrectionRequest,
        correlation_id: &str,
    ) -> Result<Option<String>> {
        let mut requests = self.requests.lock().unwrap();
        requests.push((request.clone(), correlation_id.to_string()));
        if self.numbered {
            return Ok(Some(format!("select fix_{}", requests.len())));
        }
        match self.steps.lock().unwrap().pop_front() {
            Some(CorrectionStep::Replace(sql)) => Ok(Some(sql)),
            Some(CorrectionStep::Nothing) | None => Ok(None),
            Some(CorrectionStep::Error(message)) => Err(NlqError::Llm(message)),
        }
    }
}

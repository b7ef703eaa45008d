//! The RAG orchestration graph: six nodes over [`AgentState`].
//!
//! ```text
//! START → split_rewrite → retrieve ─┬→ dynamic_widen ─┬→ retrieve (loop)
//!                                   │                 └→ generate_answer
//!                                   ├→ tool_router ─┬→ run_tool → generate_answer
//!                                   │               └→ generate_answer
//!                                   └→ generate_answer → END
//! ```
//!
//! The retrieve↔widen cycle is bounded by the widening attempt cap; the
//! compiled graph's step budget (`nodes + 2 × max_attempts`) backstops it.

mod dynamic_widen;
mod generate_answer;
mod retrieve;
mod runner;
mod split_rewrite;
mod tool_router;

pub use dynamic_widen::DynamicWidenNode;
pub use generate_answer::GenerateAnswerNode;
pub use retrieve::RetrieveNode;
pub use runner::{ChatRequest, IncomingMessage, InitialState, RagRunner};
pub use split_rewrite::SplitRewriteNode;
pub use tool_router::{detect_tools, RunToolNode, ToolRouterNode, ToolRunConfig};

use std::collections::HashMap;
use std::sync::Arc;

use crate::embed::Embedder;
use crate::graph::{CompileError, CompiledGraph, StateGraph, END, START};
use crate::llm::LlmAdapter;
use crate::memory::CheckpointStore;
use crate::pipeline::ContentStore;
use crate::prompt::{InjectionFilter, PromptAssembler};
use crate::state::AgentState;
use crate::tools::ToolRegistry;
use crate::vector::VectorAdapter;

pub const SPLIT_REWRITE: &str = "split_rewrite";
pub const RETRIEVE: &str = "retrieve";
pub const DYNAMIC_WIDEN: &str = "dynamic_widen";
pub const TOOL_ROUTER: &str = "tool_router";
pub const RUN_TOOL: &str = "run_tool";
pub const GENERATE_ANSWER: &str = "generate_answer";

/// Widening policy: when retrieval comes back thin, double the breadth (up
/// to a cap) and retry, at most `max_attempts` times.
#[derive(Debug, Clone, Copy)]
pub struct WidenConfig {
    /// Fewer docs than this triggers widening.
    pub threshold: usize,
    pub max_attempts: u32,
    pub growth_factor: usize,
    pub top_k_cap: usize,
}

impl Default for WidenConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            max_attempts: 2,
            growth_factor: 2,
            top_k_cap: 50,
        }
    }
}

/// Everything the graph nodes need, built once at process start.
#[derive(Clone)]
pub struct RagDeps {
    pub llm: Arc<LlmAdapter>,
    pub embedder: Arc<Embedder>,
    pub vectors: Arc<VectorAdapter>,
    pub content: Arc<dyn ContentStore>,
    pub tools: Arc<ToolRegistry>,
    pub assembler: Arc<PromptAssembler>,
    pub injection: Arc<InjectionFilter>,
    pub widen: WidenConfig,
    pub tool_run: ToolRunConfig,
}

/// Routing after retrieve: widen when results are thin (or a widening pass is
/// in flight), else tool when the query matches a tool pattern, else answer.
fn route_after_retrieve(state: &AgentState, widen: WidenConfig) -> &'static str {
    let widening_possible = state.options.enhance_with_context
        && state.docs.len() < widen.threshold
        && state.tasks.widening_attempts < widen.max_attempts;
    if state.tasks.needs_widening || widening_possible {
        return "widen";
    }
    if !detect_tools(state.active_query()).is_empty() {
        return "tool";
    }
    "answer"
}

/// Routing after dynamic_widen: back into retrieve while a widening pass is
/// active, else straight to answer.
fn route_after_widen(state: &AgentState) -> &'static str {
    if state.tasks.needs_widening {
        RETRIEVE
    } else {
        GENERATE_ANSWER
    }
}

/// Builds and compiles the RAG graph.
pub fn build_rag_graph(
    deps: &RagDeps,
    checkpoints: Option<Arc<dyn CheckpointStore<AgentState>>>,
) -> Result<CompiledGraph<AgentState>, CompileError> {
    let mut graph = StateGraph::<AgentState>::new();
    graph.add_node(SPLIT_REWRITE, Arc::new(SplitRewriteNode::new(deps.llm.clone())));
    graph.add_node(
        RETRIEVE,
        Arc::new(RetrieveNode::new(
            deps.embedder.clone(),
            deps.vectors.clone(),
            deps.content.clone(),
        )),
    );
    graph.add_node(DYNAMIC_WIDEN, Arc::new(DynamicWidenNode::new(deps.widen)));
    graph.add_node(TOOL_ROUTER, Arc::new(ToolRouterNode));
    graph.add_node(
        RUN_TOOL,
        Arc::new(RunToolNode::new(deps.tools.clone(), deps.tool_run.clone())),
    );
    graph.add_node(
        GENERATE_ANSWER,
        Arc::new(GenerateAnswerNode::new(
            deps.llm.clone(),
            deps.assembler.clone(),
        )),
    );

    graph.add_edge(START, SPLIT_REWRITE);
    graph.add_edge(SPLIT_REWRITE, RETRIEVE);
    let widen = deps.widen;
    graph.add_conditional_edges(
        RETRIEVE,
        Arc::new(move |state: &AgentState| route_after_retrieve(state, widen).to_string()),
        Some(HashMap::from([
            ("widen".to_string(), DYNAMIC_WIDEN.to_string()),
            ("tool".to_string(), TOOL_ROUTER.to_string()),
            ("answer".to_string(), GENERATE_ANSWER.to_string()),
        ])),
    );
    graph.add_conditional_edges(
        DYNAMIC_WIDEN,
        Arc::new(|state: &AgentState| route_after_widen(state).to_string()),
        None,
    );
    graph.add_conditional_edges(
        TOOL_ROUTER,
        Arc::new(|state: &AgentState| {
            if state.tasks.tool_to_run.is_some() {
                RUN_TOOL.to_string()
            } else {
                GENERATE_ANSWER.to_string()
            }
        }),
        None,
    );
    graph.add_edge(RUN_TOOL, GENERATE_ANSWER);
    graph.add_edge(GENERATE_ANSWER, END);

    // Termination bound: node count plus two transitions per widening pass.
    let step_limit = 6 + 2 * deps.widen.max_attempts as usize;
    let graph = graph.with_step_limit(step_limit);

    match checkpoints {
        Some(store) => graph.compile_with_checkpointer(store),
        None => graph.compile(),
    }
}

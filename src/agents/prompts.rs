use serde_json::{json, Value};

pub const CLARIFY_SCHEMA_NAME: &str = "clarify_questions";
pub const GOAL_SCHEMA_NAME: &str = "rewritten_goal";
pub const PLAN_SCHEMA_NAME: &str = "plan_decision";
pub const KEEP_SCHEMA_NAME: &str = "doc_selection";

/// Upper bound the planner schema puts on sub-goals per decision.
pub const MAX_SUB_GOALS: usize = 5;

pub fn clarify_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "items": {"type": "string"},
                "minItems": 1,
                "maxItems": 10
            }
        },
        "required": ["questions"],
        "additionalProperties": false
    })
}

pub fn goal_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"goal": {"type": "string", "minLength": 1}},
        "required": ["goal"],
        "additionalProperties": false
    })
}

pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "need_more": {"type": "boolean"},
            "sub_goals": {
                "type": "array",
                "items": {"type": "string"},
                "maxItems": MAX_SUB_GOALS
            }
        },
        "required": ["need_more", "sub_goals"],
        "additionalProperties": false
    })
}

pub fn keep_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keep": {
                "type": "array",
                "items": {"type": "integer", "minimum": 0},
                "minItems": 0,
                "maxItems": 20,
                "uniqueItems": true
            }
        },
        "required": ["keep"],
        "additionalProperties": false
    })
}

pub fn clarify(question: &str, max_questions: usize) -> String {
    format!(
        r#"Answer strictly as one JSON object matching the schema. No prose, comments or explanations.
The only key is "questions".

Rules:
- Each question is at most 25 words and has no trailing punctuation.
- Do not restate the original question. Clarify scope, conditions, constraints, time range,
  region, data sources, evaluation criteria and priorities.

Question: {question}
Produce at most {max_questions} clarifying questions."#
    )
}

pub fn rewrite(question: &str, answers: &str) -> String {
    format!(
        r#"Answer strictly as one JSON object matching the schema. No prose, comments or explanations.
The only key is "goal".

Rules:
- Merge the original question and the supplementary answers into a single clear,
  searchable, actionable goal sentence.
- Absorb every constraint from the answers (time, region, input/output format,
  evaluation criteria, data sources, priorities).
- Do not invent details. Where information is missing use a neutral placeholder
  such as "the specified dataset" or "the given time range".
- At most 50 words, no colloquialisms.

Original question: {question}
Supplementary answers:
{answers}
Rewritten goal:"#
    )
}

pub fn plan(goal: &str, doc_count: usize) -> String {
    format!(
        r#"Answer strictly as one JSON object matching the schema.
Task: decide from the current workspace whether more material is needed. If so, write
several sub-goal queries into "sub_goals", each answerable by a single web search.

Every sub-goal must be:
- a complete query that can be pasted straight into a search engine;
- self-contained, with no references like "this" or "the above";
- atomic: one search yields the main answer or an authoritative entry point, no multi-hop chains;
- specific: pin down time, region, subject, version or source; avoid vague words like "latest";
- searchable: use operators such as site:, filetype:, intitle:, OR or quoted phrases where useful;
- explicit about the information type (definition, comparison, tutorial, API, pricing, review, paper, code);
- at most 120 characters, no labels or explanations;
- distinct from the others. Compare things by querying each side separately.

Set "need_more":
- true when Docs count is 0, or the goal has ambiguous terms, lacks time/region,
  needs external fact checking or authoritative sources;
- false when the existing documents answer the goal directly.

Goal: {goal}
Docs count: {doc_count}
Output JSON only."#
    )
}

pub fn filter(query: &str, subquery: &str, catalog: &str) -> String {
    format!(
        r#"You select source material. The input is a question, a sub-question and a numbered
candidate list. Output the indices of the candidates worth keeping as JSON, strictly
following the schema; the key must be "keep". If nothing is worth keeping, output {{"keep": []}}.

Main question: {query}
Sub-question: {subquery}

Candidates:
{catalog}

Output only the JSON."#
    )
}

pub fn clean(content: &str) -> String {
    format!(
        r#"You are a text cleaner. Apply minimal but effective cleaning and output only the cleaned plain text.
- Remove: mojibake, meaningless character runs, navigation, ads, copyright footers, repeated
  headers/footers, very long repeated lines, large base64 or hex blobs, empty table borders.
- Keep: main points, definitions, conclusions, data, formulas (as plain text), headings,
  sub-headings and list items.
- Normalise: deduplicate, collapse whitespace, join broken sentences, keep the heading →
  paragraph → list structure readable.
- Never add information, explanations, JSON or markup wrappers.

Text to clean:
{content}"#
    )
}

pub fn write(question: &str, goal: &str, contexts: &str) -> String {
    format!(
        r#"Answer the user's question from the candidate excerpts below.
- Give the answer directly; do not describe your process.
- Do not write "references", "sources" or "links" in the body.
- Do not output URLs. A source list is appended automatically afterwards.

Question:
{question}

Goal:
{goal}

Candidate excerpts (may already be cleaned; use them, do not paste long passages verbatim):
{contexts}
"#
    )
}

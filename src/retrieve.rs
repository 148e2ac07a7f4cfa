//! 知识检索
//!
//! Retriever 是不透明的检索后端：输入问题与已有知识，返回新增的知识片段，或 NoResults。
//! KeywordRetriever 按词重叠数打分（小写、去标点、去停用词），只返回得分 > 0 且尚未在会话知识中的前 k 篇。

use std::collections::HashSet;

use async_trait::async_trait;

use crate::core::{AgentError, KnowledgeChunk};

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn fetch(
        &self,
        question: &str,
        knowledge: &[KnowledgeChunk],
    ) -> Result<Vec<KnowledgeChunk>, AgentError>;
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "is", "it", "me", "of", "on", "or", "the", "to", "was", "what", "when", "where", "which",
    "who", "why", "with", "you",
];

/// 切分为小写词集合：去掉首尾标点、单字符与停用词
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// 内置语料
pub fn seed_corpus() -> Vec<KnowledgeChunk> {
    vec![
        KnowledgeChunk::new(
            "LangGraph",
            "LangGraph helps build stateful, multi-step LLM apps using graph-based control flow and explicit state.",
        ),
        KnowledgeChunk::new(
            "LangChain",
            "LangChain provides building blocks for LLM apps (prompts, chains, retrievers, tools).",
        ),
        KnowledgeChunk::new(
            "Agent pattern",
            "A practical agent is a goal-directed state machine where an LLM helps choose transitions and code enforces guardrails.",
        ),
    ]
}

/// 关键词检索：内存语料 + 词重叠打分
pub struct KeywordRetriever {
    docs: Vec<(KnowledgeChunk, HashSet<String>)>,
    top_k: usize,
}

impl KeywordRetriever {
    pub fn new(corpus: Vec<KnowledgeChunk>) -> Self {
        let docs = corpus
            .into_iter()
            .map(|doc| {
                let tokens = tokenize_lower(&format!("{} {}", doc.title, doc.text));
                (doc, tokens)
            })
            .collect();
        Self { docs, top_k: 2 }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl Default for KeywordRetriever {
    fn default() -> Self {
        Self::new(seed_corpus())
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn fetch(
        &self,
        question: &str,
        knowledge: &[KnowledgeChunk],
    ) -> Result<Vec<KnowledgeChunk>, AgentError> {
        let query = tokenize_lower(question);
        let mut scored: Vec<(usize, &KnowledgeChunk)> = self
            .docs
            .iter()
            .filter(|(doc, _)| !knowledge.iter().any(|k| k.text == doc.text))
            .map(|(doc, tokens)| (query.intersection(tokens).count(), doc))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 稳定排序：同分保持语料顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let hits: Vec<KnowledgeChunk> = scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, doc)| doc.clone())
            .collect();
        tracing::info!(hits = hits.len(), "retrieval");
        if hits.is_empty() {
            return Err(AgentError::NoResults(question.to_string()));
        }
        Ok(hits)
    }
}

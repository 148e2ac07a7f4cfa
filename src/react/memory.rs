//! 推理记忆：Reflector 的笔记与滚动摘要
//!
//! 笔记只供认知层参考，从不影响控制流。每积累 memory_every 条新笔记做一次压缩：
//! 除最近 KEEP_RECENT 条外全部并入摘要。

use serde::{Deserialize, Serialize};

/// 压缩后保留的最近笔记条数
pub const KEEP_RECENT: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningMemory {
    notes: Vec<String>,
    summary: Option<String>,
    /// 上次检查压缩时的笔记条数
    last_memory_at: usize,
}

impl ReasoningMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// 自上次检查以来新增的笔记数是否达到阈值
    pub fn due(&self, every: u32) -> bool {
        self.notes.len().saturating_sub(self.last_memory_at) >= every as usize
    }

    /// 需要并入摘要的旧笔记
    pub fn compressible(&self) -> &[String] {
        let cut = self.notes.len().saturating_sub(KEEP_RECENT);
        &self.notes[..cut]
    }

    /// 用新摘要替换旧笔记，返回 (并入条数, 保留条数)
    pub fn compress(&mut self, summary: String) -> (usize, usize) {
        let cut = self.notes.len().saturating_sub(KEEP_RECENT);
        self.notes.drain(..cut);
        self.summary = Some(summary);
        self.last_memory_at = self.notes.len();
        (cut, self.notes.len())
    }

    /// 没有可压缩内容时只推进检查点
    pub fn mark_checked(&mut self) {
        self.last_memory_at = self.notes.len();
    }

    pub fn to_prompt_section(&self) -> String {
        let mut s = String::new();
        if let Some(summary) = &self.summary {
            s.push_str(&format!("## Memory summary\n{}\n\n", summary));
        }
        if !self.notes.is_empty() {
            s.push_str("## Recent notes\n");
            for n in &self.notes {
                s.push_str(&format!("- {}\n", n));
            }
            s.push('\n');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_and_compress_keep_recent_notes() {
        let mut m = ReasoningMemory::new();
        for i in 0..5 {
            m.push_note(format!("note {i}"));
        }
        assert!(m.due(4));
        assert_eq!(m.compressible().len(), 1);

        let (summarized, kept) = m.compress("old stuff".into());
        assert_eq!((summarized, kept), (1, 4));
        assert_eq!(m.notes()[0], "note 1");
        assert_eq!(m.summary(), Some("old stuff"));
        assert!(!m.due(4));
    }

    #[test]
    fn test_mark_checked_moves_checkpoint_only() {
        let mut m = ReasoningMemory::new();
        m.push_note("a");
        m.push_note("b");
        assert!(m.due(2));
        assert!(m.compressible().is_empty());
        m.mark_checked();
        assert!(!m.due(1));
        assert_eq!(m.notes().len(), 2);
    }

    #[test]
    fn test_prompt_section() {
        let mut m = ReasoningMemory::new();
        assert!(m.to_prompt_section().is_empty());
        m.push_note("x");
        assert!(m.to_prompt_section().contains("## Recent notes\n- x"));
    }
}

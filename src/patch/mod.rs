//! 编辑落地引擎
//!
//! 智能体基于某一时刻的文档快照生成编辑，落地时文档可能已变化。每个操作按以下顺序在当前文档上解析，
//! 首个成功者生效：
//! 1. 精确：字面子串匹配，按 count 替换最左 1 处 / N 处 / 全部
//! 2. 归一化：忽略大小写，任意空白串匹配任意空白串（换行重排）
//! 3. 行级（仅修订路径开启）：逐行相似度匹配，见 [`line`]
//! 4. 近似窗口：长度为 len(find) 的窗口按 max(50, len/10) 步长滑动，词集 Jaccard ≥ 0.9 时替换
//! 5. 兜底：追加到文末并打 warn，不静默丢弃
//!
//! 操作按顺序执行，第 N 个操作看到的是第 N-1 个操作修改后的文档。

pub mod line;
pub mod operation;
pub mod similarity;

use regex::{NoExpand, RegexBuilder};
use serde::Serialize;

pub use line::{find_similar_lines, LineMatch};
pub use operation::{EditOperation, ReplaceCount};
pub use similarity::{
    jaccard_similarity, line_similarity, word_set, LINE_SIMILARITY_FLOOR, WINDOW_JACCARD_FLOOR,
};

/// 窗口滑动的最小步长（字符）
const MIN_WINDOW_STEP: usize = 50;

/// 操作最终由哪一级解析
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Normalized,
    Line { score: f32 },
    Approximate { score: f32 },
    Appended,
}

/// 单个操作的落地结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub tier: MatchTier,
    /// 实际替换处数（追加记为 0）
    pub replacements: usize,
}

/// 一组操作的落地报告
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<OperationOutcome>,
}

impl ApplyReport {
    /// 走兜底追加的操作数
    pub fn appended(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.tier == MatchTier::Appended)
            .count()
    }

    /// 在原位替换的操作数
    pub fn matched(&self) -> usize {
        self.outcomes.len() - self.appended()
    }

    /// 一行摘要，写入历史记录
    pub fn summary(&self) -> String {
        format!(
            "{} operation(s): {} matched, {} appended",
            self.outcomes.len(),
            self.matched(),
            self.appended()
        )
    }
}

/// 落地选项
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    /// 是否启用行级匹配（修订路径）
    pub line_matching: bool,
}

impl PatchOptions {
    pub fn revision() -> Self {
        Self {
            line_matching: true,
        }
    }
}

/// 顺序应用一组操作，返回新文档与报告
pub fn apply_operations(
    document: &str,
    operations: &[EditOperation],
    options: PatchOptions,
) -> (String, ApplyReport) {
    let mut doc = document.to_string();
    let mut report = ApplyReport::default();
    for op in operations {
        let (next, outcome) = apply_operation(&doc, op, options);
        doc = next;
        report.outcomes.push(outcome);
    }
    (doc, report)
}

/// 在当前文档上解析并应用单个操作
pub fn apply_operation(
    document: &str,
    op: &EditOperation,
    options: PatchOptions,
) -> (String, OperationOutcome) {
    if op.find.trim().is_empty() {
        tracing::warn!("edit operation has empty find, appending to end of document");
        return append(document, &op.replace);
    }

    if let Some(result) = apply_exact(document, op) {
        return result;
    }
    if let Some(result) = apply_normalized(document, op) {
        return result;
    }
    if options.line_matching {
        if let Some(m) = find_similar_lines(document, &op.find) {
            let mut doc = String::with_capacity(document.len() + op.replace.len());
            doc.push_str(&document[..m.range.start]);
            doc.push_str(&op.replace);
            doc.push_str(&document[m.range.end..]);
            return (
                doc,
                OperationOutcome {
                    tier: MatchTier::Line { score: m.score },
                    replacements: 1,
                },
            );
        }
    }
    if let Some((range, score)) = best_window(document, &op.find) {
        let mut doc = String::with_capacity(document.len() + op.replace.len());
        doc.push_str(&document[..range.start]);
        doc.push_str(&op.replace);
        doc.push_str(&document[range.end..]);
        return (
            doc,
            OperationOutcome {
                tier: MatchTier::Approximate { score },
                replacements: 1,
            },
        );
    }

    let preview: String = op.find.chars().take(80).collect();
    tracing::warn!(find = %preview, "no match for edit operation, appending replacement to end of document");
    append(document, &op.replace)
}

/// 仅做第一级精确匹配；无匹配时返回 None（引用插入只接受逐字命中）
pub fn apply_exact(document: &str, op: &EditOperation) -> Option<(String, OperationOutcome)> {
    let occurrences = document.matches(op.find.as_str()).count();
    if occurrences == 0 {
        return None;
    }
    let count = op.replace_count();
    let doc = match count {
        ReplaceCount::All => document.replace(&op.find, &op.replace),
        ReplaceCount::N(n) => document.replacen(&op.find, &op.replace, n),
    };
    let replacements = match count {
        ReplaceCount::All => occurrences,
        ReplaceCount::N(n) => occurrences.min(n),
    };
    Some((
        doc,
        OperationOutcome {
            tier: MatchTier::Exact,
            replacements,
        },
    ))
}

fn apply_normalized(document: &str, op: &EditOperation) -> Option<(String, OperationOutcome)> {
    let parts: Vec<String> = op.find.split_whitespace().map(regex::escape).collect();
    if parts.is_empty() {
        return None;
    }
    let re = RegexBuilder::new(&parts.join(r"\s+"))
        .case_insensitive(true)
        .build()
        .ok()?;

    let occurrences = re.find_iter(document).count();
    if occurrences == 0 {
        return None;
    }
    let count = op.replace_count();
    let doc = re
        .replacen(document, count.limit(), NoExpand(&op.replace))
        .into_owned();
    let replacements = match count {
        ReplaceCount::All => occurrences,
        ReplaceCount::N(n) => occurrences.min(n),
    };
    Some((
        doc,
        OperationOutcome {
            tier: MatchTier::Normalized,
            replacements,
        },
    ))
}

/// 第三级：滑动窗口 + Jaccard。先按步长粗扫，再在最佳窗口附近按词首位置细扫。
/// 窗口边界对齐到词边界，避免截断的半个词拉低分数。返回字节区间与分数（仅当分数 ≥ 阈值）。
fn best_window(document: &str, find: &str) -> Option<(std::ops::Range<usize>, f32)> {
    let target = word_set(find);
    if target.is_empty() {
        return None;
    }

    let chars: Vec<(usize, char)> = document.char_indices().collect();
    let n = chars.len();
    let win = find.chars().count();
    if n == 0 || win == 0 {
        return None;
    }
    let byte_at = |ci: usize| chars.get(ci).map_or(document.len(), |(b, _)| *b);

    let score_window = |start: usize| -> (usize, usize, f32) {
        let (s, e) = snap_to_words(&chars, start, (start + win).min(n));
        let text = &document[byte_at(s)..byte_at(e)];
        (s, e, jaccard_similarity(&target, &word_set(text)))
    };

    let step = MIN_WINDOW_STEP.max(win / 10);
    let last_start = n.saturating_sub(win);
    let mut starts: Vec<usize> = (0..=last_start).step_by(step).collect();
    if starts.last() != Some(&last_start) {
        starts.push(last_start);
    }

    let mut best_start = 0;
    let mut best = (0, 0, -1.0f32);
    for &s in &starts {
        let scored = score_window(s);
        if scored.2 > best.2 {
            best = scored;
            best_start = s;
        }
    }

    // 细扫：最佳粗窗口前后一个步长内的每个词首
    let lo = best_start.saturating_sub(step);
    let hi = (best_start + step).min(last_start);
    for s in lo..=hi {
        let at_word_start = chars[s].1.is_alphanumeric()
            && (s == 0 || !chars[s - 1].1.is_alphanumeric() || similarity::is_cjk(chars[s].1));
        if !at_word_start {
            continue;
        }
        let scored = score_window(s);
        if scored.2 > best.2 {
            best = scored;
        }
    }

    let (s, e, score) = best;
    if score >= WINDOW_JACCARD_FLOOR {
        Some((byte_at(s)..byte_at(e), score))
    } else {
        None
    }
}

/// 把 [start, end) 扩展到完整的词：起点回退到所在词首，终点前进到所在词尾
fn snap_to_words(chars: &[(usize, char)], mut start: usize, mut end: usize) -> (usize, usize) {
    let is_word = |i: usize| chars[i].1.is_alphanumeric() && !similarity::is_cjk(chars[i].1);
    while start > 0 && start < chars.len() && is_word(start) && is_word(start - 1) {
        start -= 1;
    }
    while end > 0 && end < chars.len() && is_word(end) && is_word(end - 1) {
        end += 1;
    }
    (start, end)
}

fn append(document: &str, text: &str) -> (String, OperationOutcome) {
    let mut doc = document.to_string();
    if !doc.is_empty() && !text.is_empty() {
        if doc.ends_with("\n\n") {
        } else if doc.ends_with('\n') {
            doc.push('\n');
        } else {
            doc.push_str("\n\n");
        }
    }
    doc.push_str(text);
    (
        doc,
        OperationOutcome {
            tier: MatchTier::Appended,
            replacements: 0,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_one(doc: &str, op: EditOperation) -> (String, OperationOutcome) {
        apply_operation(doc, &op, PatchOptions::default())
    }

    #[test]
    fn test_sky_example() {
        let (doc, outcome) = apply_one(
            "The sky is blue.",
            EditOperation::new("sky is blue", "sky is grey").with_count(ReplaceCount::N(1)),
        );
        assert_eq!(doc, "The sky is grey.");
        assert_eq!(outcome.tier, MatchTier::Exact);
        assert_eq!(outcome.replacements, 1);
    }

    #[test]
    fn test_exact_length_delta_and_untouched_text() {
        let original = "Alpha beta gamma. Delta epsilon zeta. Alpha beta gamma.";
        let op = EditOperation::new("Delta epsilon", "Delta, epsilon and eta");
        let (doc, _) = apply_one(original, op.clone());
        assert_eq!(
            doc.len() as isize - original.len() as isize,
            op.replace.len() as isize - op.find.len() as isize
        );
        assert!(doc.starts_with("Alpha beta gamma. "));
        assert!(doc.ends_with(" zeta. Alpha beta gamma."));
    }

    #[test]
    fn test_exact_counts() {
        let doc = "a x a x a";
        let (once, o1) = apply_one(doc, EditOperation::new("a", "b"));
        assert_eq!(once, "b x a x a");
        assert_eq!(o1.replacements, 1);

        let (two, o2) = apply_one(doc, EditOperation::new("a", "b").with_count(ReplaceCount::N(2)));
        assert_eq!(two, "b x b x a");
        assert_eq!(o2.replacements, 2);

        let (all, o3) = apply_one(doc, EditOperation::new("a", "b").with_count(ReplaceCount::All));
        assert_eq!(all, "b x b x b");
        assert_eq!(o3.replacements, 3);
    }

    #[test]
    fn test_normalized_reflowed_whitespace() {
        let doc = "Intro.\nThe results were\n   clearly significant across\tall trials.\nOutro.";
        let op = EditOperation::new(
            "the results were clearly significant across all trials.",
            "The results were significant.",
        );
        let (out, outcome) = apply_one(doc, op);
        assert_eq!(outcome.tier, MatchTier::Normalized);
        assert_eq!(out, "Intro.\nThe results were significant.\nOutro.");
    }

    #[test]
    fn test_normalized_does_not_expand_dollar() {
        let doc = "cost is\nfive dollars";
        let op = EditOperation::new("cost is five dollars", "cost is $5");
        let (out, outcome) = apply_one(doc, op);
        assert_eq!(outcome.tier, MatchTier::Normalized);
        assert_eq!(out, "cost is $5");
    }

    #[test]
    fn test_approximate_window_replaces_close_text() {
        let filler = "Unrelated preamble text about other matters entirely. ".repeat(4);
        let passage = "Deep learning models require large datasets and careful tuning of many hyperparameters to generalize well across domains while remaining robust under shifting practical conditions";
        let doc = format!("{filler}{passage}. Closing remarks follow here.");
        // 24 个词中替换一个等长词（datasets -> database），Jaccard = 23/25
        let find = "Deep learning models require large database and careful tuning of many hyperparameters to generalize well across domains while remaining robust under shifting practical conditions";
        let (out, outcome) = apply_one(&doc, EditOperation::new(find, "REPLACED"));
        match outcome.tier {
            MatchTier::Approximate { score } => assert!(score >= WINDOW_JACCARD_FLOOR),
            other => panic!("expected approximate match, got {other:?}"),
        }
        assert!(out.contains("REPLACED"));
        assert!(out.starts_with(&filler));
        assert!(!out.contains("hyperparameters"));
    }

    #[test]
    fn test_no_approximate_below_threshold() {
        let doc = "The committee approved the budget after a long debate on Tuesday.";
        let find = "The council rejected the proposal after a short debate on Monday.";
        let (out, outcome) = apply_one(doc, EditOperation::new(find, "NEW"));
        assert_eq!(outcome.tier, MatchTier::Appended);
        assert!(out.starts_with(doc));
        assert!(out.ends_with("\n\nNEW"));
    }

    #[test]
    fn test_fallback_appends() {
        let (out, outcome) = apply_one("Body text.\n", EditOperation::new("missing", "Added."));
        assert_eq!(outcome.tier, MatchTier::Appended);
        assert_eq!(out, "Body text.\n\nAdded.");
    }

    #[test]
    fn test_empty_find_appends() {
        let (out, outcome) = apply_one("", EditOperation::append("# Title"));
        assert_eq!(outcome.tier, MatchTier::Appended);
        assert_eq!(out, "# Title");
    }

    #[test]
    fn test_operations_see_previous_results() {
        let ops = vec![
            EditOperation::new("one", "two"),
            EditOperation::new("two", "three"),
        ];
        let (out, report) = apply_operations("one", &ops, PatchOptions::default());
        assert_eq!(out, "three");
        assert_eq!(report.matched(), 2);
        assert_eq!(report.appended(), 0);
    }

    #[test]
    fn test_line_tier_only_on_revision_path() {
        let doc = "Para one line A is here.\nPara one line B is here.\n";
        let find = "Para one line A is hare.\nPara one line B is hare.";
        let (_, outcome) = apply_operation(doc, &EditOperation::new(find, "X"), PatchOptions::revision());
        assert!(matches!(outcome.tier, MatchTier::Line { .. }));
    }

    #[test]
    fn test_unicode_document_window() {
        let doc = "前言。深度学习模型需要大量数据。结尾。";
        let (out, outcome) = apply_one(doc, EditOperation::new("深度学习模型需要大量数据", "新句子"));
        assert_eq!(outcome.tier, MatchTier::Exact);
        assert_eq!(out, "前言。新句子。结尾。");
    }
}

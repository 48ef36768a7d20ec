//! 行级近似匹配（修订路径）
//!
//! 在文档中寻找与 find 行数相同的连续行区间，要求每一行的相似度都不低于 LINE_SIMILARITY_FLOOR，
//! 取平均相似度最高的区间。比较前去掉行首尾空白。

use std::ops::Range;

use super::similarity::{line_similarity, LINE_SIMILARITY_FLOOR};

/// 行级匹配结果：文档中的字节区间与平均相似度
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub range: Range<usize>,
    pub score: f32,
}

/// 查找与 find 最相似的连续行区间；find 少于两行时不参与（单行交给窗口匹配）
pub fn find_similar_lines(document: &str, find: &str) -> Option<LineMatch> {
    let find_lines: Vec<&str> = find.trim().lines().map(str::trim).collect();
    if find_lines.len() < 2 {
        return None;
    }

    // (行内容, 行起始字节, 行结束字节，不含换行)
    let mut doc_lines: Vec<(&str, usize, usize)> = Vec::new();
    let mut offset = 0;
    for raw in document.split_inclusive('\n') {
        let content = raw.strip_suffix('\n').unwrap_or(raw);
        let content = content.strip_suffix('\r').unwrap_or(content);
        doc_lines.push((content, offset, offset + content.len()));
        offset += raw.len();
    }
    if doc_lines.len() < find_lines.len() {
        return None;
    }

    let k = find_lines.len();
    let mut best: Option<LineMatch> = None;
    'outer: for start in 0..=doc_lines.len() - k {
        let mut total = 0.0;
        for (j, want) in find_lines.iter().enumerate() {
            let score = line_similarity(doc_lines[start + j].0.trim(), want);
            if score < LINE_SIMILARITY_FLOOR {
                continue 'outer;
            }
            total += score;
        }
        let mean = total / k as f32;
        if best.as_ref().map_or(true, |b| mean > b.score) {
            best = Some(LineMatch {
                range: doc_lines[start].1..doc_lines[start + k - 1].2,
                score: mean,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_lines_with_small_drift() {
        let doc = "# Intro\nThe quick brown fox jumps.\nIt was a sunny day.\n\nEnd.";
        let find = "The quick brown fox jumped.\nIt was a sunny day!";
        let m = find_similar_lines(doc, find).unwrap();
        assert_eq!(
            &doc[m.range.clone()],
            "The quick brown fox jumps.\nIt was a sunny day."
        );
        assert!(m.score >= LINE_SIMILARITY_FLOOR);
    }

    #[test]
    fn test_rejects_when_any_line_too_different() {
        let doc = "The quick brown fox jumps.\nSomething entirely unrelated here.\n";
        let find = "The quick brown fox jumps.\nIt was a sunny day.";
        assert!(find_similar_lines(doc, find).is_none());
    }

    #[test]
    fn test_single_line_not_handled() {
        assert!(find_similar_lines("one line", "one line").is_none());
    }
}

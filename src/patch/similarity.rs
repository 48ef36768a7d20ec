//! 相似度计算
//!
//! 窗口级 Jaccard 与行级编辑距离统一到 0.0-1.0 的相似度刻度，阈值集中在此处定义。
//! 分词：小写字母数字词；CJK 字符每字一个词。

use std::collections::HashSet;

/// 第三级窗口匹配的 Jaccard 下限
pub const WINDOW_JACCARD_FLOOR: f32 = 0.9;

/// 行级匹配中每一行的相似度下限（1 - 归一化编辑距离）
pub const LINE_SIMILARITY_FLOOR: f32 = 0.8;

/// 判断字符是否为 CJK（中日韩）字符
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |   // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |   // CJK Unified Ideographs Extension A
        '\u{F900}'..='\u{FAFF}' |   // CJK Compatibility Ideographs
        '\u{3040}'..='\u{309F}' |   // Hiragana
        '\u{30A0}'..='\u{30FF}' |   // Katakana
        '\u{AC00}'..='\u{D7AF}'     // Hangul Syllables
    )
}

/// 判断文本是否包含 CJK 字符
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 分词：按非字母数字字符切分并转小写，CJK 字符单独成词
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// 分词并返回词集合（用于相似度计算）
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 两个词集合的 Jaccard 相似度；任一为空时为 0.0
pub fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f32 {
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }
    let intersection = set1.intersection(set2).count() as f32;
    let union = set1.union(set2).count() as f32;
    intersection / union
}

/// 按字符计算的 Levenshtein 距离
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// 行相似度：1 - 编辑距离 / 较长行的字符数；两行都为空时为 1.0
pub fn line_similarity(a: &str, b: &str) -> f32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f32 / max_len as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed() {
        assert_eq!(
            tokenize("The Sky, is-BLUE 2024!"),
            vec!["the", "sky", "is", "blue", "2024"]
        );
        assert_eq!(tokenize("天空 blue"), vec!["天", "空", "blue"]);
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        let a = word_set("alpha beta gamma");
        let b = word_set("Gamma, beta; ALPHA");
        assert_eq!(jaccard_similarity(&a, &b), 1.0);

        let c = word_set("delta epsilon");
        assert_eq!(jaccard_similarity(&a, &c), 0.0);
    }

    #[test]
    fn test_jaccard_empty() {
        let a = word_set("alpha");
        let empty = word_set("!!! ---");
        assert!(empty.is_empty());
        assert_eq!(jaccard_similarity(&a, &empty), 0.0);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_line_similarity_scale() {
        assert_eq!(line_similarity("", ""), 1.0);
        assert_eq!(line_similarity("abcde", "abcde"), 1.0);
        assert!((line_similarity("abcde", "abcdx") - 0.8).abs() < 1e-6);
        assert!(line_similarity("abc", "xyz") < LINE_SIMILARITY_FLOOR);
    }
}

//! 结构化输出解析与重试
//!
//! 模型输出常见问题：包在 ``` 代码块里、前后有说明文字、LaTeX 反斜杠未转义。
//! clean 依次处理这三点，parse 再做 JSON 解析、必填字段校验和类型化反序列化。
//! with_retry 只在解析/校验失败时整轮重新生成；传输错误直接上抛。

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::core::{AgentError, ParseError, RecoveryAction, RecoveryEngine};

use super::kind::AgentKind;
use super::log::{LogEntry, LogKind, LogSink};

/// 错误信息中保留的原始输出长度
pub const RAW_PREVIEW_CHARS: usize = 500;

/// 默认重试次数（首轮之外）
pub const DEFAULT_MAX_RETRIES: usize = 1;

/// 以 b/f/n/r/t 开头的常见 LaTeX 命令：这些反斜杠按字面保留，不当作 JSON 转义
const LATEX_COMMANDS: &[&str] = &[
    "backslash", "bar", "begin", "beta", "bf", "bfseries", "bibitem", "bibliography",
    "bibliographystyle", "big", "bigcap", "bigcup", "bigg", "biggl", "biggr", "bigl", "bigr",
    "bigskip", "binom", "bm", "boldsymbol", "bot", "bottomrule", "boxed", "breve", "bullet",
    "fbox", "fill", "flat", "footnote", "footnotemark", "footnotesize", "footnotetext", "forall",
    "frac", "framebox", "frown", "nabla", "natural", "ne", "nearrow", "neg", "neq", "newcommand",
    "newenvironment", "newline", "newpage", "nocite", "noindent", "nolimits", "nonumber",
    "normalsize", "not", "notin", "nu", "rangle", "rbrace", "rceil", "ref", "renewcommand",
    "rfloor", "rho", "right", "rightarrow", "rm", "rmfamily", "rvert", "tableofcontents", "tag",
    "tau", "text", "textbf", "textcolor", "textit", "textmd", "textnormal", "textrm", "textsc",
    "textsf", "textsl", "textsubscript", "textsuperscript", "texttt", "textup", "textwidth",
    "tfrac", "thanks", "therefore", "theta", "thispagestyle", "tilde", "times", "tiny", "title",
    "to", "today", "top", "toprule", "triangle", "triangleq", "tt", "ttfamily",
];

/// 清洗模型原始输出，返回可交给 JSON 解析器的文本
pub fn clean(raw: &str) -> String {
    let body = strip_code_fence(raw.trim());
    let extracted = extract_balanced(body);
    escape_invalid_backslashes(extracted.trim())
}

/// 去掉外层 ``` 代码块；代码块位于 JSON 字符串内部时不处理
fn strip_code_fence(text: &str) -> &str {
    let Some(fence) = text.find("```") else {
        return text;
    };
    if fence_inside_json(text, fence) {
        return text;
    }
    let after = &text[fence + 3..];
    // 跳过语言标记（```json）
    let inner = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match inner.rfind("```") {
        Some(end) => &inner[..end],
        None => inner,
    }
}

/// 代码块之前出现的括号块是否把代码块包在里面；说明文字里已闭合的 [1] 之类不算
fn fence_inside_json(text: &str, fence: usize) -> bool {
    let mut pos = 0;
    while let Some(offset) = text[pos..fence].find(['{', '[']) {
        let start = pos + offset;
        let end = start + extract_balanced(&text[start..]).len();
        if end > fence {
            return true;
        }
        pos = end;
    }
    false
}

/// 取出第一个括号平衡的 {...} 或 [...]；字符串内部的括号不计数。
/// 没有闭合时返回从起始括号到末尾的内容，交给 JSON 解析器报错。
fn extract_balanced(text: &str) -> &str {
    let Some(start) = text.find(['{', '[']) else {
        return text;
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[start..start + i + c.len_utf8()];
                }
            }
            _ => {}
        }
    }
    &text[start..]
}

/// 把 JSON 中非法的反斜杠序列（如 LaTeX 的 \cite、\alpha）转义为 `\\`
fn escape_invalid_backslashes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).copied();
        let valid = match next {
            Some('"') | Some('\\') | Some('/') => true,
            Some('u') => chars.len() >= i + 6 && chars[i + 2..i + 6].iter().all(|c| c.is_ascii_hexdigit()),
            Some('b') | Some('f') | Some('n') | Some('r') | Some('t') => {
                let word: String = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphabetic())
                    .collect();
                // 紧跟 { 的多字母词按命令处理，如 \textcolor{red}
                let takes_argument =
                    word.len() >= 2 && chars.get(i + 1 + word.len()) == Some(&'{');
                !(LATEX_COMMANDS.contains(&word.as_str()) || takes_argument)
            }
            _ => false,
        };
        if valid {
            out.push('\\');
            if let Some(n) = next {
                out.push(n);
            }
            i += 2;
        } else {
            out.push_str("\\\\");
            i += 1;
        }
    }
    out
}

fn preview(raw: &str) -> String {
    raw.chars().take(RAW_PREVIEW_CHARS).collect()
}

/// 校验必填字段：顶层必须是对象，字段存在且不为 null
pub fn validate_required(value: &Value, required: &[&str]) -> Result<(), ParseError> {
    if required.is_empty() {
        return Ok(());
    }
    let Some(obj) = value.as_object() else {
        return Err(ParseError::InvalidJson {
            message: "expected a JSON object".to_string(),
            raw: preview(&value.to_string()),
        });
    };
    let missing: Vec<String> = required
        .iter()
        .filter(|k| obj.get(**k).map_or(true, Value::is_null))
        .map(|k| k.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::MissingFields(missing))
    }
}

/// 清洗、解析、校验并反序列化为 T
pub fn parse<T: DeserializeOwned>(raw: &str, required: &[&str]) -> Result<T, ParseError> {
    let cleaned = clean(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
        raw: preview(raw),
    })?;
    validate_required(&value, required)?;
    serde_json::from_value(value).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
        raw: preview(raw),
    })
}

/// 调用 + 解析；解析/校验失败时记录一条 error 日志并整轮重新调用，最多 max_retries 次
pub async fn with_retry<T, F, Fut>(
    sink: &dyn LogSink,
    agent: AgentKind,
    max_retries: usize,
    required: &[&str],
    call: F,
) -> Result<T, AgentError>
where
    T: DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AgentError>>,
{
    with_retry_validated(sink, agent, max_retries, required, call, Ok).await
}

/// 同 with_retry，解析后再经 validate 做语义校验；校验失败同样触发重新生成
pub async fn with_retry_validated<T, F, Fut, V>(
    sink: &dyn LogSink,
    agent: AgentKind,
    max_retries: usize,
    required: &[&str],
    mut call: F,
    validate: V,
) -> Result<T, AgentError>
where
    T: DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AgentError>>,
    V: Fn(T) -> Result<T, ParseError>,
{
    let recovery = RecoveryEngine::new();
    let mut attempt = 0;
    loop {
        let raw = call().await?;
        let err = match parse::<T>(&raw, required).and_then(&validate) {
            Ok(value) => return Ok(value),
            Err(e) => AgentError::from(e),
        };
        if attempt >= max_retries || recovery.handle(&err) != RecoveryAction::Regenerate {
            return Err(err);
        }
        attempt += 1;
        sink.emit(
            &LogEntry::new(agent, LogKind::Error, format!("Retrying after invalid output: {err}"))
                .with_metadata(json!({ "attempt": attempt, "max_retries": max_retries })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::log::MemoryLogSink;
    use crate::llm::LlmError;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Out {
        text: String,
    }

    #[test]
    fn test_clean_code_fence_and_prose() {
        let raw = "Sure! Here it is:\n```json\n{\"text\": \"a {b} c\"}\n```\nHope this helps.";
        assert_eq!(clean(raw), "{\"text\": \"a {b} c\"}");
    }

    #[test]
    fn test_clean_string_aware_extraction() {
        let raw = r#"Result: {"text": "closing } inside \" quoted"} trailing }"#;
        let out: Out = parse(raw, &["text"]).unwrap();
        assert_eq!(out.text, "closing } inside \" quoted");
    }

    #[test]
    fn test_fence_inside_json_string_kept() {
        let raw = "{\"text\": \"```rust\\nfn main() {}\\n```\"}";
        let out: Out = parse(raw, &["text"]).unwrap();
        assert!(out.text.starts_with("```rust\nfn main"));
    }

    #[test]
    fn test_latex_backslashes_escaped() {
        let raw = r#"{"text": "as shown \cite{smith} with \alpha and \textbf{bold}\nnext"}"#;
        let out: Out = parse(raw, &["text"]).unwrap();
        assert_eq!(
            out.text,
            "as shown \\cite{smith} with \\alpha and \\textbf{bold}\nnext"
        );
    }

    #[test]
    fn test_more_latex_commands_kept() {
        for cmd in [
            "to", "top", "neq", "ne", "nolimits", "bm", "binom", "bot", "boxed", "textcolor",
            "textsuperscript", "textsubscript", "triangle", "tableofcontents", "today",
            "footnotemark", "fill",
        ] {
            let raw = format!(r#"{{"text": "x \{cmd}{{y}}"}}"#);
            let out: Out = parse(&raw, &["text"]).unwrap();
            assert_eq!(out.text, format!("x \\{cmd}{{y}}"), "command {cmd}");
        }
    }

    #[test]
    fn test_unknown_command_with_argument_kept() {
        let out: Out = parse(r#"{"text": "\tcbox{a} and \nfoo{b}"}"#, &["text"]).unwrap();
        assert_eq!(out.text, "\\tcbox{a} and \\nfoo{b}");
    }

    #[test]
    fn test_real_escapes_still_decoded() {
        let out: Out = parse(r#"{"text": "line\nnext\tcol \to b"}"#, &["text"]).unwrap();
        assert_eq!(out.text, "line\nnext\tcol \\to b");
    }

    #[test]
    fn test_fence_after_bracketed_prose() {
        let raw = "See [1]: the answer follows.\n```json\n{\"text\": \"ok\"}\n```";
        assert_eq!(clean(raw), "{\"text\": \"ok\"}");
        let out: Out = parse(raw, &["text"]).unwrap();
        assert_eq!(out.text, "ok");
    }

    #[tokio::test]
    async fn test_validation_failure_is_retried() {
        let sink = MemoryLogSink::new();
        let calls = AtomicUsize::new(0);
        let out: Out = with_retry_validated(
            &sink,
            AgentKind::Planner,
            1,
            &["text"],
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n == 0 { r#"{"text": ""}"# } else { r#"{"text": "plan"}"# }.to_string())
                }
            },
            |out: Out| {
                if out.text.is_empty() {
                    Err(ParseError::InvalidJson {
                        message: "empty".to_string(),
                        raw: String::new(),
                    })
                } else {
                    Ok(out)
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(out.text, "plan");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.count(AgentKind::Planner, LogKind::Error), 1);
    }

    #[test]
    fn test_missing_fields_listed() {
        let err = parse::<Value>(r#"{"a": 1, "b": null}"#, &["a", "b", "c"]).unwrap_err();
        assert_eq!(err, ParseError::MissingFields(vec!["b".into(), "c".into()]));
        assert_eq!(err.to_string(), "Missing required field(s): b, c");
    }

    #[test]
    fn test_invalid_json_keeps_raw_preview() {
        let raw = "x".repeat(800);
        match parse::<Value>(&raw, &[]).unwrap_err() {
            ParseError::InvalidJson { raw, .. } => assert_eq!(raw.len(), RAW_PREVIEW_CHARS),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_retry_recovers_once() {
        let sink = MemoryLogSink::new();
        let calls = AtomicUsize::new(0);
        let out: Out = with_retry(&sink, AgentKind::Writer, 1, &["text"], || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(if n == 0 {
                    "not json at all".to_string()
                } else {
                    r#"{"text": "ok"}"#.to_string()
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(out.text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.count(AgentKind::Writer, LogKind::Error), 1);
        let entry = &sink.entries()[0];
        assert_eq!(entry.metadata["attempt"], 1);
        assert_eq!(entry.metadata["max_retries"], 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let sink = MemoryLogSink::new();
        let calls = AtomicUsize::new(0);
        let res: Result<Out, _> = with_retry(&sink, AgentKind::Critic, 1, &["text"], || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("{}".to_string()) }
        })
        .await;
        assert!(matches!(
            res,
            Err(AgentError::Parse(ParseError::MissingFields(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transport_error_not_retried() {
        let sink = MemoryLogSink::new();
        let calls = AtomicUsize::new(0);
        let res: Result<Out, _> = with_retry(&sink, AgentKind::Planner, 1, &["text"], || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AgentError::Llm(LlmError::Timeout(30))) }
        })
        .await;
        assert!(matches!(res, Err(AgentError::Llm(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.entries().is_empty());
    }
}

//! 从 LLM 回复中提取 JSON
//!
//! 支持 ```json ... ``` 代码块或纯文本中最外层的 `{...}`。

use serde::de::DeserializeOwned;

/// 提取 JSON 片段；没有 `{` 时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 提取并反序列化；失败信息带上原文便于排查
pub fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T, String> {
    let json_str = extract_json(output).ok_or_else(|| format!("No JSON found in: {}", output.trim()))?;
    serde_json::from_str(json_str).map_err(|e| format!("JSON parse error: {}: {}", e, json_str))
}

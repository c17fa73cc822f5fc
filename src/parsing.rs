//! Model Output Parsing
//!
//! Everything that reads structure out of free-form model text lives here.
//! None of these functions fail: a missing section or block is a normal
//! result (`None` or a documented default), never an error.

use crate::state::Interpretation;
use lazy_static::lazy_static;
use regex::Regex;

pub const QUERY_DETAILS_LABEL: &str = "Query_Details";
pub const ACTION_DETAILS_LABEL: &str = "Action_Details";
pub const CYPHER_DETAILS_LABEL: &str = "Cypher_Details";

/// Fallback when the model gives no data-request description
pub const DEFAULT_DB_QUERY: &str = "Fetch relevant data";
/// Fallback when the model gives no post-processing intent
pub const DEFAULT_GENERAL_QUERY: &str = "Got it";
/// Fallback when the model gives no schema-lookup request
pub const DEFAULT_CYPHER_DETAILS: &str = "";

lazy_static! {
    // Any recognised label, wherever it appears. A section runs until the
    // next recognised label or the end of the text.
    static ref SECTION_LABEL: Regex =
        Regex::new(r"(?i)\b(query_details|action_details|cypher_details)\s*\**\s*:").unwrap();
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```sql(?:ite)?\b\s*\n?(.*?)\n?```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)\n?```").unwrap();
    static ref PROCESSED_OUTPUT: Regex = Regex::new(r"(?is)processed output:\s*(.+)").unwrap();
    static ref QUOTED: Regex =
        Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`"#).unwrap();
}

/// Split model text into `label -> text` sections.
///
/// Labels match case-insensitively. When a label occurs more than once the
/// first occurrence wins. Markdown emphasis around labels and values is
/// dropped.
pub fn parse_sections(text: &str) -> Vec<(String, String)> {
    let matches: Vec<_> = SECTION_LABEL.captures_iter(text).collect();
    let mut sections: Vec<(String, String)> = Vec::new();

    for (idx, caps) in matches.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let label = caps[1].to_lowercase();
        let end = matches
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        let value = clean_section(&text[whole.end()..end]);
        if !sections.iter().any(|(l, _)| *l == label) {
            sections.push((label, value));
        }
    }

    sections
}

fn clean_section(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('*')
        .trim_end_matches('*')
        .trim()
        .trim_end_matches("```")
        .trim()
        .to_string()
}

fn section<'a>(sections: &'a [(String, String)], label: &str) -> Option<&'a str> {
    let label = label.to_lowercase();
    sections
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Interpretation from the three labelled sections, with fixed defaults for
/// any section that is missing or empty.
pub fn parse_interpretation(text: &str) -> Interpretation {
    let sections = parse_sections(text);
    Interpretation {
        db_query: section(&sections, QUERY_DETAILS_LABEL)
            .unwrap_or(DEFAULT_DB_QUERY)
            .to_string(),
        general_query: section(&sections, ACTION_DETAILS_LABEL)
            .unwrap_or(DEFAULT_GENERAL_QUERY)
            .to_string(),
        cypher_details: section(&sections, CYPHER_DETAILS_LABEL)
            .unwrap_or(DEFAULT_CYPHER_DETAILS)
            .to_string(),
    }
}

/// Statement inside the first ```` ```sql ```` block, if any.
pub fn extract_sql(text: &str) -> Option<String> {
    SQL_FENCE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|sql| !sql.is_empty())
}

/// Graph query from a model response: the first fenced block when present,
/// otherwise the whole trimmed text.
pub fn extract_graph_query(text: &str) -> Option<String> {
    let query = match ANY_FENCE.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    };
    Some(query).filter(|q| !q.is_empty())
}

/// Narrative following a "Processed Output:" label, or the whole text when
/// the label is absent.
pub fn strip_processed_output(text: &str) -> String {
    match PROCESSED_OUTPUT.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Query text with every quoted literal or identifier emptied, so keyword
/// scans only see the statement's own words.
pub fn mask_quoted(query: &str) -> String {
    QUOTED
        .replace_all(query, |caps: &regex::Captures| {
            let quote = &caps[0][..1];
            format!("{}{}", quote, quote)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_three_sections() {
        let text = "Query_Details: total spend from monthly_forecast table for Finance in 2024\n\
                    Action_Details: Report the total\n\
                    Cypher_Details: monthly_forecast, hierarchy via hierarchy_id";
        let parsed = parse_interpretation(text);
        assert_eq!(parsed.db_query, "total spend from monthly_forecast table for Finance in 2024");
        assert_eq!(parsed.general_query, "Report the total");
        assert_eq!(parsed.cypher_details, "monthly_forecast, hierarchy via hierarchy_id");
    }

    #[test]
    fn test_labels_are_case_insensitive_and_bold_is_dropped() {
        let text = "**QUERY_DETAILS:** spend rows\n**action_details:** No additional processing required.";
        let parsed = parse_interpretation(text);
        assert_eq!(parsed.db_query, "spend rows");
        assert_eq!(parsed.general_query, "No additional processing required.");
        assert_eq!(parsed.cypher_details, DEFAULT_CYPHER_DETAILS);
    }

    #[test]
    fn test_multiline_section_runs_to_next_label() {
        let text = "Query_Details: line one\nline two\n\nAction_Details: summarize";
        let parsed = parse_interpretation(text);
        assert_eq!(parsed.db_query, "line one\nline two");
        assert_eq!(parsed.general_query, "summarize");
    }

    #[test]
    fn test_malformed_output_falls_back_to_defaults() {
        let text = "I'm sorry, I cannot help with that.";
        let first = parse_interpretation(text);
        let second = parse_interpretation(text);
        assert_eq!(first, second);
        assert_eq!(first.db_query, DEFAULT_DB_QUERY);
        assert_eq!(first.general_query, DEFAULT_GENERAL_QUERY);
        assert_eq!(first.cypher_details, DEFAULT_CYPHER_DETAILS);
    }

    #[test]
    fn test_empty_section_uses_default() {
        let parsed = parse_interpretation("Query_Details:\nAction_Details: total");
        assert_eq!(parsed.db_query, DEFAULT_DB_QUERY);
        assert_eq!(parsed.general_query, "total");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let sections = parse_sections("Query_Details: a\nQuery_Details: b");
        assert_eq!(sections, vec![("query_details".to_string(), "a".to_string())]);
    }

    #[test]
    fn test_extract_sql_block() {
        assert_eq!(extract_sql("Here you go:\n```sql\nSELECT 1\n```"), Some("SELECT 1".to_string()));
        assert_eq!(extract_sql("```SQL SELECT 1```"), Some("SELECT 1".to_string()));
        assert_eq!(extract_sql("SELECT 1"), None);
        assert_eq!(extract_sql("```python\nprint(1)\n```"), None);
        assert_eq!(extract_sql("```sql\n\n```"), None);
        assert_eq!(extract_sql("```sqlite\nSELECT 1\n```"), Some("SELECT 1".to_string()));
        assert_eq!(extract_sql("```sqlx\nSELECT 1\n```"), None);
    }

    #[test]
    fn test_mask_quoted() {
        assert_eq!(
            mask_quoted("WHERE t.name =~ '(?i).*drop.*' AND x = \"set; go\""),
            "WHERE t.name =~ '' AND x = \"\""
        );
        assert_eq!(mask_quoted("MATCH (`create`) RETURN 'it\\'s'"), "MATCH (``) RETURN ''");
        assert_eq!(mask_quoted("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_extract_graph_query() {
        let text = "```cypher\nMATCH (t:Table) RETURN t\n```";
        assert_eq!(extract_graph_query(text), Some("MATCH (t:Table) RETURN t".to_string()));
        assert_eq!(extract_graph_query("  MATCH (t) RETURN t "), Some("MATCH (t) RETURN t".to_string()));
        assert_eq!(extract_graph_query("   "), None);
    }

    #[test]
    fn test_strip_processed_output() {
        assert_eq!(strip_processed_output("Processed Output: Finance spent $1.2M"), "Finance spent $1.2M");
        assert_eq!(strip_processed_output("  plain answer "), "plain answer");
    }
}

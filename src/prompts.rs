//! Instruction builders for every model call the pipeline makes.
//!
//! The wording is advisory: nothing downstream depends on the model obeying
//! it, only on the parsers in `crate::parsing`.

use crate::parsing::{ACTION_DETAILS_LABEL, CYPHER_DETAILS_LABEL, QUERY_DETAILS_LABEL};

pub fn analyze_query(user_query: &str, prior_error: Option<&str>, schema_reference: Option<&str>) -> String {
    let mut parts = Vec::new();

    if let Some(error) = prior_error {
        parts.push(format!(
            "PREVIOUS QUERY EXECUTION FAILED: {}\nTake this failure into account and describe the data so that a corrected query can be written.\n",
            error
        ));
    }

    parts.push("USER QUERY BREAKDOWN".to_string());
    parts.push(
        "Break the user's question into three parts. Do NOT write SQL or Cypher code, only describe what is needed.".to_string(),
    );
    parts.push(format!(
        "1. {}: which data has to be fetched from the database. Name tables with the suffix ' table' (e.g. 'annotations table') and mention aggregate functions such as SUM, COUNT or AVG when the question needs them.",
        QUERY_DETAILS_LABEL
    ));
    parts.push(format!(
        "2. {}: the post-processing the user expects (summary, ranking, comparison, insight). Do not repeat SQL functions here. If nothing is needed answer 'No additional processing required.'",
        ACTION_DETAILS_LABEL
    ));
    parts.push(format!(
        "3. {}: the primary table(s), the key fields and any referenced or referencing tables needed for a graph-based schema lookup.",
        CYPHER_DETAILS_LABEL
    ));
    parts.push(format!(
        "\nRESPONSE FORMAT (strictly follow it):\n{}: ...\n{}: ...\n{}: ...",
        QUERY_DETAILS_LABEL, ACTION_DETAILS_LABEL, CYPHER_DETAILS_LABEL
    ));

    if let Some(reference) = schema_reference.filter(|r| !r.trim().is_empty()) {
        parts.push(format!("\nDATABASE SCHEMA FOR REFERENCE:\n{}", reference));
    }

    parts.push(format!("\nUser Query: {}", user_query));
    parts.join("\n")
}

pub fn graph_query(schema_metadata: &str, question: &str) -> String {
    format!(
        r#"You write Neo4j Cypher queries over a graph that models a relational schema.
- Each `Table` node is a database table.
- Each `Field` node is a column, linked from its table by `[:CONTAINS]`.
- Relationships between `Table` nodes (e.g. `REFERENCES`, `RECEIVES`) are schema-level links such as foreign keys.

Write ONE read-only Cypher query that:
1. Matches the main table(s) case-insensitively, e.g. `WHERE toLower(t.name) =~ "(?i).*forecast.*"`.
2. Uses OPTIONAL MATCH to expand to related tables over schema relationships.
3. Collects the fields of every table with `MATCH (t)-[:CONTAINS]->(f:Field)` and `COLLECT(f)`, using separate aliases per table.
4. Passes everything forward with WITH and ends with a single RETURN of
   `{{primary_tables: [{{table_name: ..., fields: [...]}}], related_tables: [...]}}`.
Use unquoted map keys. Never return business data, never use SQL syntax, never write to the graph.

Graph schema:
{}

Question:
{}

Return only the Cypher query."#,
        schema_metadata, question
    )
}

/// Everything the SQL synthesis instruction is built from.
pub struct SqlPromptInput<'a> {
    pub user_query: &'a str,
    pub db_query: &'a str,
    pub schema_info: &'a str,
    pub examples: &'a str,
    pub table_names: &'a str,
    pub formatted_schema: &'a str,
    pub formatted_relations: &'a str,
}

pub fn sql_generation(input: &SqlPromptInput<'_>) -> String {
    let mut parts = Vec::new();

    parts.push("You are an expert SQL assistant with access to a relational database.".to_string());
    parts.push("Generate a correct and optimized SQL query for the user question.".to_string());

    if !input.table_names.is_empty() {
        parts.push(format!("\nTABLES AVAILABLE:\n{}", input.table_names));
    }
    if !input.formatted_schema.is_empty() {
        parts.push(format!("\n{}", input.formatted_schema));
        parts.push("- Only query columns that exist in this schema.".to_string());
    }
    if !input.formatted_relations.is_empty() {
        parts.push(format!("\n{}", input.formatted_relations));
        parts.push("- Join tables over these relationships instead of guessing.".to_string());
    }

    parts.push(format!("\nRELEVANT SCHEMA (from schema lookup):\n{}", input.schema_info));
    parts.push(format!("\nDATA REQUIRED:\n{}", input.db_query));

    parts.push("\nRULES:".to_string());
    parts.push("- List the needed columns explicitly (avoid SELECT *).".to_string());
    parts.push("- Use INNER JOIN by default; LEFT/RIGHT/FULL JOIN only when unmatched rows are required.".to_string());
    parts.push("- Compare text case-insensitively, e.g. WHERE LOWER(h.l1) = LOWER('Finance').".to_string());
    parts.push("- 'last month' / 'last year' mean the previous full calendar period; 'last 30 days' is a rolling window.".to_string());
    parts.push("- DO NOT write INSERT, UPDATE, DELETE, DROP or any other statement that modifies data.".to_string());

    if !input.examples.trim().is_empty() {
        parts.push("\nSIMILAR USER QUERIES AND THEIR SQL (reference only, adapt rather than copy):".to_string());
        parts.push(input.examples.to_string());
    }

    parts.push("\nReturn the query in a single ```sql fenced block.".to_string());
    parts.push(format!("\nUser question: {}", input.user_query));
    parts.join("\n")
}

pub fn narration(user_query: &str, detailed_intent: &str, sql_query: &str, data_csv: &str) -> String {
    format!(
        r#"INTELLIGENT DATA PROCESSING
You turn a result set returned by an SQL query into a clear answer for a non-technical reader.

User question: {}
User's detailed question: {}
SQL query: {}
Data (CSV):
{}

Instructions:
- Answer from the data only; do not assume anything that is not in it.
- If the question asks for a summary, summarize the data; otherwise answer it directly.
- Call out the overall trend, the top contributors and any anomalies or inconsistencies you see.
- Format monetary values with a currency symbol and dates in a natural form (e.g. January 1, 2025).
- Keep it concise. If part of the data is unclear or incomplete, say so instead of guessing.

Begin your answer with "Processed Output:"."#,
        user_query, detailed_intent, sql_query, data_csv
    )
}

//! Prompt templates for question translation

use crate::llm::ChatMessage;
use crate::translate::translator::TranslationRequest;

const TRANSLATION_SYSTEM_TEMPLATE: &str = r#"You are an expert at translating natural-language questions into Neo4j Cypher queries. Using the database schema below, turn the user's question into one accurate and efficient Cypher statement.

Follow these rules:
1. Building the statement
   - MATCH: describe graph patterns such as `MATCH (n:Label {property: 'value'})-[r:REL_TYPE]->(m:OtherLabel)`. Prefer pattern matching to express connections. For path questions consider `shortestPath`.
   - WHERE: filter node or relationship properties with comparison operators (`=`, `<`, `>`, `<=`, `>=`, `<>`), boolean operators (`AND`, `OR`, `NOT`) and string matching (`CONTAINS`, `STARTS WITH`, `ENDS WITH`). Express ranges as `property >= a AND property <= b`.
   - RETURN: name exactly the nodes, relationships or properties needed. Use `DISTINCT` to avoid duplicates and aliases to make columns readable. Use aggregate functions (`count`, `sum`, `avg`, `min`, `max`) when the question calls for them.
   - ORDER BY with `ASC` or `DESC` to sort, SKIP and LIMIT to page.
   - Only use labels, relationship types and properties that appear in the schema.
   - {write_rule}
2. Special cases
   - Fuzzy questions ("movies like X"): use `CONTAINS` or another suitable string function.
   - Multi-hop questions: follow as many relationships as the answer needs.
   - Counting or totals: use aggregation.
   - No explicit entity: infer labels and relationships from context.
3. Output
   - Output only the Cypher statement, with no explanation.
   - The statement must be executable and syntactically correct.
   - Quote strings with single quotes, not double quotes.

## Database schema
{schema}"#;

const READ_ONLY_RULE: &str =
    "Generate read-only queries. Never use CREATE, MERGE, SET, DELETE, REMOVE or DROP.";

const WRITE_ALLOWED_RULE: &str = "Generate read-only queries unless the user explicitly asks to modify data; only then use CREATE, MERGE, SET, DELETE or REMOVE.";

const TRANSLATION_USER_TEMPLATE: &str = "### Instruction
Translate the following question into a Cypher statement.
### Input
{question}";

const RETRY_TEMPLATE: &str = "
### Previous attempt
Your previous query was rejected: {reason}
{rejected}Write a corrected read-only query that avoids this problem.";

/// Build the chat messages for a translation request.
pub fn translation_messages(request: &TranslationRequest, allow_writes: bool) -> Vec<ChatMessage> {
    let write_rule = if allow_writes {
        WRITE_ALLOWED_RULE
    } else {
        READ_ONLY_RULE
    };
    let system = TRANSLATION_SYSTEM_TEMPLATE
        .replace("{write_rule}", write_rule)
        .replace("{schema}", &request.schema.to_prompt_text());

    let mut user = TRANSLATION_USER_TEMPLATE.replace("{question}", request.question.trim());
    if let Some(reason) = &request.prior_error {
        let rejected = request
            .rejected_cypher
            .as_deref()
            .map(|q| format!("```cypher\n{}\n```\n", q))
            .unwrap_or_default();
        user.push_str(
            &RETRY_TEMPLATE
                .replace("{reason}", reason)
                .replace("{rejected}", &rejected),
        );
    }

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

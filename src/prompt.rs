//! Prompt templates for answering and evaluation.

const CONTEXT_TEMPLATE: &str = "\
You are a helpful customer support assistant.

Please respond to the user's query based on the context provided and refer chat history.
Use engaging, friendly, and helpful tone.
Highlight key points in bold.
Use bullet points for lists and start each bullet point with an asterisk (*) and ensure each appears on a new line.
If the user's query is related to the context, please respond with the most relevant information from the context.
If the user's query is not related to the context, please respond with \"I'm sorry, I can't help with that.\"
Use consistent markdown formatting for all tables, links/deeplinks, and code blocks.

Here is the chat history:
{chat_history}

Here is the context:
{context}

Here is the user's query:
{query}
";

pub const REFUSAL: &str = "I'm sorry, I can't help with that.";

fn render_lines(lines: &[String], empty: &str) -> String {
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

fn render_context(chunks: &[String]) -> String {
    if chunks.is_empty() {
        return "(no context available)".to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] {}", i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The customer-support prompt sent by `/predict`.
pub fn render_context_prompt(chat_history: &[String], context: &[String], query: &str) -> String {
    // Placeholders are substituted in a single pass so user text containing
    // `{query}` or similar is never expanded.
    let mut out = String::with_capacity(CONTEXT_TEMPLATE.len() + query.len());
    let mut rest = CONTEXT_TEMPLATE;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (value, consumed) = if tail.starts_with("{chat_history}") {
            (render_lines(chat_history, "(no previous conversation)"), "{chat_history}".len())
        } else if tail.starts_with("{context}") {
            (render_context(context), "{context}".len())
        } else if tail.starts_with("{query}") {
            (query.to_string(), "{query}".len())
        } else {
            ("{".to_string(), 1)
        };
        out.push_str(&value);
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

/// The compact prompt used when generating answers for evaluation.
pub fn render_evaluation_prompt(context: &[String], query: &str) -> String {
    format!("Context: {}\n\nQuestion: {}\n\nAnswer:", context.join(" "), query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prompt_contains_all_sections() {
        let history = vec!["QUERY: hi".to_string(), "RESPONSE: hello".to_string()];
        let context = vec!["Refunds take 5 days.".to_string(), "Ship in 2 days.".to_string()];

        let prompt = render_context_prompt(&history, &context, "How long do refunds take?");

        assert!(prompt.starts_with("You are a helpful customer support assistant."));
        assert!(prompt.contains("QUERY: hi\nRESPONSE: hello"));
        assert!(prompt.contains("[1] Refunds take 5 days.\n\n[2] Ship in 2 days."));
        assert!(prompt.trim_end().ends_with("How long do refunds take?"));
        assert!(prompt.contains(REFUSAL));
    }

    #[test]
    fn user_text_is_not_expanded() {
        let prompt = render_context_prompt(&[], &["{query}".to_string()], "what is {context}?");

        assert!(prompt.contains("[1] {query}"));
        assert!(prompt.contains("what is {context}?"));
        assert!(prompt.contains("(no previous conversation)"));
    }

    #[test]
    fn evaluation_prompt_is_compact() {
        let prompt = render_evaluation_prompt(&["a".to_string(), "b".to_string()], "q?");

        assert_eq!(prompt, "Context: a b\n\nQuestion: q?\n\nAnswer:");
    }
}

//! Prompt template used to ground answers in retrieved chunks.

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const PROMPT_TEMPLATE: &str = "
Answer the question based on the following context, try to elaborate some more:

{context}

---

Answer the question: {question}
";

/// Join chunk texts into a single context block, most relevant first.
pub fn build_context<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    chunks.into_iter().collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Fill the template with the context block and the user question.
pub fn build_prompt(context: &str, question: &str) -> String {
    // Substitute the question first so a literal `{question}` inside the context survives.
    PROMPT_TEMPLATE
        .replace("{question}", question)
        .replacen("{context}", context, 1)
}

/// Template text with empty placeholders, used for token estimates.
pub fn template_overhead() -> String {
    build_prompt("", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_joins_chunks_with_separator() {
        let context = build_context(["alpha", "beta"]);
        assert_eq!(context, "alpha\n\n---\n\nbeta");
    }

    #[test]
    fn prompt_places_context_before_question() {
        let prompt = build_prompt("Alice fell.", "Who fell?");
        assert!(prompt.starts_with(
            "\nAnswer the question based on the following context, try to elaborate some more:\n\nAlice fell.\n\n---\n\nAnswer the question: Who fell?\n"
        ));
        assert!(prompt.find("Alice fell.") < prompt.find("Who fell?"));
    }

    #[test]
    fn placeholders_inside_context_are_left_alone() {
        let prompt = build_prompt("literal {question} text", "Q?");
        assert!(prompt.contains("literal {question} text"));
        assert!(prompt.ends_with("Answer the question: Q?\n"));
    }
}

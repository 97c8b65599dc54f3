/// Role given to the model when none is configured
pub const DEFAULT_ROLE: &str = "You are a helpful support assistant. Your users are asking questions about our product or policy documentation.";

/// Appended to every role; the model may only answer from the retrieved text
pub const GROUNDING_INSTRUCTION: &str = "Use only the provided content to answer accurately. If the information below does not contain the answer, say that you cannot answer from the provided content.";

/// Builds the grounded prompt sent to the generator
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    role: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        PromptTemplate::new(DEFAULT_ROLE)
    }
}

impl PromptTemplate {
    /// A template with a custom role description. The grounding instruction is
    /// always included.
    pub fn new(role: impl Into<String>) -> Self {
        PromptTemplate {
            role: role.into().trim().to_string(),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Assemble the prompt from the question and the retrieved chunk texts, best match first
    pub fn assemble<T: AsRef<str>>(&self, query: &str, chunks: &[T]) -> String {
        let context = build_context(chunks);
        let preamble = if self.role.is_empty() {
            GROUNDING_INSTRUCTION.to_string()
        } else {
            format!("{} {}", self.role, GROUNDING_INSTRUCTION)
        };
        format!(
            "{}\n\nQuestion: {}\n\nInformation:\n{}",
            preamble, query, context
        )
    }
}

/// Join trimmed chunk texts with a blank line
pub fn build_context<T: AsRef<str>>(chunks: &[T]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.as_ref().trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_layout() {
        let template = PromptTemplate::new("You are a billing assistant.");
        let prompt = template.assemble(
            "How long do refunds take?",
            &["  Refunds take 5 days.\n", "Refunds go to the original card."],
        );

        assert_eq!(
            prompt,
            format!(
                "You are a billing assistant. {}\n\nQuestion: How long do refunds take?\n\nInformation:\nRefunds take 5 days.\n\nRefunds go to the original card.",
                GROUNDING_INSTRUCTION
            )
        );
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let template = PromptTemplate::default();
        let chunks = vec!["b".to_string(), "a".to_string()];
        let first = template.assemble("q", &chunks);
        let second = template.assemble("q", &chunks);
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert!(first.ends_with("Information:\nb\n\na"));
    }

    #[test]
    fn test_grounding_instruction_cannot_be_dropped() {
        let template = PromptTemplate::new("");
        let prompt = template.assemble("q", &["c"]);
        assert!(prompt.starts_with(GROUNDING_INSTRUCTION));
        assert!(PromptTemplate::default().role().starts_with("You are a helpful support assistant"));
    }
}

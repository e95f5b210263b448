//! Prompt construction for grounded answers

use docrag_core::ScoredChunk;

/// Builder for constructing RAG prompts
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            system_instruction: String::new(),
            context_sections: Vec::new(),
            question: String::new(),
            instructions: Vec::new(),
        }
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    ///
    /// Empty sections are omitted.
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("<chunks>\n");
            prompt.push_str(&self.context_sections.join("\n"));
            prompt.push_str("\n</chunks>\n\n");
        }

        if !self.question.is_empty() {
            prompt.push_str("<question>\n");
            prompt.push_str(&self.question);
            prompt.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str(&self.instructions.join(" "));
            prompt.push('\n');
        }

        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Label one retrieved passage as `[n — doc_id]: text`, numbering from 1
pub fn passage_label(number: usize, passage: &ScoredChunk) -> String {
    format!(
        "[{number} — {}]: {}",
        passage.metadata.doc_id, passage.metadata.text
    )
}

/// Prompt asking the model to answer `question` from numbered `passages`
///
/// Passages keep their retrieval order. The distance scores are not shown
/// to the model.
pub fn format_passages(passages: &[ScoredChunk], question: &str) -> String {
    passages
        .iter()
        .enumerate()
        .fold(PromptBuilder::new(), |builder, (i, passage)| {
            builder.add_context(passage_label(i + 1, passage))
        })
        .system(
            "Use the following passages to answer the question. \
             Cite the passage number when relevant.",
        )
        .question(question)
        .add_instruction("Answer clearly and concisely.")
        .add_instruction("If the passages do not contain the answer, say so.")
        .build()
}

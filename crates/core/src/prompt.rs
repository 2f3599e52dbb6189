//! Prompt templates for answering, question condensing and context extraction.

use crate::llm::ChatMessage;

pub const NOT_READY_ANSWER: &str =
    "Sorry, the system is not ready yet. Make sure documents have been loaded into the vector store.";

/// Marker the extraction prompt asks the model to emit when nothing is relevant.
pub const NO_OUTPUT: &str = "NO_OUTPUT";

pub struct PromptBuilder;

impl PromptBuilder {
    /// Final answer prompt over retrieved context and prior turns.
    pub fn build_answer_prompt(context: &str, chat_history: &str, question: &str) -> Vec<ChatMessage> {
        let prompt = format!(
            r#"You are an AI assistant that answers questions based on the provided documents.
Use the following context to answer the user's question accurately and informatively.

Context from documents:
{context}

Conversation history:
{chat_history}

Question: {question}

Instructions:
1. Answer the question based on the given context
2. If the information is not available in the context, say that you do not have that information
3. Give a clear and easy to understand answer
4. Include references to the source documents when relevant

Answer:"#
        );
        vec![ChatMessage::user(prompt)]
    }

    /// Rewrites a follow-up into a question that stands on its own.
    pub fn build_condense_prompt(chat_history: &str, question: &str) -> Vec<ChatMessage> {
        let prompt = format!(
            r#"Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{chat_history}
Follow Up Input: {question}
Standalone question:"#
        );
        vec![ChatMessage::user(prompt)]
    }

    pub fn build_extraction_prompt(question: &str, context: &str) -> Vec<ChatMessage> {
        let prompt = format!(
            r#"Given the following question and context, extract any part of the context *AS IS* that is relevant to answer the question. If none of the context is relevant return {NO_OUTPUT}.

Remember, *DO NOT* edit the extracted parts of the context.

> Question: {question}
> Context:
>>>
{context}
>>>
Extracted relevant parts:"#
        );
        vec![ChatMessage::user(prompt)]
    }

    /// `None` when the model reported nothing relevant.
    pub fn parse_extraction(output: &str) -> Option<String> {
        let trimmed = output.trim();
        if trimmed.is_empty() || trimmed == NO_OUTPUT {
            return None;
        }
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_prompt_carries_all_inputs() {
        let messages = PromptBuilder::build_answer_prompt("CTX", "Human: hi", "What is X?");
        assert_eq!(messages.len(), 1);
        let prompt = &messages[0].content;
        assert!(prompt.contains("Context from documents:\nCTX"));
        assert!(prompt.contains("Conversation history:\nHuman: hi"));
        assert!(prompt.contains("Question: What is X?"));
    }

    #[test]
    fn extraction_output_is_parsed() {
        assert_eq!(PromptBuilder::parse_extraction("  NO_OUTPUT \n"), None);
        assert_eq!(PromptBuilder::parse_extraction("   "), None);
        assert_eq!(
            PromptBuilder::parse_extraction(" relevant line\n"),
            Some("relevant line".to_string())
        );
    }
}

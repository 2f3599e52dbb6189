use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Ai,
}

impl Speaker {
    fn label(&self) -> &'static str {
        match self {
            Speaker::Human => "Human",
            Speaker::Ai => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    #[serde(rename = "type")]
    pub speaker: Speaker,
    pub content: String,
}

/// Unbounded buffer of conversation turns, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed question/answer pair.
    pub fn push_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::Human,
            content: question.into(),
        });
        self.turns.push(Turn {
            speaker: Speaker::Ai,
            content: answer.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// History as prompt text, one `Speaker: content` line per turn.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker.label(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchanges_alternate_speakers() {
        let mut memory = ConversationMemory::new();
        memory.push_exchange("What is Rust?", "A language.");
        memory.push_exchange("Is it fast?", "Yes.");

        assert_eq!(memory.len(), 4);
        let speakers: Vec<Speaker> = memory.turns().iter().map(|turn| turn.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::Human, Speaker::Ai, Speaker::Human, Speaker::Ai]
        );
        assert_eq!(
            memory.render(),
            "Human: What is Rust?\nAssistant: A language.\nHuman: Is it fast?\nAssistant: Yes."
        );
    }

    #[test]
    fn clear_is_idempotent() {
        let mut memory = ConversationMemory::new();
        memory.push_exchange("q", "a");
        memory.clear();
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.render(), "");
    }

    #[test]
    fn turns_serialize_with_type_tag() -> Result<(), serde_json::Error> {
        let turn = Turn {
            speaker: Speaker::Ai,
            content: "hello".to_string(),
        };
        let encoded = serde_json::to_value(&turn)?;
        assert_eq!(encoded["type"], "ai");
        Ok(())
    }
}

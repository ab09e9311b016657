use super::message::{Message, SystemMessage, UserMessage};
use crate::options::ChatOptions;

/// Full input to a chat completion: ordered instructions plus an options object.
///
/// A prompt is never edited in place; the `augment_*` helpers and [`Prompt::mutate`]
/// return new values.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    instructions: Vec<Message>,
    options: Option<Box<dyn ChatOptions>>,
}

impl Prompt {
    pub fn new(instructions: Vec<Message>) -> Self {
        Self {
            instructions,
            options: None,
        }
    }

    pub fn with_options(instructions: Vec<Message>, options: Option<Box<dyn ChatOptions>>) -> Self {
        Self {
            instructions,
            options,
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    pub fn builder() -> PromptBuilder {
        PromptBuilder::default()
    }

    pub fn instructions(&self) -> &[Message] {
        &self.instructions
    }

    pub fn options(&self) -> Option<&dyn ChatOptions> {
        self.options.as_deref()
    }

    /// The last user message, if any.
    pub fn user_message(&self) -> Option<&UserMessage> {
        self.instructions.iter().rev().find_map(Message::as_user)
    }

    /// The first system message, if any.
    pub fn system_message(&self) -> Option<&SystemMessage> {
        self.instructions.iter().find_map(|m| match m {
            Message::System(s) => Some(s),
            _ => None,
        })
    }

    /// Concatenated text of every instruction.
    pub fn contents(&self) -> String {
        self.instructions
            .iter()
            .map(Message::text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Rewrites the last user message, appending an empty one when there is none.
    pub fn augment_user_message(&self, f: impl FnOnce(&UserMessage) -> UserMessage) -> Prompt {
        let mut instructions = self.instructions.clone();
        match instructions
            .iter()
            .rposition(|m| matches!(m, Message::User(_)))
        {
            Some(idx) => {
                if let Message::User(user) = &instructions[idx] {
                    instructions[idx] = Message::User(f(user));
                }
            }
            None => instructions.push(Message::User(f(&UserMessage::default()))),
        }
        Prompt::with_options(instructions, self.options.clone())
    }

    /// Rewrites the first system message, prepending an empty one when there is none.
    pub fn augment_system_message(
        &self,
        f: impl FnOnce(&SystemMessage) -> SystemMessage,
    ) -> Prompt {
        let mut instructions = self.instructions.clone();
        match instructions
            .iter()
            .position(|m| matches!(m, Message::System(_)))
        {
            Some(idx) => {
                if let Message::System(system) = &instructions[idx] {
                    instructions[idx] = Message::System(f(system));
                }
            }
            None => instructions.insert(0, Message::System(f(&SystemMessage::default()))),
        }
        Prompt::with_options(instructions, self.options.clone())
    }

    /// Start a builder seeded with a copy of this prompt.
    pub fn mutate(&self) -> PromptBuilder {
        PromptBuilder {
            instructions: self.instructions.clone(),
            options: self.options.clone(),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::from_text(text)
    }
}

#[derive(Debug, Default)]
pub struct PromptBuilder {
    instructions: Vec<Message>,
    options: Option<Box<dyn ChatOptions>>,
}

impl PromptBuilder {
    pub fn message(mut self, message: Message) -> Self {
        self.instructions.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.instructions = messages.into_iter().collect();
        self
    }

    pub fn options(mut self, options: Box<dyn ChatOptions>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn maybe_options(mut self, options: Option<Box<dyn ChatOptions>>) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Prompt {
        Prompt {
            instructions: self.instructions,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DefaultChatOptions;

    #[test]
    fn test_user_message_is_last_user() {
        let prompt = Prompt::new(vec![
            Message::user("first"),
            Message::assistant("ok"),
            Message::user("second"),
        ]);
        assert_eq!(prompt.user_message().unwrap().text, "second");
        assert!(prompt.system_message().is_none());
    }

    #[test]
    fn test_augment_user_message_leaves_original_untouched() {
        let prompt = Prompt::new(vec![Message::system("sys"), Message::user("q")]);
        let augmented = prompt.augment_user_message(|u| u.clone().with_text(format!("{}!", u.text)));
        assert_eq!(augmented.user_message().unwrap().text, "q!");
        assert_eq!(prompt.user_message().unwrap().text, "q");
    }

    #[test]
    fn test_augment_system_message_inserts_when_missing() {
        let prompt = Prompt::from_text("q");
        let augmented = prompt.augment_system_message(|_| SystemMessage::new("be brief"));
        assert_eq!(augmented.instructions()[0], Message::system("be brief"));
        assert_eq!(augmented.instructions().len(), 2);
    }

    #[test]
    fn test_mutate_keeps_options() {
        let options = DefaultChatOptions::builder().model("llama3.2").build();
        let prompt = Prompt::builder()
            .message(Message::user("q"))
            .options(Box::new(options))
            .build();
        let copy = prompt.mutate().message(Message::assistant("a")).build();
        assert_eq!(
            copy.options().unwrap().sampling().model.as_deref(),
            Some("llama3.2")
        );
        assert_eq!(prompt.instructions().len(), 1);
        assert_eq!(copy.instructions().len(), 2);
    }
}

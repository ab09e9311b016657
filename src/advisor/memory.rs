use super::aggregator::MessageAggregator;
use super::chain::{CallAdvisorChain, StreamAdvisorChain};
use super::request::{ChatClientRequest, ChatClientResponse};
use super::{Advisor, CallAdvisor, StreamAdvisor, HIGHEST_PRECEDENCE};
use crate::types::{Message, MessageType, Prompt};
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Context key selecting the conversation a request belongs to.
pub const CONVERSATION_ID: &str = "chat_memory_conversation_id";

pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Conversation storage used by [`MessageChatMemoryAdvisor`].
#[async_trait]
pub trait ChatMemory: Send + Sync {
    async fn add(&self, conversation_id: &str, messages: Vec<Message>) -> Result<()>;

    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn clear(&self, conversation_id: &str) -> Result<()>;
}

/// Unbounded in-process store keyed by conversation id.
#[derive(Debug, Default)]
pub struct InMemoryChatMemoryRepository {
    conversations: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryChatMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_ids(&self) -> Vec<String> {
        self.conversations.read().await.keys().cloned().collect()
    }

    pub async fn find(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the stored conversation.
    pub async fn save_all(&self, conversation_id: &str, messages: Vec<Message>) {
        self.conversations
            .write()
            .await
            .insert(conversation_id.to_string(), messages);
    }

    pub async fn delete(&self, conversation_id: &str) {
        self.conversations.write().await.remove(conversation_id);
    }
}

/// Keeps the most recent `max_messages` messages of each conversation.
///
/// System messages are never evicted. A new system message replaces the stored ones.
pub struct MessageWindowChatMemory {
    repository: Arc<InMemoryChatMemoryRepository>,
    max_messages: usize,
}

impl Default for MessageWindowChatMemory {
    fn default() -> Self {
        Self {
            repository: Arc::new(InMemoryChatMemoryRepository::new()),
            max_messages: Self::DEFAULT_MAX_MESSAGES,
        }
    }
}

impl MessageWindowChatMemory {
    pub const DEFAULT_MAX_MESSAGES: usize = 20;

    pub fn new(repository: Arc<InMemoryChatMemoryRepository>, max_messages: usize) -> Result<Self> {
        if max_messages == 0 {
            return Err(Error::validation("maxMessages must be greater than 0"));
        }
        Ok(Self {
            repository,
            max_messages,
        })
    }

    fn process(&self, memory: Vec<Message>, new: Vec<Message>) -> Vec<Message> {
        let replaces_system = new
            .iter()
            .any(|m| m.message_type() == MessageType::System && !memory.contains(m));

        let mut processed: Vec<Message> = memory
            .into_iter()
            .filter(|m| !(replaces_system && m.message_type() == MessageType::System))
            .collect();
        processed.extend(new);

        if processed.len() <= self.max_messages {
            return processed;
        }
        let mut to_remove = processed.len() - self.max_messages;
        processed.retain(|m| {
            if m.message_type() == MessageType::System || to_remove == 0 {
                return true;
            }
            to_remove -= 1;
            false
        });
        processed
    }
}

#[async_trait]
impl ChatMemory for MessageWindowChatMemory {
    async fn add(&self, conversation_id: &str, messages: Vec<Message>) -> Result<()> {
        Error::require_text(conversation_id, "conversationId")?;
        let memory = self.repository.find(conversation_id).await;
        let processed = self.process(memory, messages);
        self.repository.save_all(conversation_id, processed).await;
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Error::require_text(conversation_id, "conversationId")?;
        Ok(self.repository.find(conversation_id).await)
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        Error::require_text(conversation_id, "conversationId")?;
        self.repository.delete(conversation_id).await;
        Ok(())
    }
}

/// Prepends the stored conversation to every prompt and records each exchange.
pub struct MessageChatMemoryAdvisor {
    memory: Arc<dyn ChatMemory>,
    default_conversation_id: String,
    order: i32,
}

impl MessageChatMemoryAdvisor {
    pub const DEFAULT_ORDER: i32 = HIGHEST_PRECEDENCE + 1000;

    pub fn new(memory: Arc<dyn ChatMemory>) -> Self {
        Self {
            memory,
            default_conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            order: Self::DEFAULT_ORDER,
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.default_conversation_id = conversation_id.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn conversation_id(&self, context: &super::AdvisorContext) -> String {
        context
            .get(CONVERSATION_ID)
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_conversation_id)
            .to_string()
    }

    async fn load(&self, request: ChatClientRequest) -> Result<ChatClientRequest> {
        let conversation_id = self.conversation_id(request.context());
        let mut messages = self.memory.get(&conversation_id).await?;
        messages.extend(request.prompt().instructions().iter().cloned());

        // A system message, if any, goes first.
        if let Some(pos) = messages
            .iter()
            .position(|m| m.message_type() == MessageType::System)
        {
            let system = messages.remove(pos);
            messages.insert(0, system);
        }

        if let Some(user) = request.prompt().user_message() {
            self.memory
                .add(&conversation_id, vec![Message::User(user.clone())])
                .await?;
        }

        let options = request.prompt().options().map(|o| o.clone_options());
        let prompt = Prompt::with_options(messages, options);
        request.mutate().prompt(prompt).build()
    }

    async fn save(&self, response: &ChatClientResponse) -> Result<()> {
        let outputs: Vec<Message> = response
            .chat_response()
            .map(|c| {
                c.results
                    .iter()
                    .map(|g| Message::Assistant(g.output.clone()))
                    .collect()
            })
            .unwrap_or_default();
        if outputs.is_empty() {
            return Ok(());
        }
        let conversation_id = self.conversation_id(response.context());
        self.memory.add(&conversation_id, outputs).await
    }
}

impl Advisor for MessageChatMemoryAdvisor {
    fn name(&self) -> &str {
        "MessageChatMemoryAdvisor"
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[async_trait]
impl CallAdvisor for MessageChatMemoryAdvisor {
    async fn advise_call(
        &self,
        request: ChatClientRequest,
        chain: &CallAdvisorChain,
    ) -> Result<ChatClientResponse> {
        let request = self.load(request).await?;
        let response = chain.next_call(request).await?;
        self.save(&response).await?;
        Ok(response)
    }
}

impl StreamAdvisor for MessageChatMemoryAdvisor {
    /// The assistant reply is stored once the stream has been fully aggregated.
    fn advise_stream(
        self: Arc<Self>,
        request: ChatClientRequest,
        chain: StreamAdvisorChain,
    ) -> BoxStream<'static, ChatClientResponse> {
        Box::pin(async_stream::try_stream! {
            let request = self.load(request).await?;
            let mut stream = chain.next_stream(request);
            let mut aggregator = MessageAggregator::new();
            while let Some(item) = stream.next().await {
                let item = item?;
                aggregator.add(&item);
                yield item;
            }
            if let Some(aggregated) = aggregator.finish() {
                self.save(&aggregated).await?;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{AdvisorChainBuilder, AdvisorContext, AdvisorHandle};
    use crate::model::ChatModel;
    use crate::types::{AssistantMessage, ChatResponse, Generation};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_window_evicts_oldest_but_keeps_system() {
        let memory =
            MessageWindowChatMemory::new(Arc::new(InMemoryChatMemoryRepository::new()), 3).unwrap();
        memory
            .add("c", vec![Message::system("rules"), Message::user("1"), Message::assistant("2")])
            .await
            .unwrap();
        memory
            .add("c", vec![Message::user("3"), Message::assistant("4")])
            .await
            .unwrap();

        let texts: Vec<String> = memory
            .get("c")
            .await
            .unwrap()
            .iter()
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(texts, vec!["rules", "3", "4"]);
    }

    #[tokio::test]
    async fn test_new_system_message_replaces_old() {
        let memory = MessageWindowChatMemory::default();
        memory.add("c", vec![Message::system("old")]).await.unwrap();
        memory.add("c", vec![Message::system("new")]).await.unwrap();
        let stored = memory.get("c").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text(), "new");
    }

    #[tokio::test]
    async fn test_blank_conversation_id_is_rejected() {
        let memory = MessageWindowChatMemory::default();
        assert!(memory.get("").await.unwrap_err().is_validation());
    }

    /// Echoes the number of messages it received.
    struct Counter {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl ChatModel for Counter {
        async fn call(&self, prompt: Prompt) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(prompt.instructions().len());
            Ok(ChatResponse::new(vec![Generation::new(AssistantMessage::new("ack"))]))
        }
    }

    #[tokio::test]
    async fn test_advisor_replays_conversation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let memory: Arc<dyn ChatMemory> = Arc::new(MessageWindowChatMemory::default());
        let chain = AdvisorChainBuilder::new()
            .push(AdvisorHandle::both(MessageChatMemoryAdvisor::new(memory.clone())))
            .build_call_chain(Arc::new(Counter { seen: seen.clone() }));

        for text in ["one", "two"] {
            let request =
                ChatClientRequest::new(Prompt::from_text(text), AdvisorContext::new()).unwrap();
            chain.next_call(request).await.unwrap();
        }

        // Second call sees: user one, assistant ack, user two.
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
        assert_eq!(memory.get(DEFAULT_CONVERSATION_ID).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_conversation_id_comes_from_context() {
        let memory: Arc<dyn ChatMemory> = Arc::new(MessageWindowChatMemory::default());
        let chain = AdvisorChainBuilder::new()
            .push(AdvisorHandle::both(MessageChatMemoryAdvisor::new(memory.clone())))
            .build_stream_chain(Arc::new(Counter {
                seen: Arc::new(Mutex::new(Vec::new())),
            }));
        let request = ChatClientRequest::builder()
            .prompt(Prompt::from_text("hi"))
            .context_entry(CONVERSATION_ID, "alice")
            .build()
            .unwrap();
        let items: Vec<_> = chain.next_stream(request).collect().await;
        assert_eq!(items.len(), 1);

        assert_eq!(memory.get("alice").await.unwrap().len(), 2);
        assert!(memory.get(DEFAULT_CONVERSATION_ID).await.unwrap().is_empty());
    }
}

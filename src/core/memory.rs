//! Conversational and long-term memory
//!
//! Maintains conversations with their rolling context window, a bounded log
//! of semantic memory entries, and the user profile. All of it is
//! best-effort: write failures are logged and swallowed so a broken store
//! never blocks a conversation. A record that cannot be read is never
//! rewritten; the write is skipped instead.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::conversation::{Conversation, ConversationMessage};
use crate::storage::{keys, MemoryStore};

/// Maximum number of memory entries kept; oldest are evicted first
pub const MAX_MEMORY_ENTRIES: usize = 1000;

/// Maximum number of remembered distinct questions
pub const MAX_COMMON_QUESTIONS: usize = 20;

/// Default result count for [`ConversationMemory::find_relevant_memories`]
pub const DEFAULT_MEMORY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Preference,
    Fact,
    Context,
    Pattern,
}

/// A durable fact, preference, pattern or context record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_relevance")]
    pub relevance: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

fn default_relevance() -> f64 {
    1.0
}

impl MemoryEntry {
    pub fn new<I, S>(kind: MemoryKind, content: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            relevance: default_relevance(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive substring match on content or any tag.
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

/// Coarse interaction categories counted in the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionCategory {
    Weather,
    Music,
    Calls,
    Navigation,
    Images,
    Questions,
    General,
}

/// Checked in order; first hit wins
const CATEGORY_KEYWORDS: &[(InteractionCategory, &[&str])] = &[
    (InteractionCategory::Weather, &["tiempo", "clima"]),
    (InteractionCategory::Music, &["música", "canción"]),
    (InteractionCategory::Calls, &["llamar", "teléfono"]),
    (InteractionCategory::Navigation, &["navegar", "ir a"]),
    (InteractionCategory::Images, &["imagen", "generar"]),
    (InteractionCategory::Questions, &["qué", "cómo"]),
];

impl InteractionCategory {
    pub fn classify(query: &str) -> Self {
        let query = query.to_lowercase();
        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| query.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(InteractionCategory::General)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionCategory::Weather => "weather",
            InteractionCategory::Music => "music",
            InteractionCategory::Calls => "calls",
            InteractionCategory::Navigation => "navigation",
            InteractionCategory::Images => "images",
            InteractionCategory::Questions => "questions",
            InteractionCategory::General => "general",
        }
    }
}

/// The single user's profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, Value>,
    /// Distinct questions in first-asked order
    #[serde(default)]
    pub common_questions: Vec<String>,
    #[serde(default)]
    pub favorite_topics: Vec<String>,
    /// Interaction count per [`InteractionCategory`]
    #[serde(default)]
    pub interaction_patterns: BTreeMap<String, u64>,
}

impl UserProfile {
    /// Count one interaction and remember the question
    pub fn observe(&mut self, query: &str) -> InteractionCategory {
        let category = InteractionCategory::classify(query);
        *self
            .interaction_patterns
            .entry(category.as_str().to_string())
            .or_insert(0) += 1;

        if self.common_questions.len() < MAX_COMMON_QUESTIONS
            && !self.common_questions.iter().any(|q| q == query)
        {
            self.common_questions.push(query.to_string());
        }
        category
    }
}

/// Partial profile update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, Value>,
    #[serde(default)]
    pub favorite_topics: Option<Vec<String>>,
}

/// Memory material used to enrich a chat prompt
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub user_name: Option<String>,
    pub memories: Vec<MemoryEntry>,
    pub transcript: String,
}

/// Append with FIFO eviction beyond `cap`
pub fn push_capped(log: &mut Vec<MemoryEntry>, entry: MemoryEntry, cap: usize) {
    log.push(entry);
    if log.len() > cap {
        let excess = log.len() - cap;
        log.drain(..excess);
    }
}

/// Entries matching `query`, ranked by relevance then recency
pub fn rank_memories(log: &[MemoryEntry], query: &str, limit: usize) -> Vec<MemoryEntry> {
    let needle = query.to_lowercase();
    // Newest first so ties on both keys still favour recent entries
    let mut hits: Vec<MemoryEntry> = log
        .iter()
        .rev()
        .filter(|e| e.matches(&needle))
        .cloned()
        .collect();

    hits.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    hits.truncate(limit);
    hits
}

/// Store-backed conversational memory
pub struct ConversationMemory {
    store: MemoryStore,
    default_user_name: Option<String>,
    /// Serializes load-modify-save cycles within this process
    writes: Mutex<()>,
}

impl ConversationMemory {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            default_user_name: None,
            writes: Mutex::new(()),
        }
    }

    /// Name given to a freshly created profile
    pub fn with_default_user_name(mut self, name: Option<String>) -> Self {
        self.default_user_name = name;
        self
    }

    // ---------------------------------------------------------------------
    // Conversations
    // ---------------------------------------------------------------------

    /// All conversations, most recently updated first
    pub async fn conversations(&self) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self.store.load(keys::CONVERSATIONS).await;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations
    }

    pub async fn conversation(&self, id: &str) -> Option<Conversation> {
        let conversations: Vec<Conversation> = self.store.load(keys::CONVERSATIONS).await;
        conversations.into_iter().find(|c| c.id == id)
    }

    pub async fn create_conversation(&self, title: impl Into<String>) -> Conversation {
        let _guard = self.writes.lock().await;
        let conversation = Conversation::new(title);

        if let Some(mut conversations) = self.load_for_write::<Vec<Conversation>>(keys::CONVERSATIONS).await {
            conversations.push(conversation.clone());
            self.persist(keys::CONVERSATIONS, &conversations).await;
        }

        tracing::debug!(id = %conversation.id, "Created conversation");
        conversation
    }

    /// Append to a conversation. Unknown ids are logged and ignored.
    pub async fn append_message(&self, conversation_id: &str, message: ConversationMessage) -> bool {
        let _guard = self.writes.lock().await;
        let Some(mut conversations) = self.load_for_write::<Vec<Conversation>>(keys::CONVERSATIONS).await else {
            return false;
        };

        let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id) else {
            tracing::warn!(conversation_id, "Append to unknown conversation ignored");
            return false;
        };

        conversation.push(message);
        self.persist(keys::CONVERSATIONS, &conversations).await;
        true
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> bool {
        let _guard = self.writes.lock().await;
        let Some(mut conversations) = self.load_for_write::<Vec<Conversation>>(keys::CONVERSATIONS).await else {
            return false;
        };
        let before = conversations.len();
        conversations.retain(|c| c.id != conversation_id);

        if conversations.len() == before {
            return false;
        }
        self.persist(keys::CONVERSATIONS, &conversations).await;
        true
    }

    // ---------------------------------------------------------------------
    // Semantic memory
    // ---------------------------------------------------------------------

    pub async fn save_memory_entry<I, S>(
        &self,
        kind: MemoryKind,
        content: impl Into<String>,
        tags: I,
    ) -> MemoryEntry
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _guard = self.writes.lock().await;
        let entry = MemoryEntry::new(kind, content, tags);
        self.append_entry(entry.clone()).await;
        entry
    }

    async fn append_entry(&self, entry: MemoryEntry) {
        let Some(mut log) = self.load_for_write::<Vec<MemoryEntry>>(keys::MEMORY).await else {
            return;
        };
        push_capped(&mut log, entry, MAX_MEMORY_ENTRIES);
        self.persist(keys::MEMORY, &log).await;
    }

    #[cfg(test)]
    pub async fn memory_entries(&self) -> Vec<MemoryEntry> {
        self.store.load(keys::MEMORY).await
    }

    pub async fn find_relevant_memories(&self, query: &str, limit: usize) -> Vec<MemoryEntry> {
        let log: Vec<MemoryEntry> = self.store.load(keys::MEMORY).await;
        rank_memories(&log, query, limit)
    }

    /// Log the exchange, count its category and remember the question
    pub async fn record_interaction(&self, query: &str, response: &str) {
        let _guard = self.writes.lock().await;

        let entry = MemoryEntry::new(
            MemoryKind::Context,
            format!("Q: {} | A: {}", query, response),
            ["conversation"],
        );
        self.append_entry(entry).await;

        if let Some(mut profile) = self.load_profile_for_write().await {
            let category = profile.observe(query);
            self.persist(keys::PROFILE, &profile).await;
            tracing::debug!(category = category.as_str(), "Recorded interaction");
        }
    }

    // ---------------------------------------------------------------------
    // Profile
    // ---------------------------------------------------------------------

    pub async fn profile(&self) -> UserProfile {
        self.load_profile().await
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> UserProfile {
        let _guard = self.writes.lock().await;
        let Some(mut profile) = self.load_profile_for_write().await else {
            return self.load_profile().await;
        };

        if let Some(name) = update.name {
            profile.name = name.trim().to_string();
        }
        profile.preferences.extend(update.preferences);
        if let Some(topics) = update.favorite_topics {
            profile.favorite_topics = topics;
        }

        self.persist(keys::PROFILE, &profile).await;
        profile
    }

    async fn load_profile(&self) -> UserProfile {
        self.store
            .try_load(keys::PROFILE)
            .await
            .unwrap_or_else(|| self.new_profile())
    }

    async fn load_profile_for_write(&self) -> Option<UserProfile> {
        match self.store.read(keys::PROFILE).await {
            Ok(profile) => Some(profile.unwrap_or_else(|| self.new_profile())),
            Err(e) => {
                tracing::warn!(key = keys::PROFILE, error = %e, "Memory read failed, write skipped");
                None
            }
        }
    }

    fn new_profile(&self) -> UserProfile {
        UserProfile {
            name: self.default_user_name.clone().unwrap_or_default(),
            ..UserProfile::default()
        }
    }

    // ---------------------------------------------------------------------
    // Prompt enrichment and wipe
    // ---------------------------------------------------------------------

    pub async fn prompt_context(&self, conversation_id: Option<&str>, query: &str) -> PromptContext {
        let profile = self.load_profile().await;
        let memories = self
            .find_relevant_memories(query, DEFAULT_MEMORY_LIMIT)
            .await;
        let transcript = match conversation_id {
            Some(id) => self
                .conversation(id)
                .await
                .map(|c| c.context)
                .unwrap_or_default(),
            None => String::new(),
        };

        PromptContext {
            user_name: Some(profile.name).filter(|n| !n.is_empty()),
            memories,
            transcript,
        }
    }

    /// Forget conversations, memory entries and the profile
    pub async fn clear(&self) {
        let _guard = self.writes.lock().await;
        for key in [keys::CONVERSATIONS, keys::MEMORY, keys::PROFILE] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key, error = %e, "Failed to clear memory record");
            }
        }
        tracing::info!("Memory cleared");
    }

    /// Current record for a load-modify-save cycle, `None` when the store
    /// could not be read
    async fn load_for_write<T: DeserializeOwned + Default>(&self, key: &str) -> Option<T> {
        match self.store.read(key).await {
            Ok(value) => Some(value.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(key, error = %e, "Memory read failed, write skipped");
                None
            }
        }
    }

    async fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.store.save(key, value).await {
            tracing::warn!(key, error = %e, "Memory write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::storage::testing::FlakyStore;
    use std::sync::Arc;

    fn memory() -> ConversationMemory {
        ConversationMemory::new(MemoryStore::in_memory())
    }

    #[test]
    fn test_classify_categories_in_order() {
        assert_eq!(InteractionCategory::classify("¿Qué tiempo hace?"), InteractionCategory::Weather);
        assert_eq!(InteractionCategory::classify("Pon una canción"), InteractionCategory::Music);
        assert_eq!(InteractionCategory::classify("LLAMAR a mamá"), InteractionCategory::Calls);
        assert_eq!(InteractionCategory::classify("quiero ir a casa"), InteractionCategory::Navigation);
        assert_eq!(InteractionCategory::classify("generar un logo"), InteractionCategory::Images);
        assert_eq!(InteractionCategory::classify("¿cómo estás?"), InteractionCategory::Questions);
        assert_eq!(InteractionCategory::classify("hola"), InteractionCategory::General);
        // "imagen" outranks "qué"
        assert_eq!(InteractionCategory::classify("qué imagen es esa"), InteractionCategory::Images);
    }

    #[test]
    fn test_push_capped_evicts_oldest() {
        let mut log = Vec::new();
        for i in 0..=MAX_MEMORY_ENTRIES {
            push_capped(
                &mut log,
                MemoryEntry::new(MemoryKind::Fact, format!("hecho {}", i), Vec::<String>::new()),
                MAX_MEMORY_ENTRIES,
            );
        }

        assert_eq!(log.len(), MAX_MEMORY_ENTRIES);
        assert_eq!(log.first().unwrap().content, "hecho 1");
        assert_eq!(log.last().unwrap().content, format!("hecho {}", MAX_MEMORY_ENTRIES));
        assert!(log.iter().all(|e| e.content != "hecho 0"));
    }

    #[test]
    fn test_rank_memories_filters_and_limits() {
        let mut log = Vec::new();
        for i in 0..8 {
            log.push(MemoryEntry::new(MemoryKind::Fact, format!("Le gusta el Jazz {}", i), ["música"]));
        }
        log.push(MemoryEntry::new(MemoryKind::Preference, "Prefiere té", ["bebidas"]));
        log.push(MemoryEntry::new(MemoryKind::Fact, "Vive en Sevilla", ["JAZZ-club"]));

        let hits = rank_memories(&log, "jazz", 5);
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|e| {
            e.content.to_lowercase().contains("jazz")
                || e.tags.iter().any(|t| t.to_lowercase().contains("jazz"))
        }));
        // Newest matching entry first
        assert_eq!(hits[0].content, "Vive en Sevilla");

        assert!(rank_memories(&log, "café", 5).is_empty());
    }

    #[test]
    fn test_rank_memories_prefers_relevance() {
        let mut low = MemoryEntry::new(MemoryKind::Fact, "perro nuevo", Vec::<String>::new());
        low.relevance = 0.5;
        let high = MemoryEntry::new(MemoryKind::Fact, "perro viejo", Vec::<String>::new());
        let mut older_high = high.clone();
        older_high.id = "older".into();
        older_high.content = "perro antiguo".into();
        older_high.timestamp = high.timestamp - chrono::Duration::seconds(60);

        let hits = rank_memories(&[older_high, high, low], "perro", 5);
        let order: Vec<&str> = hits.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(order, vec!["perro viejo", "perro antiguo", "perro nuevo"]);
    }

    #[test]
    fn test_profile_common_questions_bounded_and_unique() {
        let mut profile = UserProfile::default();
        for i in 0..30 {
            profile.observe(&format!("pregunta {}", i));
            profile.observe(&format!("pregunta {}", i));
        }

        assert_eq!(profile.common_questions.len(), MAX_COMMON_QUESTIONS);
        let unique: BTreeSet<&String> = profile.common_questions.iter().collect();
        assert_eq!(unique.len(), profile.common_questions.len());
        assert_eq!(profile.common_questions[0], "pregunta 0");
        assert_eq!(profile.interaction_patterns["general"], 60);
    }

    #[tokio::test]
    async fn test_conversation_lifecycle() {
        let memory = memory();
        let conversation = memory.create_conversation("Planes").await;
        assert!(conversation.messages.is_empty());

        assert!(memory.append_message(&conversation.id, ConversationMessage::user("Hola")).await);
        assert!(
            memory
                .append_message(&conversation.id, ConversationMessage::assistant("Hola, señor"))
                .await
        );

        let stored = memory.conversation(&conversation.id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[1].role, Role::Assistant);
        assert_eq!(stored.context, "User: Hola\nAssistant: Hola, señor");

        assert!(memory.delete_conversation(&conversation.id).await);
        assert!(memory.conversation(&conversation.id).await.is_none());
        assert!(!memory.delete_conversation(&conversation.id).await);
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation_is_noop() {
        let memory = memory();
        let appended = memory
            .append_message("no-such-id", ConversationMessage::user("Hola"))
            .await;
        assert!(!appended);
        assert!(memory.conversations().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_memory_entry_cap() {
        let memory = memory();
        let first = memory
            .save_memory_entry(MemoryKind::Fact, "primero", ["inicio"])
            .await;
        for i in 1..MAX_MEMORY_ENTRIES {
            memory
                .save_memory_entry(MemoryKind::Fact, format!("dato {}", i), Vec::<String>::new())
                .await;
        }
        let newest = memory
            .save_memory_entry(MemoryKind::Fact, "el más nuevo", Vec::<String>::new())
            .await;

        let log = memory.memory_entries().await;
        assert_eq!(log.len(), MAX_MEMORY_ENTRIES);
        assert!(log.iter().any(|e| e.id == newest.id));
        assert!(log.iter().all(|e| e.id != first.id));
    }

    #[tokio::test]
    async fn test_record_interaction() {
        let memory = memory();
        memory
            .record_interaction("¿Qué tiempo hace en Madrid?", "Soleado, 25 grados")
            .await;
        memory
            .record_interaction("¿Qué tiempo hace en Madrid?", "Nublado")
            .await;

        let entries = memory.find_relevant_memories("conversation", 10).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, MemoryKind::Context);
        assert_eq!(entries[0].content, "Q: ¿Qué tiempo hace en Madrid? | A: Nublado");

        let profile = memory.profile().await;
        assert_eq!(profile.interaction_patterns["weather"], 2);
        assert_eq!(profile.common_questions, vec!["¿Qué tiempo hace en Madrid?"]);
    }

    #[tokio::test]
    async fn test_profile_defaults_and_update() {
        let memory = memory().with_default_user_name(Some("Tony".into()));
        assert_eq!(memory.profile().await.name, "Tony");

        let mut preferences = BTreeMap::new();
        preferences.insert("units".to_string(), Value::from("metric"));
        let profile = memory
            .update_profile(ProfileUpdate {
                name: Some(" Pepper ".into()),
                preferences,
                favorite_topics: Some(vec!["ciencia".into()]),
            })
            .await;

        assert_eq!(profile.name, "Pepper");
        assert_eq!(profile.preferences["units"], "metric");
        assert_eq!(memory.profile().await, profile);
    }

    #[tokio::test]
    async fn test_prompt_context_and_clear() {
        let memory = memory().with_default_user_name(Some("Tony".into()));
        let conversation = memory.create_conversation("Charla").await;
        memory
            .append_message(&conversation.id, ConversationMessage::user("Me encanta el jazz"))
            .await;
        memory
            .save_memory_entry(MemoryKind::Preference, "Le gusta el jazz", ["música"])
            .await;

        let context = memory.prompt_context(Some(&conversation.id), "jazz").await;
        assert_eq!(context.user_name.as_deref(), Some("Tony"));
        assert_eq!(context.memories.len(), 1);
        assert_eq!(context.transcript, "User: Me encanta el jazz");

        memory.clear().await;
        assert!(memory.conversations().await.is_empty());
        assert!(memory.memory_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_never_overwrites_log() {
        let backend = Arc::new(FlakyStore::new());
        let memory = ConversationMemory::new(MemoryStore::new(backend.clone()));
        for i in 0..50 {
            memory
                .save_memory_entry(MemoryKind::Fact, format!("dato {}", i), Vec::<String>::new())
                .await;
        }

        backend.fail_reads(1);
        memory.record_interaction("hola", "Buenas tardes").await;

        // The log entry was skipped, the profile still counted the interaction
        assert_eq!(memory.memory_entries().await.len(), 50);
        assert_eq!(memory.profile().await.interaction_patterns["general"], 1);
    }

    #[tokio::test]
    async fn test_failed_read_keeps_conversations_and_profile() {
        let backend = Arc::new(FlakyStore::new());
        let memory = ConversationMemory::new(MemoryStore::new(backend.clone()));
        let kept = memory.create_conversation("Primera").await;
        memory
            .update_profile(ProfileUpdate {
                name: Some("Pepper".into()),
                ..ProfileUpdate::default()
            })
            .await;

        backend.fail_reads(1);
        memory.create_conversation("Segunda").await;
        backend.fail_reads(1);
        assert!(!memory.append_message(&kept.id, ConversationMessage::user("Hola")).await);
        backend.fail_reads(1);
        memory.update_profile(ProfileUpdate::default()).await;

        let conversations = memory.conversations().await;
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].id, kept.id);
        assert_eq!(memory.profile().await.name, "Pepper");
    }
}

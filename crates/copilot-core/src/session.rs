//! The conversation context: messages, projects, preview and credential.
//!
//! Owned by whoever drives the turns. Every committed change is written
//! through the injected [`Store`]; a failed write is logged and the
//! in-memory state stays authoritative.

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::export::ChatExport;
use crate::message::{IdClock, Message, RelayMessage, Role};
use crate::preview::Preview;
use crate::project::Project;
use crate::relay::RelayRequest;
use crate::segment::segment;
use crate::store::{load_json, save_json, Store, API_KEY_KEY, MESSAGES_KEY, PROJECTS_KEY};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
When you include code, put it in fenced code blocks tagged with the language.";

pub struct Session {
    store: Box<dyn Store>,
    system_prompt: String,
    messages: Vec<Message>,
    projects: Vec<Project>,
    current_project: Option<u64>,
    preview: Preview,
    api_key: Option<String>,
    ids: IdClock,
}

impl Session {
    /// Read the persisted messages, projects and credential once.
    pub fn load(store: Box<dyn Store>, system_prompt: impl Into<String>) -> Result<Self, Error> {
        let messages: Vec<Message> = load_json(store.as_ref(), MESSAGES_KEY)?.unwrap_or_default();
        let projects: Vec<Project> = load_json(store.as_ref(), PROJECTS_KEY)?.unwrap_or_default();
        let api_key: Option<String> = load_json(store.as_ref(), API_KEY_KEY)?;

        let last_id = messages
            .iter()
            .map(|m| m.id)
            .chain(projects.iter().map(|p| p.id))
            .max()
            .unwrap_or(0);

        info!(
            messages = messages.len(),
            projects = projects.len(),
            has_api_key = api_key.is_some(),
            "Session loaded"
        );

        Ok(Self {
            store,
            system_prompt: system_prompt.into(),
            messages,
            projects,
            current_project: None,
            preview: Preview::default(),
            api_key,
            ids: IdClock::after(last_id),
        })
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: u64) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The request for the next turn: system prompt, then the full history.
    pub fn relay_request(&self) -> RelayRequest {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(RelayMessage::system(self.system_prompt.as_str()));
        }
        messages.extend(self.messages.iter().map(Message::to_relay));
        RelayRequest::new(messages)
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Role::User, content.into())
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
        self.push(Role::Assistant, content.into())
    }

    fn push(&mut self, role: Role, content: String) -> &Message {
        let id = self.ids.next_id();
        let index = self.messages.len();
        self.messages.push(Message::new(id, role, content));
        self.persist_messages();
        &self.messages[index]
    }

    /// Replace the content of a placeholder message with its final text.
    pub fn complete_assistant(&mut self, id: u64, content: impl Into<String>) -> Result<&Message, Error> {
        let index = self
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::invalid_input(format!("No message with id {}", id)))?;
        self.messages[index].content = content.into();
        self.persist_messages();
        Ok(&self.messages[index])
    }

    /// Drop the conversation and its persisted copy, and close the preview.
    pub fn clear(&mut self) {
        self.messages.clear();
        if let Err(e) = self.store.remove(MESSAGES_KEY) {
            warn!("Failed to remove stored messages: {}", e);
        }
        self.preview.clear();
        info!("Conversation cleared");
    }

    pub fn export(&self) -> ChatExport {
        ChatExport::new(&self.messages)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, key: &str) -> Result<(), Error> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::invalid_input("API key cannot be empty"));
        }
        save_json(self.store.as_ref(), API_KEY_KEY, key)?;
        self.api_key = Some(key.to_string());
        Ok(())
    }

    /// Content of the code span addressed by a `"{message_id}-{index}"` id.
    pub fn code_block(&self, code_id: &str) -> Option<String> {
        let (message_id, index) = code_id.trim().rsplit_once('-')?;
        let message_id: u64 = message_id.parse().ok()?;
        let index: usize = index.parse().ok()?;

        let message = self.message(message_id)?;
        let spans = segment(&message.content);
        let code = spans.get(index)?.as_code()?;
        Some(code.content.to_string())
    }

    // ── Preview ─────────────────────────────────────────────────────

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn show_preview(&mut self, code: impl Into<String>) {
        self.preview.show(code);
    }

    pub fn toggle_preview(&mut self) -> bool {
        self.preview.toggle()
    }

    // ── Projects ────────────────────────────────────────────────────

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn current_project(&self) -> Option<&Project> {
        self.current_index().map(|i| &self.projects[i])
    }

    fn current_index(&self) -> Option<usize> {
        let id = self.current_project?;
        self.projects.iter().position(|p| p.id == id)
    }

    fn project_index(&self, id: u64) -> Result<usize, Error> {
        self.projects
            .iter()
            .position(|p| p.id == id)
            .ok_or(Error::ProjectNotFound(id))
    }

    /// Create an empty project and make it current.
    pub fn create_project(&mut self, name: &str) -> Result<&Project, Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("Project name cannot be empty"));
        }
        let project = Project::new(self.ids.next_id(), name, "");
        Ok(self.insert_project(project))
    }

    fn insert_project(&mut self, project: Project) -> &Project {
        debug!(id = project.id, name = %project.name, "Project created");
        self.current_project = Some(project.id);
        let index = self.projects.len();
        self.projects.push(project);
        self.persist_projects();
        &self.projects[index]
    }

    pub fn select_project(&mut self, id: u64) -> Result<&Project, Error> {
        let index = self.project_index(id)?;
        self.current_project = Some(id);
        Ok(&self.projects[index])
    }

    /// Replace the current project's code.
    pub fn save_project(&mut self, code: impl Into<String>) -> Result<&Project, Error> {
        let index = self
            .current_index()
            .ok_or_else(|| Error::invalid_input("No project selected"))?;
        self.projects[index].set_code(code);
        self.persist_projects();
        Ok(&self.projects[index])
    }

    pub fn delete_project(&mut self, id: u64) -> Result<(), Error> {
        let index = self.project_index(id)?;
        self.projects.remove(index);
        if self.current_project == Some(id) {
            self.current_project = None;
        }
        self.persist_projects();
        Ok(())
    }

    /// Append code to the current project, creating `Project N` when none is
    /// selected.
    pub fn add_code_to_project(&mut self, code: &str) -> &Project {
        match self.current_index() {
            Some(index) => {
                self.projects[index].append_code(code);
                self.persist_projects();
                &self.projects[index]
            }
            None => {
                let name = format!("Project {}", self.projects.len() + 1);
                let project = Project::new(self.ids.next_id(), name, code);
                self.insert_project(project)
            }
        }
    }

    fn persist_messages(&self) {
        if let Err(e) = save_json(self.store.as_ref(), MESSAGES_KEY, &self.messages) {
            warn!("Failed to persist messages: {}", e);
        }
    }

    fn persist_projects(&self) {
        if let Err(e) = save_json(self.store.as_ref(), PROJECTS_KEY, &self.projects) {
            warn!("Failed to persist projects: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn session_with(store: &Arc<MemoryStore>) -> Session {
        Session::load(Box::new(Arc::clone(store)), "be brief").unwrap()
    }

    #[test]
    fn test_relay_request_prepends_system_prompt() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);
        session.push_user("hi");
        session.push_assistant("hello");

        let request = session.relay_request();
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0], RelayMessage::system("be brief"));
        assert_eq!(request.messages[1], RelayMessage::user("hi"));
        assert_eq!(request.messages[2], RelayMessage::assistant("hello"));
    }

    #[test]
    fn test_every_change_is_persisted_and_reloaded() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);
        let id = session.push_assistant("").id;
        session.complete_assistant(id, "done").unwrap();
        session.create_project("Site").unwrap();
        session.set_api_key(" sk-test ").unwrap();

        let reloaded = session_with(&store);
        assert_eq!(reloaded.messages().len(), 1);
        assert_eq!(reloaded.messages()[0].content, "done");
        assert_eq!(reloaded.projects()[0].name, "Site");
        assert_eq!(reloaded.api_key(), Some("sk-test"));
        assert!(reloaded.current_project().is_none());
    }

    #[test]
    fn test_ids_continue_after_reload() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);
        let first = session.push_user("one").id;

        let mut reloaded = session_with(&store);
        let second = reloaded.push_user("two").id;
        assert!(second > first);
    }

    #[test]
    fn test_clear_removes_messages_and_preview() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);
        session.push_user("hi");
        session.show_preview("<p>x</p>");
        session.clear();

        assert!(session.messages().is_empty());
        assert_eq!(session.preview(), &Preview::default());
        assert_eq!(store.get(MESSAGES_KEY).unwrap(), None);
    }

    #[test]
    fn test_code_block_lookup() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);
        let id = session
            .push_assistant("Here:\n```js\nlet a = 1;\n```\ndone")
            .id;

        assert_eq!(
            session.code_block(&format!("{}-1", id)),
            Some("let a = 1;\n".to_string())
        );
        assert_eq!(session.code_block(&format!("{}-0", id)), None);
        assert_eq!(session.code_block("nope"), None);
        assert_eq!(session.code_block("1-1"), None);
    }

    #[test]
    fn test_project_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);

        assert!(matches!(
            session.create_project("   "),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(session.save_project("x"), Err(Error::InvalidInput(_))));

        let a = session.create_project("Alpha").unwrap().id;
        let b = session.create_project("Beta").unwrap().id;
        assert_eq!(session.current_project().unwrap().id, b);

        session.select_project(a).unwrap();
        session.save_project("const a = 1;").unwrap();
        assert_eq!(session.current_project().unwrap().code, "const a = 1;");

        session.delete_project(a).unwrap();
        assert!(session.current_project().is_none());
        assert!(matches!(
            session.delete_project(a),
            Err(Error::ProjectNotFound(id)) if id == a
        ));
        assert!(matches!(
            session.select_project(a),
            Err(Error::ProjectNotFound(_))
        ));
        assert_eq!(session.projects().len(), 1);
    }

    #[test]
    fn test_add_code_creates_then_appends() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);

        let project = session.add_code_to_project("let a;");
        assert_eq!(project.name, "Project 1");
        assert_eq!(project.code, "let a;");

        let project = session.add_code_to_project("let b;");
        assert_eq!(project.name, "Project 1");
        assert_eq!(project.code, "let a;\n\n// Added from chat\nlet b;");
        assert_eq!(session.projects().len(), 1);

        let reloaded = session_with(&store);
        assert_eq!(reloaded.projects()[0].code, "let a;\n\n// Added from chat\nlet b;");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(&store);
        assert!(session.set_api_key("  ").is_err());
        assert_eq!(session.api_key(), None);
    }
}

//! FILENAME: engine/src/comments.rs
//! PURPOSE: Threaded cell comments with a dual index for O(1) lookup by
//! thread id and by anchor cell, soft-deleted to preserve reply history.
//! CONTEXT: A `Thread { comments: Vec<Comment> }` collection where a reply
//! and its parent share the same shape and both carry mentions, so every
//! post in a thread is independently resolvable/editable/soft-deletable.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coord::CellCoord;
use crate::error::{EngineError, EngineResult};
use crate::formula_engine::StructuralEdit;

pub type ThreadId = String;
pub type CommentId = String;

/// Upper bound on a single post's text length, after trimming.
pub const MAX_COMMENT_TEXT_LEN: usize = 10_000;

fn validate_author(author_id: &str, author_name: &str) -> EngineResult<()> {
    if author_id.trim().is_empty() {
        return Err(EngineError::InvalidArgument("comment author id must not be empty".to_string()));
    }
    if author_name.trim().is_empty() {
        return Err(EngineError::InvalidArgument("comment author display name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_text(text: &str) -> EngineResult<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidArgument("comment text must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_COMMENT_TEXT_LEN {
        return Err(EngineError::InvalidArgument(format!(
            "comment text must be at most {} characters",
            MAX_COMMENT_TEXT_LEN
        )));
    }
    Ok(())
}

/// Analytics events emitted by every `CommentStore` mutation. Collected
/// in-process and drained by the façade on each call rather than pushed
/// through a callback, since a comment store has no subscriber list of
/// its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommentEvent {
    ThreadAdded { thread_id: ThreadId },
    CommentAdded { thread_id: ThreadId, comment_id: CommentId },
    CommentUpdated { thread_id: ThreadId, comment_id: CommentId },
    CommentDeleted { thread_id: ThreadId, comment_id: CommentId },
    ThreadResolved { thread_id: ThreadId },
    ThreadUnresolved { thread_id: ThreadId },
    ThreadDeleted { thread_id: ThreadId },
    ThreadMoved { thread_id: ThreadId, row: u32, col: u32 },
}

fn new_thread_id() -> ThreadId {
    format!("t_{}_{}", Utc::now().timestamp_millis(), Uuid::new_v4())
}

fn new_comment_id() -> CommentId {
    format!("c_{}_{}", Utc::now().timestamp_millis(), Uuid::new_v4())
}

/// An `@mention` embedded in a comment's rich content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub user_id: String,
    pub display_name: String,
}

/// A single post within a thread: either the thread's opening comment or
/// one of its replies. Both shapes are identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub mentions: Vec<Mention>,
    pub created_at: String,
    pub modified_at: String,
    pub deleted_at: Option<String>,
    pub deleted_by: Option<String>,
}

impl Comment {
    fn new(author_id: String, author_name: String, text: String, mentions: Vec<Mention>) -> Self {
        let now = Utc::now().to_rfc3339();
        Comment {
            id: new_comment_id(),
            author_id,
            author_name,
            text,
            mentions,
            created_at: now.clone(),
            modified_at: now,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A thread anchored to one cell. The thread itself is only ever
/// hard-deleted (via `delete_thread`); individual posts within it are
/// soft-deleted so a reply chain's structure survives moderation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub row: u32,
    pub col: u32,
    pub resolved: bool,
    pub resolved_at: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: String,
    /// Bumped on every mutation to this thread or one of its posts.
    pub version: u64,
    pub comments: Vec<Comment>,
}

impl Thread {
    pub fn opening_comment(&self) -> Option<&Comment> {
        self.comments.first()
    }
}

/// Dual-indexed comment storage: `threads` owns the data, `by_cell` maps
/// an anchor coordinate to every thread rooted there (a cell may carry
/// more than one thread).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CommentStore {
    threads: HashMap<ThreadId, Thread>,
    by_cell: HashMap<CellCoord, Vec<ThreadId>>,
    /// Bumped on every mutation.
    #[serde(default)]
    version: u64,
    #[serde(skip)]
    events: Vec<CommentEvent>,
}

impl CommentStore {
    pub fn new() -> Self {
        CommentStore { threads: HashMap::new(), by_cell: HashMap::new(), version: 0, events: Vec::new() }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn emit(&mut self, event: CommentEvent) {
        self.version += 1;
        self.events.push(event);
    }

    /// Returns every event recorded since the last drain, clearing the
    /// internal buffer. Callers (typically the façade, on each of its own
    /// mutating calls) forward these for analytics.
    pub fn drain_events(&mut self) -> Vec<CommentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Starts a new thread at `(row, col)` with an opening comment.
    pub fn create_thread(
        &mut self,
        row: u32,
        col: u32,
        author_id: String,
        author_name: String,
        text: String,
        mentions: Vec<Mention>,
    ) -> EngineResult<ThreadId> {
        validate_author(&author_id, &author_name)?;
        validate_text(&text)?;
        let id = new_thread_id();
        let opening = Comment::new(author_id, author_name, text, mentions);
        let thread = Thread {
            id: id.clone(),
            row,
            col,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            created_at: Utc::now().to_rfc3339(),
            version: 1,
            comments: vec![opening],
        };
        self.threads.insert(id.clone(), thread);
        self.by_cell.entry((row, col)).or_default().push(id.clone());
        self.emit(CommentEvent::ThreadAdded { thread_id: id.clone() });
        Ok(id)
    }

    /// Appends a reply to an existing thread.
    pub fn add_reply(
        &mut self,
        thread_id: &str,
        author_id: String,
        author_name: String,
        text: String,
        mentions: Vec<Mention>,
    ) -> EngineResult<CommentId> {
        validate_author(&author_id, &author_name)?;
        validate_text(&text)?;
        let thread = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread_id)))?;
        let comment = Comment::new(author_id, author_name, text, mentions);
        let id = comment.id.clone();
        thread.comments.push(comment);
        thread.version += 1;
        self.emit(CommentEvent::CommentAdded { thread_id: thread_id.to_string(), comment_id: id.clone() });
        Ok(id)
    }

    /// Soft-deletes a single post (opening comment or reply) within a
    /// thread. The thread and its remaining posts are untouched.
    pub fn delete_comment(&mut self, thread_id: &str, comment_id: &str, deleted_by: String) -> EngineResult<()> {
        let thread = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread_id)))?;
        let comment = thread
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| EngineError::NotFound(format!("comment {}", comment_id)))?;
        comment.deleted_at = Some(Utc::now().to_rfc3339());
        comment.deleted_by = Some(deleted_by);
        thread.version += 1;
        self.emit(CommentEvent::CommentDeleted { thread_id: thread_id.to_string(), comment_id: comment_id.to_string() });
        Ok(())
    }

    /// Clears a post's soft-delete, restoring it to the thread.
    pub fn undelete_comment(&mut self, thread_id: &str, comment_id: &str) -> EngineResult<()> {
        let thread = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread_id)))?;
        let comment = thread
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| EngineError::NotFound(format!("comment {}", comment_id)))?;
        if !comment.is_deleted() {
            return Err(EngineError::Conflict(format!("comment {} is not deleted", comment_id)));
        }
        comment.deleted_at = None;
        comment.deleted_by = None;
        comment.modified_at = Utc::now().to_rfc3339();
        thread.version += 1;
        self.emit(CommentEvent::CommentUpdated { thread_id: thread_id.to_string(), comment_id: comment_id.to_string() });
        Ok(())
    }

    pub fn edit_comment(&mut self, thread_id: &str, comment_id: &str, text: String) -> EngineResult<()> {
        validate_text(&text)?;
        let thread = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread_id)))?;
        let comment = thread
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| EngineError::NotFound(format!("comment {}", comment_id)))?;
        if comment.is_deleted() {
            return Err(EngineError::Conflict(format!("comment {} is deleted", comment_id)));
        }
        comment.text = text;
        comment.modified_at = Utc::now().to_rfc3339();
        thread.version += 1;
        self.emit(CommentEvent::CommentUpdated { thread_id: thread_id.to_string(), comment_id: comment_id.to_string() });
        Ok(())
    }

    pub fn set_resolved(&mut self, thread_id: &str, resolved: bool, resolved_by: String) -> EngineResult<()> {
        let thread = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread_id)))?;
        thread.resolved = resolved;
        if resolved {
            thread.resolved_at = Some(Utc::now().to_rfc3339());
            thread.resolved_by = Some(resolved_by);
        } else {
            thread.resolved_at = None;
            thread.resolved_by = None;
        }
        thread.version += 1;
        let event = if resolved {
            CommentEvent::ThreadResolved { thread_id: thread_id.to_string() }
        } else {
            CommentEvent::ThreadUnresolved { thread_id: thread_id.to_string() }
        };
        self.emit(event);
        Ok(())
    }

    /// Hard-deletes a thread and every post within it.
    pub fn delete_thread(&mut self, thread_id: &str) -> EngineResult<()> {
        let thread = self
            .threads
            .remove(thread_id)
            .ok_or_else(|| EngineError::NotFound(format!("thread {}", thread_id)))?;
        if let Some(ids) = self.by_cell.get_mut(&(thread.row, thread.col)) {
            ids.retain(|id| id != thread_id);
            if ids.is_empty() {
                self.by_cell.remove(&(thread.row, thread.col));
            }
        }
        self.emit(CommentEvent::ThreadDeleted { thread_id: thread_id.to_string() });
        Ok(())
    }

    pub fn get_thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.get(thread_id)
    }

    pub fn threads_at(&self, row: u32, col: u32) -> Vec<&Thread> {
        self.by_cell
            .get(&(row, col))
            .map(|ids| ids.iter().filter_map(|id| self.threads.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn has_thread(&self, row: u32, col: u32) -> bool {
        self.by_cell.get(&(row, col)).map(|ids| !ids.is_empty()).unwrap_or(false)
    }

    pub fn all_threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    /// Threads that carry at least one non-deleted post by `author_id`.
    pub fn threads_by_author(&self, author_id: &str) -> Vec<&Thread> {
        self.threads
            .values()
            .filter(|t| t.comments.iter().any(|c| !c.is_deleted() && c.author_id == author_id))
            .collect()
    }

    /// Threads with at least one non-deleted post whose text contains
    /// `query` (case-insensitive).
    pub fn threads_containing_text(&self, query: &str) -> Vec<&Thread> {
        let needle = query.to_lowercase();
        self.threads
            .values()
            .filter(|t| t.comments.iter().any(|c| !c.is_deleted() && c.text.to_lowercase().contains(&needle)))
            .collect()
    }

    /// Relocates every thread whose anchor falls inside a shifted or
    /// deleted row/column band, mirroring the cell-store's own structural
    /// edit handling. A thread anchored inside a deleted band is dropped
    /// entirely along with its index entry.
    pub fn apply_structural_edit(&mut self, edit: StructuralEdit) {
        let mut relocations: Vec<(ThreadId, Option<(u32, u32)>)> = Vec::new();
        for thread in self.threads.values() {
            let new_anchor = match edit {
                StructuralEdit::InsertRows { at, count } => {
                    if thread.row >= at { Some((thread.row + count, thread.col)) } else { None }
                }
                StructuralEdit::DeleteRows { at, count } => {
                    let end = at + count;
                    if thread.row >= at && thread.row < end {
                        Some((u32::MAX, thread.col))
                    } else if thread.row >= end {
                        Some((thread.row - count, thread.col))
                    } else {
                        None
                    }
                }
                StructuralEdit::InsertCols { at, count } => {
                    if thread.col >= at { Some((thread.row, thread.col + count)) } else { None }
                }
                StructuralEdit::DeleteCols { at, count } => {
                    let end = at + count;
                    if thread.col >= at && thread.col < end {
                        Some((thread.row, u32::MAX))
                    } else if thread.col >= end {
                        Some((thread.row, thread.col - count))
                    } else {
                        None
                    }
                }
            };
            if let Some(target) = new_anchor {
                relocations.push((thread.id.clone(), if target.0 == u32::MAX || target.1 == u32::MAX { None } else { Some(target) }));
            }
        }
        for (id, target) in relocations {
            let old_anchor = self.threads.get(&id).map(|t| (t.row, t.col));
            if let Some((row, col)) = old_anchor {
                if let Some(ids) = self.by_cell.get_mut(&(row, col)) {
                    ids.retain(|tid| tid != &id);
                    if ids.is_empty() {
                        self.by_cell.remove(&(row, col));
                    }
                }
            }
            match target {
                Some((row, col)) => {
                    if let Some(thread) = self.threads.get_mut(&id) {
                        thread.row = row;
                        thread.col = col;
                        thread.version += 1;
                    }
                    self.by_cell.entry((row, col)).or_default().push(id.clone());
                    self.emit(CommentEvent::ThreadMoved { thread_id: id, row, col });
                }
                None => {
                    self.threads.remove(&id);
                    self.emit(CommentEvent::ThreadDeleted { thread_id: id });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_lifecycle() {
        let mut store = CommentStore::new();
        let tid = store.create_thread(2, 3, "u1".into(), "Alice".into(), "hello".into(), vec![]).unwrap();
        assert!(store.has_thread(2, 3));
        let cid = store.add_reply(&tid, "u2".into(), "Bob".into(), "hi back".into(), vec![]).unwrap();
        assert_eq!(store.get_thread(&tid).unwrap().comments.len(), 2);
        store.delete_comment(&tid, &cid, "u2".into()).unwrap();
        assert!(store.get_thread(&tid).unwrap().comments[1].is_deleted());
        assert_eq!(store.get_thread(&tid).unwrap().comments.len(), 2);
        store.undelete_comment(&tid, &cid).unwrap();
        assert!(!store.get_thread(&tid).unwrap().comments[1].is_deleted());
        store.set_resolved(&tid, true, "u1".into()).unwrap();
        let thread = store.get_thread(&tid).unwrap();
        assert!(thread.resolved);
        assert_eq!(thread.resolved_by.as_deref(), Some("u1"));
        assert!(thread.resolved_at.is_some());
    }

    #[test]
    fn test_create_thread_rejects_empty_text_and_author() {
        let mut store = CommentStore::new();
        assert!(store.create_thread(0, 0, "u1".into(), "A".into(), "  ".into(), vec![]).is_err());
        assert!(store.create_thread(0, 0, "".into(), "A".into(), "hi".into(), vec![]).is_err());
        assert!(store.create_thread(0, 0, "u1".into(), "".into(), "hi".into(), vec![]).is_err());
        let too_long = "x".repeat(MAX_COMMENT_TEXT_LEN + 1);
        assert!(store.create_thread(0, 0, "u1".into(), "A".into(), too_long, vec![]).is_err());
    }

    #[test]
    fn test_events_emitted_on_mutation() {
        let mut store = CommentStore::new();
        let tid = store.create_thread(0, 0, "u1".into(), "A".into(), "hi".into(), vec![]).unwrap();
        assert_eq!(store.version(), 1);
        let cid = store.add_reply(&tid, "u2".into(), "B".into(), "yo".into(), vec![]).unwrap();
        assert_eq!(store.version(), 2);
        let events = store.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CommentEvent::ThreadAdded { .. }));
        assert!(matches!(events[1], CommentEvent::CommentAdded { .. }));
        assert!(store.drain_events().is_empty());

        store.delete_comment(&tid, &cid, "u2".into()).unwrap();
        assert_eq!(store.version(), 3);
    }

    #[test]
    fn test_delete_thread_clears_index() {
        let mut store = CommentStore::new();
        let tid = store.create_thread(0, 0, "u1".into(), "A".into(), "x".into(), vec![]).unwrap();
        store.delete_thread(&tid).unwrap();
        assert!(!store.has_thread(0, 0));
        assert!(store.get_thread(&tid).is_none());
    }

    #[test]
    fn test_insert_rows_relocates_thread() {
        let mut store = CommentStore::new();
        let tid = store.create_thread(5, 0, "u1".into(), "A".into(), "x".into(), vec![]).unwrap();
        store.apply_structural_edit(StructuralEdit::InsertRows { at: 2, count: 3 });
        let thread = store.get_thread(&tid).unwrap();
        assert_eq!(thread.row, 8);
        assert!(store.has_thread(8, 0));
        assert!(!store.has_thread(5, 0));
    }

    #[test]
    fn test_delete_rows_drops_thread_in_band() {
        let mut store = CommentStore::new();
        let tid = store.create_thread(3, 0, "u1".into(), "A".into(), "x".into(), vec![]).unwrap();
        store.apply_structural_edit(StructuralEdit::DeleteRows { at: 2, count: 2 });
        assert!(store.get_thread(&tid).is_none());
    }

    #[test]
    fn test_query_by_author_and_text() {
        let mut store = CommentStore::new();
        let tid = store.create_thread(0, 0, "u1".into(), "Alice".into(), "needs review".into(), vec![]).unwrap();
        store.create_thread(1, 0, "u2".into(), "Bob".into(), "looks fine".into(), vec![]).unwrap();
        assert_eq!(store.threads_by_author("u1").len(), 1);
        assert_eq!(store.threads_by_author("u1")[0].id, tid);
        assert_eq!(store.threads_containing_text("REVIEW").len(), 1);
        assert!(store.threads_containing_text("nonexistent").is_empty());
    }
}

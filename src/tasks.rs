//! Deferred task queue.
//!
//! Everything the scripting surface observes asynchronously (events, the
//! buffer append step) is queued here and run by
//! [`MediaSource::run_tasks`](crate::MediaSource::run_tasks). Tasks are never
//! removed early: cancelling marks them and [`TaskQueue::pop`] skips them.

use mseforged_common::SourceBufferId;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use tracing::trace;

/// Handle to a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Object a task belongs to, and the target of the events it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSource {
    MediaSource,
    SourceBufferList,
    SourceBuffer(SourceBufferId),
}

impl Serialize for TaskSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MediaSource => write!(f, "mediasource"),
            Self::SourceBufferList => write!(f, "sourcebuffers"),
            Self::SourceBuffer(id) => write!(f, "sourcebuffer {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    SourceOpen,
    SourceEnded,
    SourceClose,
    AddSourceBuffer,
    RemoveSourceBuffer,
    UpdateStart,
    Update,
    UpdateEnd,
    Error,
    Abort,
}

impl EventKind {
    /// DOM event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceOpen => "sourceopen",
            Self::SourceEnded => "sourceended",
            Self::SourceClose => "sourceclose",
            Self::AddSourceBuffer => "addsourcebuffer",
            Self::RemoveSourceBuffer => "removesourcebuffer",
            Self::UpdateStart => "updatestart",
            Self::Update => "update",
            Self::UpdateEnd => "updateend",
            Self::Error => "error",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event {
    pub target: TaskSource,
    pub kind: EventKind,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.kind, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Fire an event at the task source.
    Dispatch(EventKind),
    /// Run the buffer append step of the source buffer.
    BufferAppend,
}

#[derive(Debug)]
struct Task {
    id: TaskId,
    source: TaskSource,
    action: TaskAction,
    cancelled: bool,
}

/// FIFO of deferred tasks shared by a media source and its buffers.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
    next_id: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_event(&mut self, source: TaskSource, kind: EventKind) -> TaskId {
        self.push(source, TaskAction::Dispatch(kind))
    }

    pub fn queue_append(&mut self, buffer: SourceBufferId) -> TaskId {
        self.push(TaskSource::SourceBuffer(buffer), TaskAction::BufferAppend)
    }

    fn push(&mut self, source: TaskSource, action: TaskAction) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        trace!(task = id.0, %source, ?action, "Queued task");
        self.tasks.push_back(Task {
            id,
            source,
            action,
            cancelled: false,
        });
        id
    }

    /// Mark one task cancelled. Returns false if it already ran.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id && !t.cancelled) {
            Some(task) => {
                task.cancelled = true;
                true
            }
            None => false,
        }
    }

    /// Mark every pending task of `source` cancelled. Returns how many.
    pub fn cancel_source(&mut self, source: TaskSource) -> usize {
        let mut count = 0;
        for task in self.tasks.iter_mut().filter(|t| t.source == source) {
            if !task.cancelled {
                task.cancelled = true;
                count += 1;
            }
        }
        count
    }

    /// Next task that has not been cancelled.
    pub fn pop(&mut self) -> Option<(TaskSource, TaskAction)> {
        while let Some(task) = self.tasks.pop_front() {
            if task.cancelled {
                trace!(task = task.id.0, source = %task.source, "Dropped cancelled task");
                continue;
            }
            return Some((task.source, task.action));
        }
        None
    }

    /// Number of tasks that will still run.
    pub fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| !t.cancelled).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = TaskQueue::new();
        queue.queue_event(TaskSource::MediaSource, EventKind::SourceOpen);
        queue.queue_event(TaskSource::SourceBufferList, EventKind::AddSourceBuffer);
        assert_eq!(
            queue.pop(),
            Some((TaskSource::MediaSource, TaskAction::Dispatch(EventKind::SourceOpen)))
        );
        assert_eq!(
            queue.pop(),
            Some((
                TaskSource::SourceBufferList,
                TaskAction::Dispatch(EventKind::AddSourceBuffer)
            ))
        );
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_cancel_source_marks_without_removing() {
        let mut queue = TaskQueue::new();
        let buffer = SourceBufferId::new();
        let other = SourceBufferId::new();
        queue.queue_event(TaskSource::SourceBuffer(buffer), EventKind::UpdateStart);
        queue.queue_append(buffer);
        queue.queue_event(TaskSource::SourceBuffer(other), EventKind::UpdateStart);

        assert_eq!(queue.cancel_source(TaskSource::SourceBuffer(buffer)), 2);
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.tasks.len(), 3);

        assert_eq!(
            queue.pop(),
            Some((
                TaskSource::SourceBuffer(other),
                TaskAction::Dispatch(EventKind::UpdateStart)
            ))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_single_task() {
        let mut queue = TaskQueue::new();
        let buffer = SourceBufferId::new();
        let append = queue.queue_append(buffer);
        queue.queue_event(TaskSource::SourceBuffer(buffer), EventKind::Abort);

        assert!(queue.cancel(append));
        assert!(!queue.cancel(append));
        assert_eq!(
            queue.pop(),
            Some((TaskSource::SourceBuffer(buffer), TaskAction::Dispatch(EventKind::Abort)))
        );
    }

    #[test]
    fn test_event_display() {
        let event = Event {
            target: TaskSource::MediaSource,
            kind: EventKind::SourceEnded,
        };
        assert_eq!(event.to_string(), "sourceended -> mediasource");
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"target":"mediasource","kind":"sourceended"}"#
        );
    }
}

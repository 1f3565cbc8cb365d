//! Media source: lifecycle, source buffer ownership and end of stream.

use crate::config::SourceConfig;
use crate::demux::{BoxScanDemuxer, DemuxerFactory};
use crate::element::{ElementReadyState, PlaybackElement};
use crate::error::{Error, Result};
use crate::mime::{self, ContentType};
use crate::source_buffer::SourceBuffer;
use crate::tasks::{Event, EventKind, TaskAction, TaskQueue, TaskSource};
use mseforged_common::{AppendMode, EndOfStreamError, ReadyState, SourceBufferId};
use tracing::{debug, info, warn};

/// The part of a media source its buffers read and update.
#[derive(Debug)]
pub struct SourceState<E> {
    pub(crate) ready_state: ReadyState,
    /// Seconds. NaN until known, infinite when the stream is unbounded.
    pub(crate) duration: f64,
    pub(crate) element: Option<E>,
    pub(crate) tasks: TaskQueue,
    pub(crate) config: SourceConfig,
}

impl<E: PlaybackElement> SourceState<E> {
    pub(crate) fn new(config: SourceConfig) -> Self {
        Self {
            ready_state: ReadyState::Closed,
            duration: f64::NAN,
            element: None,
            tasks: TaskQueue::new(),
            config,
        }
    }

    /// Change the ready state and queue the matching event.
    pub(crate) fn set_ready_state(&mut self, next: ReadyState) {
        let previous = self.ready_state;
        if previous == next {
            return;
        }
        self.ready_state = next;
        info!(from = %previous, to = %next, "Media source ready state changed");

        let kind = match next {
            ReadyState::Open => EventKind::SourceOpen,
            ReadyState::Ended => EventKind::SourceEnded,
            ReadyState::Closed => EventKind::SourceClose,
        };
        self.tasks.queue_event(TaskSource::MediaSource, kind);
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.element.as_ref().map_or(0.0, |e| e.current_time())
    }

    pub(crate) fn element_has_error(&self) -> bool {
        self.element.as_ref().is_some_and(|e| e.has_error())
    }

    /// Raise the element's ready state to at least `at_least`.
    pub(crate) fn advance_element(&mut self, at_least: ElementReadyState) {
        if let Some(element) = self.element.as_mut() {
            if element.ready_state() < at_least {
                debug!(from = %element.ready_state(), to = %at_least, "Element ready state advanced");
                element.set_ready_state(at_least);
            }
        }
    }

    pub(crate) fn change_duration(&mut self, duration: f64) {
        if self.duration == duration {
            return;
        }
        debug!(from = self.duration, to = duration, "Duration changed");
        self.duration = duration;
        if let Some(element) = self.element.as_mut() {
            element.duration_changed(duration);
        }
    }

    /// Move to `ended` and tell the element why.
    ///
    /// Without an error the duration is clamped to `highest_end` and the
    /// element is told all data arrived. With one, the element fails as a
    /// bad source if it never got metadata, and mid-stream otherwise.
    pub(crate) fn end_of_stream(&mut self, error: Option<EndOfStreamError>, highest_end: Option<f64>) {
        self.set_ready_state(ReadyState::Ended);

        let Some(error) = error else {
            if let Some(end) = highest_end {
                self.change_duration(end);
            }
            let duration = self.duration.is_finite().then_some(self.duration);
            if let Some(element) = self.element.as_mut() {
                element.all_data_received(duration);
            }
            return;
        };

        warn!(%error, "End of stream with error");
        let Some(element) = self.element.as_mut() else {
            return;
        };
        let have_nothing = element.ready_state() == ElementReadyState::HaveNothing;
        match (error, have_nothing) {
            (EndOfStreamError::Network, true) => element.no_supported_source("network error"),
            (EndOfStreamError::Network, false) => element.connection_interrupted(),
            (EndOfStreamError::Decode, true) => element.no_supported_source("decode error"),
            (EndOfStreamError::Decode, false) => element.media_data_corrupted(),
        }
    }
}

/// Owns the source buffers fed into one playback element.
///
/// Scripting-facing calls validate synchronously and queue their effects.
/// Nothing observable happens until [`MediaSource::run_tasks`] runs the queue.
pub struct MediaSource<E: PlaybackElement> {
    state: SourceState<E>,
    buffers: Vec<SourceBuffer>,
    demuxer_factory: DemuxerFactory,
}

impl<E: PlaybackElement> MediaSource<E> {
    /// Create a closed media source using [`BoxScanDemuxer`].
    pub fn new(config: SourceConfig) -> Self {
        Self::with_demuxer_factory(config, BoxScanDemuxer::factory())
    }

    pub fn with_demuxer_factory(config: SourceConfig, demuxer_factory: DemuxerFactory) -> Self {
        Self {
            state: SourceState::new(config),
            buffers: Vec::new(),
            demuxer_factory,
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.ready_state
    }

    /// Duration in seconds. NaN while unknown.
    pub fn duration(&self) -> f64 {
        self.state.duration
    }

    pub fn config(&self) -> &SourceConfig {
        &self.state.config
    }

    pub fn element(&self) -> Option<&E> {
        self.state.element.as_ref()
    }

    pub fn element_mut(&mut self) -> Option<&mut E> {
        self.state.element.as_mut()
    }

    pub fn is_type_supported(&self, content_type: &str) -> bool {
        mime::is_type_supported(content_type, &self.state.config.supported_subtypes)
    }

    pub fn source_buffer(&self, id: SourceBufferId) -> Option<&SourceBuffer> {
        self.buffers.iter().find(|b| b.id() == id)
    }

    pub fn source_buffers(&self) -> &[SourceBuffer] {
        &self.buffers
    }

    /// Tasks queued and not cancelled.
    pub fn pending_tasks(&self) -> usize {
        self.state.tasks.pending()
    }

    /// Attach to a playback element. The source opens.
    pub fn attach(&mut self, element: E) -> Result<()> {
        if self.state.ready_state != ReadyState::Closed {
            return Err(Error::invalid_state(format!(
                "Cannot attach while {}",
                self.state.ready_state
            )));
        }
        self.state.element = Some(element);
        self.state.duration = f64::NAN;
        self.state.set_ready_state(ReadyState::Open);
        Ok(())
    }

    /// Detach from the element, removing every source buffer. Their
    /// outstanding tasks are cancelled.
    pub fn detach(&mut self) -> Option<E> {
        if self.state.ready_state == ReadyState::Closed {
            return None;
        }
        self.state.duration = f64::NAN;
        for buffer in self.buffers.drain(..) {
            self.state
                .tasks
                .cancel_source(TaskSource::SourceBuffer(buffer.id()));
            self.state
                .tasks
                .queue_event(TaskSource::SourceBufferList, EventKind::RemoveSourceBuffer);
        }
        self.state.set_ready_state(ReadyState::Closed);
        self.state.element.take()
    }

    pub fn add_source_buffer(&mut self, content_type: &str) -> Result<SourceBufferId> {
        if content_type.trim().is_empty() {
            return Err(Error::type_error("Content type is empty"));
        }
        if !self.is_type_supported(content_type) {
            return Err(Error::not_supported(format!(
                "Unsupported content type: {content_type}"
            )));
        }
        if self.state.ready_state != ReadyState::Open {
            return Err(Error::invalid_state(format!(
                "Cannot add a source buffer while {}",
                self.state.ready_state
            )));
        }

        let content_type = ContentType::parse(content_type)?;
        let demuxer = (self.demuxer_factory)(&content_type);
        let buffer = SourceBuffer::new(content_type, &self.state.config, demuxer);
        let id = buffer.id();
        info!(
            %id,
            content_type = %buffer.content_type(),
            mode = %buffer.mode(),
            "Added source buffer"
        );
        self.buffers.push(buffer);
        self.state
            .tasks
            .queue_event(TaskSource::SourceBufferList, EventKind::AddSourceBuffer);
        Ok(id)
    }

    /// Remove a source buffer. An append in flight is aborted, and nothing
    /// the buffer queued is delivered afterwards.
    pub fn remove_source_buffer(&mut self, id: SourceBufferId) -> Result<()> {
        let index = self.buffer_index(id).ok_or(Error::NotFound(id))?;
        let mut buffer = self.buffers.remove(index);

        if buffer.updating() {
            buffer.abort_pending(&mut self.state);
        }
        let cancelled = self.state.tasks.cancel_source(TaskSource::SourceBuffer(id));
        self.state
            .tasks
            .queue_event(TaskSource::SourceBufferList, EventKind::RemoveSourceBuffer);
        info!(%id, cancelled, "Removed source buffer");
        Ok(())
    }

    pub fn append_buffer(&mut self, id: SourceBufferId, data: &[u8]) -> Result<()> {
        let (buffer, state) = self.buffer_mut(id)?;
        buffer.append_buffer(state, data)
    }

    pub fn abort(&mut self, id: SourceBufferId) -> Result<()> {
        let (buffer, state) = self.buffer_mut(id)?;
        buffer.abort(state)
    }

    pub fn set_mode(&mut self, id: SourceBufferId, mode: AppendMode) -> Result<()> {
        let (buffer, state) = self.buffer_mut(id)?;
        buffer.set_mode(state, mode)
    }

    /// Signal end of stream, optionally with an error.
    pub fn end_of_stream(&mut self, error: Option<EndOfStreamError>) -> Result<()> {
        if self.state.ready_state != ReadyState::Open {
            return Err(Error::invalid_state(format!(
                "Cannot end the stream while {}",
                self.state.ready_state
            )));
        }
        if self.any_updating() {
            return Err(Error::invalid_state("A source buffer is updating"));
        }
        let highest_end = self.highest_buffered_end();
        self.state.end_of_stream(error, highest_end);
        Ok(())
    }

    /// Set the duration in seconds.
    pub fn set_duration(&mut self, duration: f64) -> Result<()> {
        if duration.is_nan() || duration < 0.0 {
            return Err(Error::type_error(format!("Invalid duration: {duration}")));
        }
        if self.state.ready_state != ReadyState::Open {
            return Err(Error::invalid_state(format!(
                "Cannot set the duration while {}",
                self.state.ready_state
            )));
        }
        if self.any_updating() {
            return Err(Error::invalid_state("A source buffer is updating"));
        }
        if let Some(end) = self.highest_buffered_end() {
            if duration < end {
                return Err(Error::invalid_state(format!(
                    "Duration {duration} is below buffered media ending at {end}"
                )));
            }
        }
        self.state.change_duration(duration);
        Ok(())
    }

    /// Run queued tasks in order until the queue is empty. Returns the
    /// events dispatched, including those queued by tasks that ran.
    pub fn run_tasks(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some((source, action)) = self.state.tasks.pop() {
            match action {
                TaskAction::Dispatch(kind) => {
                    debug!(event = %kind, target = %source, "Dispatching event");
                    events.push(Event {
                        target: source,
                        kind,
                    });
                }
                TaskAction::BufferAppend => {
                    let TaskSource::SourceBuffer(id) = source else {
                        continue;
                    };
                    if let Some(index) = self.buffer_index(id) {
                        self.buffers[index].buffer_append(&mut self.state);
                    }
                }
            }
        }
        events
    }

    fn buffer_index(&self, id: SourceBufferId) -> Option<usize> {
        self.buffers.iter().position(|b| b.id() == id)
    }

    fn buffer_mut(&mut self, id: SourceBufferId) -> Result<(&mut SourceBuffer, &mut SourceState<E>)> {
        let index = self.buffer_index(id).ok_or_else(|| {
            Error::invalid_state(format!("Source buffer {id} was removed"))
        })?;
        Ok((&mut self.buffers[index], &mut self.state))
    }

    fn any_updating(&self) -> bool {
        self.buffers.iter().any(|b| b.updating())
    }

    fn highest_buffered_end(&self) -> Option<f64> {
        self.buffers
            .iter()
            .filter_map(|b| b.highest_end())
            .reduce(f64::max)
    }
}

//! Integration tests for the media source lifecycle.

mod common;

use assert_matches::assert_matches;
use common::*;
use mseforged::config::SourceConfig;
use mseforged::{ElementFailure, Error, EventKind, HeadlessElement, MediaSource, TaskSource};
use mseforged_common::{AppendMode, EndOfStreamError, ReadyState};

#[test]
fn full_lifecycle_events() {
    let mut source: MediaSource<HeadlessElement> = MediaSource::new(SourceConfig::default());
    source.attach(HeadlessElement::new()).unwrap();
    let id = source.add_source_buffer("video/mp4").unwrap();
    source.append_buffer(id, &av_init_segment(2_000)).unwrap();
    let events = source.run_tasks();
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::SourceOpen,
            EventKind::AddSourceBuffer,
            EventKind::UpdateStart,
            EventKind::Update,
            EventKind::UpdateEnd,
        ]
    );
    assert_eq!(events[0].target, TaskSource::MediaSource);
    assert_eq!(events[1].target, TaskSource::SourceBufferList);
    assert_eq!(events[2].target, TaskSource::SourceBuffer(id));

    source.end_of_stream(None).unwrap();
    assert_eq!(kinds(&source.run_tasks()), vec![EventKind::SourceEnded]);

    let element = source.detach().unwrap();
    assert!(element.ended());
    assert!(source.duration().is_nan());
    assert_eq!(
        kinds(&source.run_tasks()),
        vec![EventKind::RemoveSourceBuffer, EventKind::SourceClose]
    );
}

#[test]
fn end_of_stream_truncates_duration_to_buffered_media() {
    let (mut source, id) = source_with_buffer(SourceConfig::default());
    append(&mut source, id, &av_init_segment(10_000));
    append(&mut source, id, &video_segment(1, 0));
    append(&mut source, id, &video_segment(2, 2));
    assert_eq!(source.duration(), 10.0);

    source.end_of_stream(None).unwrap();
    assert_eq!(source.duration(), 4.0);
    let element = source.element().unwrap();
    assert!(element.ended());
    assert_eq!(element.duration(), Some(4.0));
}

#[test]
fn end_of_stream_with_network_error() {
    let (mut source, id) = source_with_buffer(SourceConfig::default());
    append(&mut source, id, &av_init_segment(10_000));
    source.end_of_stream(Some(EndOfStreamError::Network)).unwrap();
    assert_eq!(
        source.element().unwrap().failure(),
        Some(&ElementFailure::ConnectionInterrupted)
    );
}

#[test]
fn end_of_stream_rejected_while_updating() {
    let (mut source, id) = source_with_buffer(SourceConfig::default());
    source.append_buffer(id, &av_init_segment(1_000)).unwrap();
    assert_matches!(source.end_of_stream(None), Err(Error::InvalidState(_)));
    assert_matches!(source.set_duration(5.0), Err(Error::InvalidState(_)));
    source.run_tasks();
    source.end_of_stream(None).unwrap();
}

#[test]
fn set_duration_cannot_cut_buffered_media() {
    let (mut source, id) = source_with_buffer(SourceConfig::default());
    append(&mut source, id, &av_init_segment(10_000));
    append(&mut source, id, &video_segment(1, 2));

    assert_matches!(source.set_duration(3.5), Err(Error::InvalidState(_)));
    source.set_duration(4.0).unwrap();
    assert_eq!(source.duration(), 4.0);
    assert_eq!(source.element().unwrap().duration(), Some(4.0));
}

#[test]
fn set_duration_requires_open_source() {
    let mut source: MediaSource<HeadlessElement> = MediaSource::new(SourceConfig::default());
    assert_matches!(source.set_duration(1.0), Err(Error::InvalidState(_)));
    assert_matches!(source.set_duration(-1.0), Err(Error::Type(_)));
}

#[test]
fn remove_buffer_while_updating_aborts() {
    let (mut source, id) = source_with_buffer(SourceConfig::default());
    source.append_buffer(id, &av_init_segment(1_000)).unwrap();
    source.remove_source_buffer(id).unwrap();

    let events = source.run_tasks();
    assert_eq!(kinds(&events), vec![EventKind::RemoveSourceBuffer]);
    assert!(buffer_kinds(&events, id).is_empty());
    assert_eq!(source.pending_tasks(), 0);
    assert!(source.source_buffers().is_empty());
    // The append step never ran.
    assert!(source.duration().is_nan());
}

#[test]
fn detach_while_updating_silences_buffer() {
    let (mut source, id) = source_with_buffer(SourceConfig::default());
    source.append_buffer(id, &av_init_segment(1_000)).unwrap();
    source.detach().unwrap();

    let events = source.run_tasks();
    assert!(buffer_kinds(&events, id).is_empty());
    assert_eq!(
        kinds(&events),
        vec![EventKind::RemoveSourceBuffer, EventKind::SourceClose]
    );
}

#[test]
fn buffers_are_independent() {
    let mut source = open_source();
    let video = source.add_source_buffer("video/mp4").unwrap();
    let audio = source.add_source_buffer("audio/mp4").unwrap();
    source.run_tasks();

    source.append_buffer(video, &av_init_segment(1_000)).unwrap();
    source.append_buffer(audio, &av_init_segment(1_000)).unwrap();
    let events = source.run_tasks();
    assert_eq!(buffer_kinds(&events, video), APPEND_OK);
    assert_eq!(buffer_kinds(&events, audio), APPEND_OK);

    source.remove_source_buffer(video).unwrap();
    assert_eq!(source.source_buffers().len(), 1);
    assert_eq!(source.source_buffers()[0].id(), audio);
}

#[test]
fn supported_types_come_from_config() {
    let source = open_source();
    assert!(source.is_type_supported("video/mp4; codecs=\"avc1.4d401e\""));
    assert!(!source.is_type_supported("audio/aac"));
    assert!(!source.is_type_supported(""));

    let config = SourceConfig {
        supported_subtypes: vec!["mp4".into(), "aac".into()],
        ..SourceConfig::default()
    };
    let mut source = open_source_with(config);
    assert!(source.is_type_supported("audio/aac"));

    let id = source.add_source_buffer("audio/aac").unwrap();
    let buffer = source.source_buffer(id).unwrap();
    assert!(buffer.generate_timestamps());
    assert_eq!(buffer.mode(), AppendMode::Sequence);
    assert_matches!(
        source.set_mode(id, AppendMode::Segments),
        Err(Error::Type(_))
    );
}

#[test]
fn add_source_buffer_after_close() {
    let mut source = open_source();
    source.detach();
    assert_eq!(source.ready_state(), ReadyState::Closed);
    assert_matches!(
        source.add_source_buffer("video/mp4"),
        Err(Error::InvalidState(_))
    );

    source.attach(HeadlessElement::new()).unwrap();
    assert!(source.add_source_buffer("video/mp4").is_ok());
}

#[test]
fn events_serialize_for_logging() {
    let mut source = open_source();
    source.end_of_stream(None).unwrap();
    let events = source.run_tasks();
    assert_eq!(
        serde_json::to_string(&events).unwrap(),
        r#"[{"target":"mediasource","kind":"sourceended"}]"#
    );
}

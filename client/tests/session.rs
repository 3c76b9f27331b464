//! End-to-end session tests against a scripted Wyoming service.

mod support;

use std::io::Cursor;
use std::time::Duration;

use futures_util::TryStreamExt;
use tokio::net::TcpListener;
use voxcheck_client::protocol::{AudioFormat, ErrorEvent, Event, Message, MessageKind, Synthesize};
use voxcheck_client::{
    AudioEvent, Session, SessionConfig, SessionState, SynthesisError, SynthesisRequest,
};

use support::{chunk, info, sends, start, stop, FakeService, Reply, Script};

const MONO_16: AudioFormat = AudioFormat::new(22_050, 2, 1);

fn describe_answers(voices: &[&str]) -> Vec<Reply> {
    sends(vec![info(voices)])
}

#[tokio::test]
async fn three_chunks_become_one_wav() {
    // width given in bits, as some servers do
    let format = AudioFormat::new(22_050, 16, 1);
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&["en_US-amy-medium"]),
        on_synthesize: sends(vec![
            start(format),
            chunk(format, vec![1; 4096]),
            chunk(format, vec![2; 4096]),
            chunk(format, vec![3; 4096]),
            stop(),
        ]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    let request = SynthesisRequest::new("Hello there.").with_voice("en_US-amy-medium");
    let audio = session.synthesize(&request).await.unwrap();

    assert_eq!(session.state(), SessionState::Completed);
    assert!(!session.is_connected());
    assert_eq!(audio.pcm.len(), 12_288);
    assert_eq!(audio.chunk_count, 3);
    assert_eq!(audio.pcm[..4096], [1; 4096]);
    assert_eq!(audio.pcm[8192..], [3; 4096]);
    assert_eq!(audio.pcm.len() % audio.format.frame_bytes().unwrap(), 0);

    let wav = audio.to_wav().unwrap();
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 22_050);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.channels, 1);
    assert_eq!(reader.len(), 6_144);

    let received = service.received().await;
    let kinds: Vec<_> = received.iter().map(|m| m.kind.clone()).collect();
    assert_eq!(kinds, vec![MessageKind::Describe, MessageKind::Synthesize]);
    let sent = Synthesize::from_message(&received[1]).unwrap();
    assert_eq!(sent.text, "Hello there.");
    assert_eq!(
        sent.voice.unwrap().name.as_deref(),
        Some("en_US-amy-medium")
    );
}

#[tokio::test]
async fn stereo_pcm_is_whole_frames() {
    let format = AudioFormat::new(16_000, 2, 2);
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: sends(vec![
            start(format),
            chunk(format, vec![0; 400]),
            chunk(format, vec![0; 1000]),
            stop(),
        ]),
        ..Default::default()
    })
    .await;

    let audio = Session::new(service.config())
        .synthesize(&SynthesisRequest::new("Two channels."))
        .await
        .unwrap();
    assert_eq!(audio.pcm.len() % 4, 0);
    assert_eq!(audio.frames(), 350);
}

#[tokio::test]
async fn hangup_before_info_is_connection_closed() {
    let service = FakeService::spawn(Script {
        on_connect: vec![Reply::Hangup],
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    let err = session
        .synthesize(&SynthesisRequest::new("Anyone there?"))
        .await
        .unwrap_err();

    assert!(matches!(err.kind, SynthesisError::ConnectionClosed), "{err:?}");
    assert_eq!(err.state, SessionState::Connected);
    assert_eq!(err.messages_decoded, 0);
    assert!(err.last_message.is_none());
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.messages_decoded(), 0);
}

#[tokio::test]
async fn missing_voice_fails_before_synthesize() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&["en_US-amy-medium"]),
        on_synthesize: sends(vec![stop()]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    let request = SynthesisRequest::new("Hello.").with_voice("en_US-ryan-medium");
    let err = session.synthesize(&request).await.unwrap_err();

    match &err.kind {
        SynthesisError::VoiceNotFound {
            requested,
            available,
        } => {
            assert_eq!(requested, "en_US-ryan-medium");
            assert_eq!(available, &vec!["en_US-amy-medium".to_string()]);
        }
        other => panic!("expected VoiceNotFound, got {other:?}"),
    }
    assert_eq!(err.state, SessionState::InfoReceived);
    assert_eq!(err.last_message, Some(MessageKind::Info));
    assert_eq!(session.state(), SessionState::Failed);

    let received = service.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, MessageKind::Describe);
}

#[tokio::test]
async fn empty_catalog_is_accepted_but_no_voice_matches() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    let catalog = session.describe().await.unwrap();
    assert!(catalog.voices.is_empty());
    assert_eq!(catalog.name.as_deref(), Some("piper"));
    assert_eq!(session.state(), SessionState::InfoReceived);

    let err = session.select_voice("en_US-amy-medium").unwrap_err();
    assert!(matches!(
        err.kind,
        SynthesisError::VoiceNotFound { ref available, .. } if available.is_empty()
    ));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn empty_text_never_touches_the_network() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut session = Session::new(SessionConfig::new("127.0.0.1", port));
    let err = session
        .synthesize(&SynthesisRequest::new(""))
        .await
        .unwrap_err();

    assert!(matches!(err.kind, SynthesisError::Validation(_)));
    assert_eq!(err.state, SessionState::Idle);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), listener.accept())
            .await
            .is_err(),
        "no connection should have been attempted"
    );
}

#[tokio::test]
async fn hangup_mid_stream_is_incomplete() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&["en_US-amy-medium"]),
        on_synthesize: vec![
            Reply::Send(start(MONO_16)),
            Reply::Send(chunk(MONO_16, vec![0; 4096])),
            Reply::Hangup,
        ],
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    let err = session
        .synthesize(&SynthesisRequest::new("Cut short."))
        .await
        .unwrap_err();

    assert!(
        matches!(err.kind, SynthesisError::IncompleteStream { chunks: 1 }),
        "{err:?}"
    );
    assert_eq!(err.state, SessionState::Synthesizing);
    assert_eq!(err.last_message, Some(MessageKind::AudioChunk));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn truncated_chunk_is_framing_error() {
    let mut partial = voxcheck_client::protocol::encode(&chunk(MONO_16, vec![0; 512])).unwrap();
    partial.truncate(partial.len() - 100);

    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: vec![
            Reply::Send(start(MONO_16)),
            Reply::Raw(partial),
            Reply::Hangup,
        ],
        ..Default::default()
    })
    .await;

    let err = Session::new(service.config())
        .synthesize(&SynthesisRequest::new("Broken frame."))
        .await
        .unwrap_err();
    assert!(matches!(err.kind, SynthesisError::Framing(_)), "{err:?}");
}

#[tokio::test]
async fn immediate_stop_is_an_empty_success() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: sends(vec![start(MONO_16), stop()]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    let audio = session
        .synthesize(&SynthesisRequest::new("..."))
        .await
        .unwrap();

    assert!(audio.is_empty());
    assert_eq!(audio.chunk_count, 0);
    assert_eq!(audio.format, MONO_16);
    assert_eq!(session.state(), SessionState::Completed);
    let reader = hound::WavReader::new(Cursor::new(audio.to_wav().unwrap())).unwrap();
    assert_eq!(reader.len(), 0);
}

#[tokio::test]
async fn unexpected_messages_are_skipped() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: vec![
            Reply::Send(start(MONO_16)),
            Reply::Raw(b"{\"type\":\"transcript\",\"data\":{\"text\":\"hi\"}}\n".to_vec()),
            Reply::Send(chunk(MONO_16, vec![5; 8])),
            Reply::Send(info(&["en_US-amy-medium"])),
            Reply::Send(chunk(MONO_16, vec![6; 8])),
            Reply::Send(stop()),
        ],
        ..Default::default()
    })
    .await;

    let audio = Session::new(service.config())
        .synthesize(&SynthesisRequest::new("Skip the noise."))
        .await
        .unwrap();
    assert_eq!(audio.chunk_count, 2);
    assert_eq!(audio.pcm, [vec![5; 8], vec![6; 8]].concat());
}

#[tokio::test]
async fn chatter_before_info_is_bounded() {
    let noise = Message::new(MessageKind::AudioStop);
    let service = FakeService::spawn(Script {
        on_describe: sends(vec![noise; 5]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config().with_max_info_attempts(3));
    let err = session
        .synthesize(&SynthesisRequest::new("Hello?"))
        .await
        .unwrap_err();

    assert!(matches!(err.kind, SynthesisError::Protocol(_)), "{err:?}");
    assert_eq!(err.state, SessionState::Connected);
    assert_eq!(err.messages_decoded, 3);
}

#[tokio::test]
async fn info_after_other_messages_is_found() {
    let service = FakeService::spawn(Script {
        on_describe: sends(vec![stop(), info(&["en_US-amy-medium"])]),
        on_synthesize: sends(vec![stop()]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    assert_eq!(session.describe().await.unwrap().voices.len(), 1);
    assert_eq!(session.messages_decoded(), 2);
}

#[tokio::test]
async fn stalled_service_times_out_without_audio() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: vec![
            Reply::Send(start(MONO_16)),
            Reply::Send(chunk(MONO_16, vec![0; 64])),
            Reply::Stall,
        ],
        ..Default::default()
    })
    .await;

    let config = service.config().with_timeout(Duration::from_millis(300));
    let mut session = Session::new(config);
    let err = session
        .synthesize(&SynthesisRequest::new("Waiting..."))
        .await
        .unwrap_err();

    assert!(matches!(err.kind, SynthesisError::Timeout(_)), "{err:?}");
    assert_eq!(err.state, SessionState::Synthesizing);
    assert!(!session.is_connected());

    // The service only finishes once the client has let go of the socket.
    let received = tokio::time::timeout(Duration::from_secs(5), service.received())
        .await
        .expect("connection was not released");
    assert_eq!(received.len(), 2);
}

fn service_error(text: &str) -> Message {
    ErrorEvent {
        text: text.to_string(),
        code: None,
    }
    .into_message()
}

#[tokio::test]
async fn error_event_mid_stream_is_skipped() {
    let service = FakeService::spawn(Script {
        on_describe: sends(vec![service_error("still loading"), info(&[])]),
        on_synthesize: sends(vec![
            start(MONO_16),
            chunk(MONO_16, vec![1; 4]),
            service_error("warning only"),
            chunk(MONO_16, vec![2; 4]),
            stop(),
        ]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    let audio = session
        .synthesize(&SynthesisRequest::new("Keep going."))
        .await
        .unwrap();

    assert_eq!(audio.pcm, vec![1, 1, 1, 1, 2, 2, 2, 2]);
    assert_eq!(audio.chunk_count, 2);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.service_error(), Some("warning only"));
}

#[tokio::test]
async fn error_event_then_hangup_explains_incomplete_stream() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: vec![
            Reply::Send(service_error("Unable to find voice")),
            Reply::Hangup,
        ],
        ..Default::default()
    })
    .await;

    let err = Session::new(service.config())
        .synthesize(&SynthesisRequest::new("Hello."))
        .await
        .unwrap_err();
    assert!(
        matches!(err.kind, SynthesisError::IncompleteStream { chunks: 0 }),
        "{err:?}"
    );
    assert_eq!(err.service_error.as_deref(), Some("Unable to find voice"));
    assert_eq!(err.last_message, Some(MessageKind::Error));
}

#[tokio::test]
async fn dropped_stream_fails_and_releases_the_connection() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: vec![
            Reply::Send(start(MONO_16)),
            Reply::Send(chunk(MONO_16, vec![0; 8])),
            Reply::Stall,
        ],
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    session.describe().await.unwrap();
    {
        let mut stream = session.stream(&SynthesisRequest::new("Hi.")).await.unwrap();
        assert_eq!(
            stream.next_event().await.unwrap(),
            Some(AudioEvent::Started(MONO_16))
        );
    }

    assert_eq!(session.state(), SessionState::Failed);
    assert!(!session.is_connected());
    let received = tokio::time::timeout(Duration::from_secs(5), service.received())
        .await
        .expect("connection was not released");
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn events_pulled_early_still_count_when_collecting() {
    let stereo = AudioFormat::new(16_000, 2, 2);
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: sends(vec![
            start(stereo),
            chunk(stereo, vec![1; 8]),
            chunk(stereo, vec![2; 8]),
            stop(),
        ]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    session.describe().await.unwrap();
    let mut stream = session.stream(&SynthesisRequest::new("Hi.")).await.unwrap();
    assert_eq!(
        stream.next_event().await.unwrap(),
        Some(AudioEvent::Started(stereo))
    );
    assert!(stream.next_event().await.unwrap().is_some());
    let audio = stream.collect_audio().await.unwrap();

    assert_eq!(audio.format, stereo);
    assert_eq!(audio.chunk_count, 2);
    assert_eq!(audio.pcm, [vec![1; 8], vec![2; 8]].concat());
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn format_mismatch_is_a_protocol_error() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: sends(vec![
            start(MONO_16),
            chunk(AudioFormat::new(16_000, 2, 1), vec![0; 4]),
            stop(),
        ]),
        ..Default::default()
    })
    .await;

    let err = Session::new(service.config())
        .synthesize(&SynthesisRequest::new("Hello."))
        .await
        .unwrap_err();
    assert!(matches!(err.kind, SynthesisError::Protocol(_)), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut session = Session::new(SessionConfig::new("127.0.0.1", port));
    let err = session
        .synthesize(&SynthesisRequest::new("Hello."))
        .await
        .unwrap_err();
    assert!(matches!(err.kind, SynthesisError::Connection { .. }), "{err:?}");
    assert_eq!(err.state, SessionState::Idle);
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn audio_arrives_as_a_lazy_stream() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&["en_US-amy-medium"]),
        on_synthesize: sends(vec![
            start(MONO_16),
            chunk(MONO_16, vec![1, 0]),
            chunk(MONO_16, vec![2, 0]),
            stop(),
        ]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    session.describe().await.unwrap();
    let request = SynthesisRequest::new("Streamed.").with_voice("en_US-amy-medium");
    let events: Vec<AudioEvent> = session
        .stream(&request)
        .await
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(
        events,
        vec![
            AudioEvent::Started(MONO_16),
            AudioEvent::Chunk {
                format: MONO_16,
                pcm: vec![1, 0]
            },
            AudioEvent::Chunk {
                format: MONO_16,
                pcm: vec![2, 0]
            },
        ]
    );
    assert_eq!(session.state(), SessionState::Completed);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn stream_stays_finished_after_stop() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        on_synthesize: sends(vec![stop()]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    session.describe().await.unwrap();
    let mut stream = session.stream(&SynthesisRequest::new("Hi.")).await.unwrap();
    assert!(stream.next_event().await.unwrap().is_none());
    assert!(stream.next_event().await.unwrap().is_none());
    assert_eq!(stream.chunks_received(), 0);
}

#[tokio::test]
async fn steps_out_of_order_are_rejected() {
    let mut session = Session::new(SessionConfig::default());
    let err = session.describe().await.unwrap_err();
    assert!(matches!(err.kind, SynthesisError::Protocol(_)));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn close_twice_is_harmless() {
    let service = FakeService::spawn(Script {
        on_describe: describe_answers(&[]),
        ..Default::default()
    })
    .await;

    let mut session = Session::new(service.config());
    session.connect().await.unwrap();
    assert!(session.is_connected());
    session.close().await;
    session.close().await;
    assert!(!session.is_connected());
    assert!(service.received().await.is_empty());
}

#[tokio::test]
async fn sessions_run_side_by_side() {
    let amy = FakeService::spawn(Script {
        on_describe: describe_answers(&["en_US-amy-medium"]),
        on_synthesize: sends(vec![start(MONO_16), chunk(MONO_16, vec![1; 20]), stop()]),
        ..Default::default()
    })
    .await;
    let ryan = FakeService::spawn(Script {
        on_describe: describe_answers(&["en_US-ryan-high"]),
        on_synthesize: sends(vec![start(MONO_16), chunk(MONO_16, vec![2; 40]), stop()]),
        ..Default::default()
    })
    .await;

    let amy_request = SynthesisRequest::new("One.").with_voice("en_US-amy-medium");
    let ryan_request = SynthesisRequest::new("Two.").with_voice("en_US-ryan-high");
    let mut amy_session = Session::new(amy.config());
    let mut ryan_session = Session::new(ryan.config());
    let (a, b) = tokio::join!(
        amy_session.synthesize(&amy_request),
        ryan_session.synthesize(&ryan_request),
    );
    assert_eq!(a.unwrap().pcm, vec![1; 20]);
    assert_eq!(b.unwrap().pcm, vec![2; 40]);
}

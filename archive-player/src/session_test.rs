#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use common::{PlaybackErrorKind, PlayerError, SourceType};

    use crate::archive::SourceRequest;
    use crate::stream::{
        EngineConfig, EngineErrorKind, EngineEvent, EngineFactory, EngineId, HeadlessSink,
        PlaybackStrategy, SessionOutcome, SessionState, StreamSession, StreamingEngine,
    };

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(EngineId, EngineConfig),
        Attach(EngineId),
        Load(EngineId, String),
        SetStart(EngineId, f64),
        Recover(EngineId),
        StopLoad(EngineId),
        Destroy(EngineId),
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    struct MockEngine {
        id: EngineId,
        config: EngineConfig,
        log: CallLog,
    }

    impl MockEngine {
        fn record(&self, call: Call) {
            self.log.lock().unwrap().push(call);
        }
    }

    impl StreamingEngine for MockEngine {
        fn id(&self) -> EngineId {
            self.id
        }

        fn attach_media(&mut self) {
            self.record(Call::Attach(self.id));
        }

        fn load_source(&mut self, url: &str) {
            self.record(Call::Load(self.id, url.to_string()));
        }

        fn start_position(&self) -> Option<f64> {
            self.config.start_position
        }

        fn set_start_position(&mut self, seconds: f64) {
            self.config.start_position = Some(seconds);
            self.record(Call::SetStart(self.id, seconds));
        }

        fn recover_media_error(&mut self) {
            self.record(Call::Recover(self.id));
        }

        fn stop_load(&mut self) {
            self.record(Call::StopLoad(self.id));
        }

        fn destroy(&mut self) {
            self.record(Call::Destroy(self.id));
        }
    }

    struct MockFactory {
        supported: bool,
        log: CallLog,
    }

    impl EngineFactory for MockFactory {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn create(&mut self, id: EngineId, config: EngineConfig) -> Box<dyn StreamingEngine> {
            self.log.lock().unwrap().push(Call::Create(id, config));
            Box::new(MockEngine {
                id,
                config,
                log: self.log.clone(),
            })
        }
    }

    fn session_with(native: bool, supported: bool, max_retries: u32) -> (StreamSession, CallLog) {
        let log = CallLog::default();
        let factory = MockFactory {
            supported,
            log: log.clone(),
        };
        let session = StreamSession::new(
            Box::new(factory),
            Box::new(HeadlessSink::new(native)),
            max_retries,
            Duration::from_secs(5),
        );
        (session, log)
    }

    fn adaptive(max_retries: u32) -> (StreamSession, CallLog) {
        session_with(false, true, max_retries)
    }

    fn archive(url: &str, start: u32) -> SourceRequest {
        SourceRequest {
            kind: SourceType::Archive,
            url: url.to_string(),
            start_position: Some(start),
        }
    }

    fn live(url: &str) -> SourceRequest {
        SourceRequest {
            kind: SourceType::Live,
            url: url.to_string(),
            start_position: None,
        }
    }

    fn fatal(kind: EngineErrorKind) -> EngineEvent {
        EngineEvent::Error {
            fatal: true,
            kind,
            details: "boom".to_string(),
        }
    }

    fn calls(log: &CallLog) -> Vec<Call> {
        log.lock().unwrap().clone()
    }

    const HOUR_10: &str = "https://cams.example/stream/gate/archive/2024/01/15/10/stream.m3u8?token=t";
    const HOUR_11: &str = "https://cams.example/stream/gate/archive/2024/01/15/11/stream.m3u8?token=t";
    const LIVE: &str = "https://cams.example/stream/gate/hls/best/stream.m3u8?token=t";

    #[test]
    fn test_adaptive_load_flow_corrects_start_position() {
        let (mut session, log) = adaptive(60);

        assert_eq!(session.init(archive(HOUR_10, 125)).unwrap(), SessionOutcome::Loading);
        assert_eq!(session.strategy(), Some(PlaybackStrategy::Adaptive));
        assert_eq!(
            calls(&log),
            vec![
                Call::Create(1, EngineConfig { low_latency: true, start_position: Some(125.0) }),
                Call::Attach(1),
            ]
        );

        assert_eq!(session.handle_engine_event(1, EngineEvent::MediaAttached), SessionOutcome::Attached);
        assert_eq!(session.state(), SessionState::Attached);

        let outcome = session.handle_engine_event(
            1,
            EngineEvent::ManifestParsed {
                first_fragment: Some("segment-1705312800-20.ts?token=t".to_string()),
            },
        );
        assert_eq!(outcome, SessionOutcome::Ready { server_offset: 20.0 });
        assert_eq!(session.server_offset(), 20.0);

        let log = calls(&log);
        assert!(log.contains(&Call::Load(1, HOUR_10.to_string())));
        assert!(log.contains(&Call::SetStart(1, 105.0)));
        assert!((session.sink().current_time() - 105.0).abs() < 0.5);
    }

    #[test]
    fn test_live_source_ignores_fragment_offset() {
        let (mut session, _log) = adaptive(60);
        session.init(live(LIVE)).unwrap();
        session.handle_engine_event(1, EngineEvent::MediaAttached);

        let outcome = session.handle_engine_event(
            1,
            EngineEvent::ManifestParsed {
                first_fragment: Some("segment-1705312800-20.ts".to_string()),
            },
        );
        assert_eq!(outcome, SessionOutcome::Ready { server_offset: 0.0 });
    }

    #[test]
    fn test_new_source_recreates_engine_and_drops_stale_events() {
        let (mut session, log) = adaptive(60);
        session.init(archive(HOUR_10, 0)).unwrap();
        session.handle_engine_event(1, EngineEvent::MediaAttached);

        assert_eq!(session.load(archive(HOUR_11, 0)).unwrap(), SessionOutcome::Loading);
        assert_eq!(session.engine_id(), Some(2));

        let log = calls(&log);
        assert!(log.contains(&Call::StopLoad(1)));
        assert!(log.contains(&Call::Destroy(1)));

        let stale = session.handle_engine_event(1, EngineEvent::ManifestParsed { first_fragment: None });
        assert_eq!(stale, SessionOutcome::Ignored);
    }

    #[test]
    fn test_same_archive_source_seeks() {
        let (mut session, log) = adaptive(60);
        session.init(archive(HOUR_10, 0)).unwrap();
        session.handle_engine_event(1, EngineEvent::MediaAttached);
        session.handle_engine_event(
            1,
            EngineEvent::ManifestParsed {
                first_fragment: Some("segment-1705312800-20.ts".to_string()),
            },
        );
        let created_before = calls(&log).iter().filter(|c| matches!(c, Call::Create(..))).count();

        assert_eq!(session.load(archive(HOUR_10, 600)).unwrap(), SessionOutcome::Seeked);
        assert_eq!(session.engine_id(), Some(1));
        let created_after = calls(&log).iter().filter(|c| matches!(c, Call::Create(..))).count();
        assert_eq!(created_before, created_after);
        assert!((session.sink().current_time() - 580.0).abs() < 0.5);
    }

    #[test]
    fn test_network_error_schedules_reload() {
        let (mut session, log) = adaptive(60);
        session.init(archive(HOUR_10, 0)).unwrap();
        session.handle_engine_event(1, EngineEvent::MediaAttached);

        let outcome = session.handle_engine_event(1, fatal(EngineErrorKind::Network));
        assert_eq!(outcome, SessionOutcome::RetryAfter(Duration::from_secs(5)));
        assert_eq!(session.state(), SessionState::Recovering);
        assert!(session.retry_pending());
        assert_eq!(session.fatal().retry_count, 1);
        assert!(session.fatal().in_error);

        assert_eq!(session.on_retry_timer(), SessionOutcome::Loading);
        assert_eq!(session.engine_id(), Some(2));
        assert!(calls(&log).contains(&Call::Create(
            2,
            EngineConfig { low_latency: true, start_position: Some(0.0) }
        )));

        // A second firing finds nothing pending
        assert_eq!(session.on_retry_timer(), SessionOutcome::Ignored);
    }

    #[test]
    fn test_newer_load_cancels_pending_retry() {
        let (mut session, _log) = adaptive(60);
        session.init(archive(HOUR_10, 0)).unwrap();
        session.handle_engine_event(1, fatal(EngineErrorKind::Network));

        session.load(live(LIVE)).unwrap();
        assert!(!session.retry_pending());
        assert_eq!(session.on_retry_timer(), SessionOutcome::Ignored);
    }

    #[test]
    fn test_media_error_recovers_in_place() {
        let (mut session, log) = adaptive(60);
        session.init(live(LIVE)).unwrap();

        let outcome = session.handle_engine_event(1, fatal(EngineErrorKind::Media));
        assert_eq!(outcome, SessionOutcome::MediaRecovery);
        assert!(calls(&log).contains(&Call::Recover(1)));
        assert_eq!(session.engine_id(), Some(1));
        assert_eq!(session.fatal().retry_count, 1);
    }

    #[test]
    fn test_other_error_is_terminal_soft() {
        let (mut session, log) = adaptive(60);
        session.init(live(LIVE)).unwrap();

        let outcome = session.handle_engine_event(1, fatal(EngineErrorKind::Other));
        assert_eq!(outcome, SessionOutcome::Failed(PlaybackErrorKind::Soft));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.engine_id(), None);
        assert_eq!(session.sink().error(), Some(PlaybackErrorKind::Soft));
        assert!(calls(&log).contains(&Call::Destroy(1)));
    }

    #[test]
    fn test_retry_budget_exhaustion_is_hard() {
        let (mut session, _log) = adaptive(3);
        session.init(live(LIVE)).unwrap();

        assert!(matches!(
            session.handle_engine_event(1, fatal(EngineErrorKind::Media)),
            SessionOutcome::MediaRecovery
        ));
        assert!(matches!(
            session.handle_engine_event(1, fatal(EngineErrorKind::Media)),
            SessionOutcome::MediaRecovery
        ));
        assert_eq!(
            session.handle_engine_event(1, fatal(EngineErrorKind::Media)),
            SessionOutcome::Failed(PlaybackErrorKind::Hard)
        );
        assert_eq!(session.sink().error(), Some(PlaybackErrorKind::Hard));
        assert_eq!(session.on_retry_timer(), SessionOutcome::Ignored);
    }

    #[test]
    fn test_network_retries_share_one_budget_across_engines() {
        let (mut session, log) = adaptive(4);
        session.init(live(LIVE)).unwrap();

        for engine_id in 1..=3 {
            assert_eq!(
                session.handle_engine_event(engine_id, EngineEvent::MediaAttached),
                SessionOutcome::Attached
            );
            assert_eq!(
                session.handle_engine_event(engine_id, fatal(EngineErrorKind::Network)),
                SessionOutcome::RetryAfter(Duration::from_secs(5))
            );
            assert_eq!(session.fatal().retry_count, engine_id as u32);
            assert_eq!(session.on_retry_timer(), SessionOutcome::Loading);
            assert_eq!(session.engine_id(), Some(engine_id + 1));
        }

        assert_eq!(
            session.handle_engine_event(4, fatal(EngineErrorKind::Network)),
            SessionOutcome::Failed(PlaybackErrorKind::Hard)
        );
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.engine_id(), None);
        assert_eq!(session.sink().error(), Some(PlaybackErrorKind::Hard));
        assert!(calls(&log).contains(&Call::Destroy(4)));
        assert_eq!(session.on_retry_timer(), SessionOutcome::Ignored);
    }

    #[test]
    fn test_manifest_resets_retry_counter() {
        let (mut session, _log) = adaptive(3);
        session.init(live(LIVE)).unwrap();

        session.handle_engine_event(1, fatal(EngineErrorKind::Media));
        session.handle_engine_event(1, fatal(EngineErrorKind::Media));
        session.handle_engine_event(1, EngineEvent::ManifestParsed { first_fragment: None });
        assert_eq!(session.fatal().retry_count, 0);
        assert!(!session.fatal().in_error);

        session.handle_engine_event(1, fatal(EngineErrorKind::Media));
        assert_eq!(
            session.handle_engine_event(1, fatal(EngineErrorKind::Media)),
            SessionOutcome::MediaRecovery
        );
    }

    #[test]
    fn test_non_fatal_errors_are_ignored() {
        let (mut session, _log) = adaptive(1);
        session.init(live(LIVE)).unwrap();

        let outcome = session.handle_engine_event(
            1,
            EngineEvent::Error {
                fatal: false,
                kind: EngineErrorKind::Network,
                details: "buffer stalled".to_string(),
            },
        );
        assert_eq!(outcome, SessionOutcome::Ignored);
        assert_eq!(session.fatal().retry_count, 0);
    }

    #[test]
    fn test_native_playback_preferred() {
        let (mut session, log) = session_with(true, true, 60);

        let outcome = session.init(archive(HOUR_10, 90)).unwrap();
        assert_eq!(outcome, SessionOutcome::Ready { server_offset: 0.0 });
        assert_eq!(session.strategy(), Some(PlaybackStrategy::Native));
        assert_eq!(session.sink().src(), Some(HOUR_10));
        assert!((session.sink().current_time() - 90.0).abs() < 0.5);
        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_unsupported_format_is_hard_error() {
        let (mut session, log) = session_with(false, false, 60);

        let result = session.init(live(LIVE));
        assert!(matches!(result, Err(PlayerError::UnsupportedFormat(_))));
        assert_eq!(session.strategy(), Some(PlaybackStrategy::Unsupported));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.sink().error(), Some(PlaybackErrorKind::Hard));
        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_reset_clears_sticky_error() {
        let (mut session, _log) = adaptive(60);
        session.init(live(LIVE)).unwrap();
        session.handle_engine_event(1, fatal(EngineErrorKind::Other));

        session.reset();
        assert_eq!(session.sink().error(), None);
        assert_eq!(session.source(), None);
        assert_eq!(session.fatal().retry_count, 0);
        assert_eq!(session.state(), SessionState::Detached);
    }
}

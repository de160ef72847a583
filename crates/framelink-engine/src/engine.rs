use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use framelink_frame::{
    Composer, Event, EventSink, FrameError, FrameSink, IdAllocator, ListenerKind, Message, Parser,
    TracingSink,
};
use tracing::{debug, trace};

use crate::claim::{ClaimGuard, ExclusiveClaim};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::listener::{Directive, IdListener, ListenerId, Registry};
use crate::multipart::MultipartSend;

/// Transmit state guarded by the exclusive claim.
pub(crate) struct Transmitter {
    pub composer: Composer<Box<dyn FrameSink>>,
    pub ids: IdAllocator,
}

/// A framing endpoint: parser, composer and listener tables behind one
/// object.
///
/// All methods take `&self`; the engine can be shared across threads in an
/// `Arc`. Callbacks run without any internal lock held and receive the
/// engine, so they may `respond`, `send` or `query` directly.
pub struct Engine {
    config: EngineConfig,
    events: Arc<dyn EventSink>,
    parser: Mutex<Parser>,
    registry: Mutex<Registry>,
    tx: ExclusiveClaim<Transmitter>,
}

impl Engine {
    /// Create an engine that writes frames to `sink` and logs events.
    pub fn new(config: EngineConfig, sink: impl FrameSink + 'static) -> Result<Self> {
        Self::with_events(config, sink, Arc::new(TracingSink))
    }

    /// Create an engine that reports events to `events`.
    pub fn with_events(
        config: EngineConfig,
        sink: impl FrameSink + 'static,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let sink: Box<dyn FrameSink> = Box::new(sink);
        let transmitter = Transmitter {
            composer: Composer::new(config.frame.clone(), sink)?,
            ids: IdAllocator::new(&config.frame),
        };

        debug!(
            peer = ?config.frame.peer,
            checksum = ?config.frame.checksum,
            claim = ?config.claim,
            "framelink engine created"
        );

        Ok(Self {
            parser: Mutex::new(Parser::new(config.frame.clone(), Arc::clone(&events))?),
            registry: Mutex::new(Registry::new(&config)),
            tx: ExclusiveClaim::new(config.claim, transmitter),
            config,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Feed received bytes. Any chunking of the stream is accepted.
    pub fn accept(&self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            let (used, msg) = self.parser().feed(rest);
            rest = &rest[used..];
            if let Some(msg) = msg {
                self.dispatch(msg);
            }
        }
    }

    /// Advance the clock by one unit: age the parser's stall timer and every
    /// ID listener timeout.
    pub fn tick(&self) {
        self.parser().tick();

        let expired = self.registry().tick();
        for listener in expired {
            self.events.on_event(&Event::ListenerExpired {
                frame_id: listener.frame_id,
            });
            if let Some(on_timeout) = listener.on_timeout {
                on_timeout(self);
            }
        }
    }

    /// Abandon any partially received frame.
    pub fn reset_parser(&self) {
        self.parser().reset();
    }

    /// Send a message. Returns the frame ID it was sent with.
    pub fn send(&self, msg: Message) -> Result<u32> {
        self.transmit(msg, None)
    }

    /// Send `payload` as a new message of type `msg_type`.
    pub fn send_simple(&self, msg_type: u32, payload: impl Into<Bytes>) -> Result<u32> {
        self.send(Message::new(msg_type, payload))
    }

    /// Send a message and route the response to `callback`.
    ///
    /// The listener is registered before any byte is written.
    pub fn query<F>(&self, msg: Message, callback: F) -> Result<u32>
    where
        F: FnMut(&Engine, &mut Message) -> Directive + Send + 'static,
    {
        self.transmit(msg, Some(IdListener::new(callback)))
    }

    /// Like [`query`](Self::query), but gives up after `timeout_ticks` ticks
    /// and calls `on_timeout`.
    pub fn query_with_timeout<F, T>(
        &self,
        msg: Message,
        callback: F,
        timeout_ticks: u32,
        on_timeout: T,
    ) -> Result<u32>
    where
        F: FnMut(&Engine, &mut Message) -> Directive + Send + 'static,
        T: FnOnce(&Engine) + Send + 'static,
    {
        let listener = IdListener::new(callback)
            .timeout(timeout_ticks)
            .on_timeout(on_timeout);
        self.transmit(msg, Some(listener))
    }

    /// Query with a fully configured [`IdListener`].
    pub fn query_with(&self, msg: Message, listener: IdListener) -> Result<u32> {
        self.transmit(msg, Some(listener))
    }

    /// Query with `payload` as a new message of type `msg_type`.
    pub fn query_simple<F>(
        &self,
        msg_type: u32,
        payload: impl Into<Bytes>,
        callback: F,
    ) -> Result<u32>
    where
        F: FnMut(&Engine, &mut Message) -> Directive + Send + 'static,
    {
        self.query(Message::new(msg_type, payload), callback)
    }

    /// Send a response reusing `msg.frame_id`.
    pub fn respond(&self, mut msg: Message) -> Result<u32> {
        msg.is_response = true;
        self.send(msg)
    }

    /// Start a multipart send of exactly `len` payload bytes.
    pub fn send_multipart(&self, msg_type: u32, len: usize) -> Result<MultipartSend<'_>> {
        let mut msg = Message::new(msg_type, Bytes::new());
        self.begin_multipart(&mut msg, len, None)
    }

    /// Start a multipart query. `msg` supplies the type and userdata; its
    /// payload is ignored.
    pub fn query_multipart(
        &self,
        mut msg: Message,
        len: usize,
        listener: IdListener,
    ) -> Result<MultipartSend<'_>> {
        self.begin_multipart(&mut msg, len, Some(listener))
    }

    /// Start a multipart response reusing `frame_id`.
    pub fn respond_multipart(
        &self,
        frame_id: u32,
        msg_type: u32,
        len: usize,
    ) -> Result<MultipartSend<'_>> {
        let mut msg = Message::response(frame_id, msg_type, Bytes::new());
        self.begin_multipart(&mut msg, len, None)
    }

    /// Register a response listener for `frame_id` directly.
    pub fn add_id_listener(&self, frame_id: u32, listener: IdListener) -> Result<ListenerId> {
        let result = self.registry().add_id(frame_id, listener);
        result.map_err(|err| self.report(err))
    }

    /// Returns false if no listener was registered for `frame_id`.
    pub fn remove_id_listener(&self, frame_id: u32) -> bool {
        self.registry().remove_id(frame_id)
    }

    /// Restart the timeout of the listener for `frame_id`.
    pub fn renew_id_listener(&self, frame_id: u32) -> bool {
        self.registry().renew_id(frame_id)
    }

    /// Register a persistent listener for messages of type `msg_type`.
    pub fn add_type_listener<F>(&self, msg_type: u32, callback: F) -> Result<ListenerId>
    where
        F: FnMut(&Engine, &mut Message) -> Directive + Send + 'static,
    {
        let result = self.registry().add_type(msg_type, Box::new(callback));
        result.map_err(|err| self.report(err))
    }

    /// Remove every type listener bound to `msg_type`.
    pub fn remove_type_listener(&self, msg_type: u32) -> bool {
        self.registry().remove_type(msg_type)
    }

    /// Register a fallback listener for messages nothing else claimed.
    pub fn add_generic_listener<F>(&self, callback: F) -> Result<ListenerId>
    where
        F: FnMut(&Engine, &mut Message) -> Directive + Send + 'static,
    {
        let result = self.registry().add_generic(Box::new(callback));
        result.map_err(|err| self.report(err))
    }

    pub fn remove_generic_listener(&self, id: ListenerId) -> bool {
        self.registry().remove(ListenerKind::Generic, id)
    }

    /// Number of listeners registered in a table.
    pub fn listener_count(&self, kind: ListenerKind) -> usize {
        self.registry().len(kind)
    }

    fn transmit(&self, mut msg: Message, listener: Option<IdListener>) -> Result<u32> {
        let len = msg.payload.len();
        let registered = listener.is_some();
        let (mut tx, frame_id) = self.begin(&mut msg, len, listener)?;

        let result = tx.composer.chunk(&msg.payload).and_then(|()| tx.composer.end());
        if let Err(err) = result {
            tx.composer.discard();
            drop(tx);
            if registered {
                self.registry().remove_id(frame_id);
            }
            return Err(self.report(err.into()));
        }

        debug!(frame_id, msg_type = msg.msg_type, len, "frame sent");
        Ok(frame_id)
    }

    fn begin_multipart(
        &self,
        msg: &mut Message,
        len: usize,
        listener: Option<IdListener>,
    ) -> Result<MultipartSend<'_>> {
        let registered = listener.is_some();
        let (tx, frame_id) = self.begin(msg, len, listener)?;
        debug!(frame_id, msg_type = msg.msg_type, len, "multipart send started");
        Ok(MultipartSend::new(self, tx, frame_id, registered))
    }

    /// Claim the transmit path, pick the frame ID, register the response
    /// listener and buffer the header.
    fn begin(
        &self,
        msg: &mut Message,
        len: usize,
        listener: Option<IdListener>,
    ) -> Result<(ClaimGuard<'_, Transmitter>, u32)> {
        let Some(mut tx) = self.tx.acquire() else {
            return Err(self.report(EngineError::ClaimUnavailable));
        };

        let frame_id = if msg.is_response {
            msg.frame_id
        } else {
            let registry = self.registry();
            tx.ids
                .allocate(self.config.max_id_listeners, |id| registry.has_id(id))
        };

        let registered = listener.is_some();
        if let Some(mut listener) = listener {
            listener.adopt_userdata(msg);
            let result = self.registry().add_id(frame_id, listener);
            result.map_err(|err| self.report(err))?;
        }

        if let Err(err) = tx.composer.begin(frame_id, msg.msg_type, len) {
            tx.composer.discard();
            drop(tx);
            if registered {
                self.registry().remove_id(frame_id);
            }
            return Err(self.report(err.into()));
        }

        msg.frame_id = frame_id;
        Ok((tx, frame_id))
    }

    /// Walk the ID, type and generic tiers until a listener claims `msg`.
    fn dispatch(&self, mut msg: Message) {
        let tiers = [
            (ListenerKind::Id, msg.frame_id),
            (ListenerKind::Type, msg.msg_type),
            (ListenerKind::Generic, 0),
        ];

        for (kind, selector) in tiers {
            if kind != ListenerKind::Id {
                msg.userdata = None;
                msg.userdata2 = None;
            }

            let keys = self.registry().matching(kind, selector);
            for key in keys {
                let Some(mut callback) = self.registry().take(kind, key, &mut msg) else {
                    continue;
                };
                let directive = callback(self, &mut msg);
                self.registry()
                    .restore(kind, key, callback, &mut msg, directive);

                if directive != Directive::Next {
                    trace!(
                        frame_id = msg.frame_id,
                        msg_type = msg.msg_type,
                        tier = %kind,
                        ?directive,
                        "message handled"
                    );
                    return;
                }
            }
        }

        self.events.on_event(&Event::Unhandled {
            frame_id: msg.frame_id,
            msg_type: msg.msg_type,
        });
    }

    /// Emit the event matching a synchronous failure and hand the error back.
    pub(crate) fn report(&self, err: EngineError) -> EngineError {
        let event = match &err {
            EngineError::ClaimUnavailable => Some(Event::ClaimUnavailable),
            EngineError::ListenerTableFull { kind, .. } => {
                Some(Event::ListenerTableFull { kind: *kind })
            }
            EngineError::Frame(FrameError::Io(io)) => Some(Event::WriteFailed {
                error: io.to_string(),
            }),
            _ => None,
        };
        if let Some(event) = event {
            self.events.on_event(&event);
        }
        err
    }

    pub(crate) fn remove_id_after_failure(&self, frame_id: u32) {
        self.registry().remove_id(frame_id);
    }

    fn parser(&self) -> MutexGuard<'_, Parser> {
        self.parser.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use framelink_frame::{Checksum, EventQueue, FrameConfig, Peer};

    use super::*;

    type Wire = Arc<Mutex<Vec<u8>>>;

    fn setup(config: EngineConfig) -> (Engine, Wire, Arc<EventQueue>) {
        let wire: Wire = Arc::default();
        let out = Arc::clone(&wire);
        let sink = framelink_frame::sink_fn(move |bytes: &[u8]| {
            out.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        });
        let events = Arc::new(EventQueue::default());
        let engine = Engine::with_events(config, sink, events.clone()).unwrap();
        (engine, wire, events)
    }

    fn take(wire: &Wire) -> Vec<u8> {
        std::mem::take(&mut *wire.lock().unwrap())
    }

    fn bare() -> EngineConfig {
        EngineConfig {
            frame: FrameConfig {
                sof_byte: None,
                ..FrameConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn send_allocates_master_ids() {
        let (engine, wire, _) = setup(bare());
        assert_eq!(engine.send_simple(0x10, vec![1, 2]).unwrap(), 0x80);
        assert_eq!(take(&wire), vec![0x80, 0x02, 0x10, 0x01, 0x02]);
        assert_eq!(engine.send_simple(0x10, Bytes::new()).unwrap(), 0x81);
    }

    #[test]
    fn respond_reuses_frame_id() {
        let mut cfg = bare();
        cfg.frame.peer = Peer::Slave;
        let (engine, wire, _) = setup(cfg);

        let id = engine
            .respond(Message::response(0x85, 0x20, vec![9]))
            .unwrap();
        assert_eq!(id, 0x85);
        assert_eq!(take(&wire), vec![0x85, 0x01, 0x20, 0x09]);
    }

    #[test]
    fn type_listener_sees_frames() {
        let (engine, _, events) = setup(EngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        engine
            .add_type_listener(0x10, move |_, msg| {
                assert_eq!(msg.payload.as_ref(), b"hi");
                seen.fetch_add(1, Ordering::SeqCst);
                Directive::Stay
            })
            .unwrap();

        engine.accept(&[0x01, 0x05, 0x02, 0x10, b'h', b'i']);
        engine.accept(&[0x01, 0x05, 0x02, 0x11, b'h', b'i']);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.drain(),
            vec![Event::Unhandled {
                frame_id: 0x05,
                msg_type: 0x11
            }]
        );
    }

    #[test]
    fn close_removes_listener() {
        let (engine, _, _) = setup(EngineConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        engine
            .add_generic_listener(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Directive::Close
            })
            .unwrap();

        let frame = [0x01, 0x00, 0x00, 0x42];
        engine.accept(&frame);
        engine.accept(&frame);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(engine.listener_count(ListenerKind::Generic), 0);
    }

    #[test]
    fn generic_listener_removed_by_handle() {
        let (engine, _, _) = setup(EngineConfig::default());
        let a = engine.add_generic_listener(|_, _| Directive::Next).unwrap();
        let b = engine.add_generic_listener(|_, _| Directive::Next).unwrap();
        assert!(engine.remove_generic_listener(a));
        assert!(!engine.remove_generic_listener(a));
        assert_eq!(engine.listener_count(ListenerKind::Generic), 1);
        assert!(engine.remove_generic_listener(b));
    }

    #[test]
    fn full_table_reports_event() {
        let cfg = EngineConfig {
            max_type_listeners: 1,
            ..EngineConfig::default()
        };
        let (engine, _, events) = setup(cfg);
        engine.add_type_listener(1, |_, _| Directive::Stay).unwrap();
        let err = engine
            .add_type_listener(2, |_, _| Directive::Stay)
            .unwrap_err();

        assert!(matches!(err, EngineError::ListenerTableFull { capacity: 1, .. }));
        assert_eq!(
            events.drain(),
            vec![Event::ListenerTableFull {
                kind: ListenerKind::Type
            }]
        );
    }

    #[test]
    fn query_fails_cleanly_when_id_table_full() {
        let cfg = EngineConfig {
            max_id_listeners: 1,
            ..bare()
        };
        let (engine, wire, _) = setup(cfg);
        engine
            .query_simple(0x10, Bytes::new(), |_, _| Directive::Close)
            .unwrap();
        take(&wire);

        let err = engine
            .query_simple(0x10, Bytes::new(), |_, _| Directive::Close)
            .unwrap_err();
        assert!(matches!(err, EngineError::ListenerTableFull { .. }));
        assert!(take(&wire).is_empty());
        assert_eq!(engine.listener_count(ListenerKind::Id), 1);
        engine.send_simple(0x10, Bytes::new()).unwrap();
    }

    #[test]
    fn oversized_payload_is_rejected_before_writing() {
        let (engine, wire, _) = setup(bare());
        let err = engine.send_simple(0x10, vec![0u8; 300]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Frame(FrameError::PayloadTooLarge { size: 300, .. })
        ));
        assert!(take(&wire).is_empty());
    }

    #[test]
    fn type_wider_than_field_is_rejected() {
        let (engine, wire, _) = setup(bare());
        let err = engine.send_simple(0x1FF, vec![1]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Frame(FrameError::FieldTooWide { field: "type", .. })
        ));
        assert!(take(&wire).is_empty());
        engine.send_simple(0xFF, vec![1]).unwrap();
    }

    #[test]
    fn response_id_wider_than_field_is_rejected() {
        let (engine, wire, _) = setup(bare());
        let err = engine
            .respond(Message::response(0x1234, 0x10, vec![1]))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Frame(FrameError::FieldTooWide {
                field: "frame id",
                value: 0x1234,
                max: 0xFF
            })
        ));
        assert!(take(&wire).is_empty());
    }

    #[test]
    fn query_with_wide_type_leaves_no_listener() {
        let (engine, _, _) = setup(bare());
        let err = engine
            .query_simple(0x300, vec![1], |_, _| Directive::Close)
            .unwrap_err();
        assert!(matches!(err, EngineError::Frame(FrameError::FieldTooWide { .. })));
        assert_eq!(engine.listener_count(ListenerKind::Id), 0);
    }

    #[test]
    fn write_failure_releases_claim_and_listener() {
        let mut fail = true;
        let sink = framelink_frame::sink_fn(move |_: &[u8]| {
            if std::mem::take(&mut fail) {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "link down"))
            } else {
                Ok(())
            }
        });
        let events = Arc::new(EventQueue::default());
        let engine = Engine::with_events(bare(), sink, events.clone()).unwrap();

        let err = engine
            .query_simple(0x10, vec![1], |_, _| Directive::Close)
            .unwrap_err();
        assert!(matches!(err, EngineError::Frame(FrameError::Io(_))));
        assert_eq!(engine.listener_count(ListenerKind::Id), 0);
        assert!(matches!(
            events.drain().as_slice(),
            [Event::WriteFailed { .. }]
        ));

        engine.send_simple(0x10, vec![1]).unwrap();
    }

    #[test]
    fn callbacks_can_respond_reentrantly() {
        let cfg = EngineConfig {
            frame: FrameConfig {
                checksum: Checksum::Crc8,
                ..FrameConfig::default()
            },
            ..EngineConfig::default()
        };
        let (server, server_wire, _) = setup(cfg.clone());
        server
            .add_type_listener(0x30, |engine, msg| {
                engine.respond(msg.reply(&b"pong"[..])).unwrap();
                Directive::Stay
            })
            .unwrap();

        let (client, client_wire, _) = setup(cfg);
        let got = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&got);
        let frame_id = client
            .query_simple(0x30, &b"ping"[..], move |_, msg| {
                *slot.lock().unwrap() = Some(msg.payload.clone());
                Directive::Close
            })
            .unwrap();

        server.accept(&take(&client_wire));
        client.accept(&take(&server_wire));

        assert_eq!(frame_id, 0x80);
        let payload = got.lock().unwrap().take().unwrap();
        assert_eq!(payload.as_ref(), b"pong");
        assert_eq!(client.listener_count(ListenerKind::Id), 0);
    }
}

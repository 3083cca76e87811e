//! In-process stand-ins for the anonymizing client and the upgrade step.

use super::{SecuredConn, Transport, TransportConn, Upgrader};
use crate::client::{BoxedStream, DialConf, Dialer, ListenConf, OnionClient, OnionService, RawListener};
use crate::context::Context;
use async_trait::async_trait;
use oniontransport_common::{Multiaddr, OnionError, PeerId, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Dialer handing out echoing in-memory streams
#[derive(Default)]
pub(crate) struct FakeDialer {
    pub dials: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<BoxedStream> {
        self.dials
            .lock()
            .unwrap()
            .push((network.to_string(), addr.to_string()));

        let (ours, theirs) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let (mut r, mut w) = tokio::io::split(theirs);
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });
        Ok(Box::new(ours))
    }
}

/// Client whose published service always reports `service_id`
pub(crate) struct FakeClient {
    pub service_id: String,
    pub dialer: Arc<FakeDialer>,
    pub dialer_calls: AtomicUsize,
    pub fail_dialer: AtomicBool,
    pub fail_listen: AtomicBool,
    pub listen_confs: Mutex<Vec<Vec<u16>>>,
    pub next_listener: Mutex<Option<Box<dyn RawListener>>>,
}

impl FakeClient {
    pub fn new(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            dialer: Arc::new(FakeDialer::default()),
            dialer_calls: AtomicUsize::new(0),
            fail_dialer: AtomicBool::new(false),
            fail_listen: AtomicBool::new(false),
            listen_confs: Mutex::new(Vec::new()),
            next_listener: Mutex::new(None),
        }
    }

    pub fn with_listener(self, listener: Box<dyn RawListener>) -> Self {
        *self.next_listener.lock().unwrap() = Some(listener);
        self
    }

    pub fn dials(&self) -> Vec<(String, String)> {
        self.dialer.dials.lock().unwrap().clone()
    }
}

#[async_trait]
impl OnionClient for FakeClient {
    async fn dialer(&self, _ctx: &Context, _conf: Option<&DialConf>) -> Result<Arc<dyn Dialer>> {
        self.dialer_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dialer.load(Ordering::SeqCst) {
            return Err(OnionError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "control port refused",
            )));
        }
        Ok(self.dialer.clone())
    }

    async fn listen(&self, _ctx: &Context, conf: &ListenConf) -> Result<OnionService> {
        self.listen_confs
            .lock()
            .unwrap()
            .push(conf.remote_ports.clone());
        if self.fail_listen.load(Ordering::SeqCst) {
            return Err(OnionError::Socks("service rejected".to_string()));
        }

        let listener = self
            .next_listener
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Box::new(ChannelListener::new().0) as Box<dyn RawListener>);
        Ok(OnionService {
            id: self.service_id.clone(),
            local_listener: listener,
        })
    }
}

/// Raw listener fed through a channel
pub(crate) struct ChannelListener {
    incoming: tokio::sync::Mutex<mpsc::Receiver<(BoxedStream, SocketAddr)>>,
    pub closed: Arc<AtomicBool>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::Sender<(BoxedStream, SocketAddr)>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Self {
                incoming: tokio::sync::Mutex::new(rx),
                closed: Arc::new(AtomicBool::new(false)),
            },
            tx,
        )
    }
}

#[async_trait]
impl RawListener for ChannelListener {
    async fn accept(&self) -> Result<(BoxedStream, SocketAddr)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OnionError::Io(std::io::ErrorKind::NotConnected.into()));
        }
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| OnionError::Io(std::io::ErrorKind::NotConnected.into()))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 9080)))
    }
}

/// Result of the fake upgrade: keeps the raw connection for inspection
pub(crate) struct Upgraded {
    pub conn: Box<dyn TransportConn>,
    pub peer: Option<PeerId>,
}

impl SecuredConn for Upgraded {
    fn transport(&self) -> Arc<dyn Transport> {
        self.conn.transport()
    }

    fn local_multiaddr(&self) -> Option<Multiaddr> {
        self.conn.local_multiaddr().cloned()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.conn.remote_multiaddr().clone()
    }

    fn remote_peer(&self) -> Option<PeerId> {
        self.peer
    }
}

#[derive(Default)]
pub(crate) struct FakeUpgrader {
    pub fail: AtomicBool,
    pub outbound: AtomicUsize,
    pub inbound: AtomicUsize,
    /// Bytes written to every inbound connection before it is handed back
    pub greeting: Mutex<Option<Vec<u8>>>,
}

impl FakeUpgrader {
    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OnionError::Upgrade("handshake failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Upgrader for FakeUpgrader {
    async fn upgrade_outbound(
        &self,
        ctx: &Context,
        _transport: Arc<dyn Transport>,
        conn: Box<dyn TransportConn>,
        peer: PeerId,
    ) -> Result<Box<dyn SecuredConn>> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        self.outbound.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Box::new(Upgraded {
            conn,
            peer: Some(peer),
        }))
    }

    async fn upgrade_inbound(
        &self,
        _ctx: &Context,
        _transport: Arc<dyn Transport>,
        mut conn: Box<dyn TransportConn>,
    ) -> Result<Box<dyn SecuredConn>> {
        self.inbound.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let greeting = self.greeting.lock().unwrap().clone();
        if let Some(greeting) = greeting {
            conn.write_all(&greeting).await?;
        }
        Ok(Box::new(Upgraded { conn, peer: None }))
    }
}

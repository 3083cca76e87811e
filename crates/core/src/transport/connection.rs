use super::{Transport, TransportConn};
use crate::client::BoxedStream;
use oniontransport_common::Multiaddr;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A raw onion connection with its addresses
///
/// Reads, writes and shutdown go straight to the wrapped stream.
pub struct OnionConn {
    inner: BoxedStream,
    transport: Arc<dyn Transport>,
    laddr: Option<Multiaddr>,
    raddr: Multiaddr,
}

impl OnionConn {
    pub(crate) fn new(
        inner: BoxedStream,
        transport: Arc<dyn Transport>,
        laddr: Option<Multiaddr>,
        raddr: Multiaddr,
    ) -> Self {
        Self {
            inner,
            transport,
            laddr,
            raddr,
        }
    }

    pub fn into_inner(self) -> BoxedStream {
        self.inner
    }
}

impl TransportConn for OnionConn {
    fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    fn local_multiaddr(&self) -> Option<&Multiaddr> {
        self.laddr.as_ref()
    }

    fn remote_multiaddr(&self) -> &Multiaddr {
        &self.raddr
    }
}

impl AsyncRead for OnionConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for OnionConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl fmt::Debug for OnionConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnionConn")
            .field("laddr", &self.laddr)
            .field("raddr", &self.raddr)
            .finish()
    }
}

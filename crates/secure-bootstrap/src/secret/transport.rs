//! Transport hooks used when zero-trust networking is enabled.
//!
//! Zero-trust clients route service traffic through an overlay transport;
//! destinations the overlay does not know about are reached through the
//! fallback dialer instead.

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Opens a plain connection for destinations outside the overlay.
#[async_trait]
pub trait FallbackDialer: Send + Sync {
    async fn dial(&self, addr: &str) -> std::io::Result<TcpStream>;
}

/// Direct TCP dialer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl FallbackDialer for TcpDialer {
    async fn dial(&self, addr: &str) -> std::io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

//! TCP listener binding.

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;

use crate::error::ProxyResult;

/// Bind `host:port`. `host` must be an IP address.
pub async fn bind(host: &str, port: u16) -> ProxyResult<TcpListener> {
    let ip: IpAddr = host.parse().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid bind address {:?}: {}", host, e),
        )
    })?;

    let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use tokio::net::TcpListener as TokioTcpListener;

/// A TCP socket that is bound and listening, ready to accept connections.
///
/// It can be created with std before a tokio runtime exists, so a bad endpoint fails during
/// startup instead of inside the server task, and is converted to a tokio listener when the
/// server starts.
pub struct Listener {
    inner: Inner,
}

enum Inner {
    Std(StdTcpListener),
    Tokio(TokioTcpListener),
}

impl Listener {
    pub fn bind(endpoint: SocketAddr) -> Result<Self, Box<dyn Error + Send + Sync>> {
        StdTcpListener::bind(endpoint)
            .map(|l| Self {
                inner: Inner::Std(l),
            })
            .map_err(|e| format!("unable to bind to {}: {}", endpoint, e).into())
    }

    pub async fn bind_async(endpoint: SocketAddr) -> Result<Self, Box<dyn Error + Send + Sync>> {
        TokioTcpListener::bind(endpoint)
            .await
            .map(|l| Self {
                inner: Inner::Tokio(l),
            })
            .map_err(|e| format!("unable to bind to {}: {}", endpoint, e).into())
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn Error + Send + Sync>> {
        Ok(match &self.inner {
            Inner::Std(inner) => inner.local_addr()?,
            Inner::Tokio(inner) => inner.local_addr()?,
        })
    }

    /// Must be called from within a tokio runtime.
    pub fn into_tokio(self) -> Result<TokioTcpListener, Box<dyn Error + Send + Sync>> {
        match self.inner {
            Inner::Tokio(inner) => Ok(inner),
            Inner::Std(inner) => {
                inner.set_nonblocking(true)?;
                Ok(TokioTcpListener::from_std(inner)?)
            }
        }
    }
}

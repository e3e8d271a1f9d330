//! Pooled connection wrapper and client lifecycle hooks

use crate::errors::BoxError;
use std::time::{Duration, Instant};

/// Lifecycle behaviors of a pooled client.
///
/// Every method has a default, so a client only implements the hooks it
/// actually needs. A client without hooks is treated as always open, with
/// no-op close and reset.
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Lifecycle};
///
/// struct Socket {
///     open: bool,
/// }
///
/// impl Lifecycle for Socket {
///     fn close(&mut self) -> Result<(), BoxError> {
///         self.open = false;
///         Ok(())
///     }
///
///     fn is_closed(&self) -> bool {
///         !self.open
///     }
/// }
/// ```
pub trait Lifecycle {
    /// Shut the underlying handle down
    fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Return the handle to a clean protocol state before reuse
    fn reset(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Whether the handle closed itself (e.g. the transport dropped)
    fn is_closed(&self) -> bool {
        false
    }
}

/// A client handle plus the metadata the pool needs to manage it.
///
/// `S` is a request-scoped session payload that callers may attach while the
/// connection is checked out. It is cleared on every close and reset.
pub struct Connection<C, S = ()> {
    client: C,
    usage: u64,
    version: u64,
    created_at: Instant,
    session: Option<S>,
}

impl<C: Lifecycle, S> Connection<C, S> {
    /// Wrap `client`, stamped with the pool epoch `version`.
    ///
    /// Factories should pass `pool.version()` so the connection is not
    /// considered stale.
    pub fn new(client: C, version: u64) -> Self {
        Self {
            client,
            usage: 0,
            version,
            created_at: Instant::now(),
            session: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Number of completed acquire/release cycles
    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn incr_usage(&mut self) {
        self.usage = self.usage.wrapping_add(1);
    }

    /// Pool epoch this connection was created under
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn set_session(&mut self, session: S) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&S> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut S> {
        self.session.as_mut()
    }

    pub fn take_session(&mut self) -> Option<S> {
        self.session.take()
    }

    pub fn clear_session(&mut self) {
        self.session = None;
    }

    /// Clear the session and close the client
    pub fn close(&mut self) -> Result<(), BoxError> {
        self.clear_session();
        self.client.close()
    }

    /// Clear the session and reset the client
    pub fn reset(&mut self) -> Result<(), BoxError> {
        self.clear_session();
        self.client.reset()
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

impl<C, S> std::fmt::Debug for Connection<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("usage", &self.usage)
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

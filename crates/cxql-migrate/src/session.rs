//! Audit session lifecycle for one migration run.

use crate::destination::{AuditSession, AuditSessionClient};
use crate::MigrateError;

/// Holds the single audit session of a run.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<AuditSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&AuditSession> {
        self.current.as_ref()
    }

    /// Returns a live session covering `language`.
    ///
    /// The current session is kept alive when it covers the language.
    /// Otherwise it is deleted (failures ignored) and replaced.
    pub fn refresh<C>(&mut self, client: &mut C, language: &str) -> Result<AuditSession, MigrateError>
    where
        C: AuditSessionClient + ?Sized,
    {
        if let Some(session) = &self.current {
            if session.has_language(language) {
                tracing::debug!("Reusing audit session {} for {}", session.id, language);
                client.keep_alive(session).map_err(MigrateError::Session)?;
                return Ok(session.clone());
            }
        }

        if let Some(stale) = self.current.take() {
            tracing::debug!("Audit session {} does not cover {}, replacing it", stale.id, language);
            if let Err(err) = client.delete_session(&stale) {
                tracing::debug!("Failed to delete audit session {}: {:#}", stale.id, err);
            }
        }

        let session = client
            .create_session(language)
            .map_err(MigrateError::Session)?;
        tracing::info!("Created audit session {} for {}", session.id, language);
        client.keep_alive(&session).map_err(MigrateError::Session)?;
        self.current = Some(session.clone());
        Ok(session)
    }

    /// Deletes the current session, if any.
    pub fn close<C>(&mut self, client: &mut C)
    where
        C: AuditSessionClient + ?Sized,
    {
        if let Some(session) = self.current.take() {
            match client.delete_session(&session) {
                Ok(()) => tracing::debug!("Closed audit session {}", session.id),
                Err(err) => tracing::warn!("Failed to close audit session {}: {:#}", session.id, err),
            }
        }
    }
}

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use campus_types::api::{AuthResponse, UserProfile};
use campus_types::models::Role;

use crate::error::ClientError;

/// The signed-in caller: the bearer token plus the profile returned with it.
///
/// Persisted as a small JSON file. Nothing else in the client holds session
/// state, so callers pass `&Session` into every authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

impl Session {
    /// Read a saved session. A missing or unreadable file means "signed out".
    pub fn load(path: &Path) -> Result<Option<Self>, ClientError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Discarding corrupt session file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        debug!("Saved session for user {} to {}", self.user.id, path.display());
        Ok(())
    }

    /// Sign out. Clearing an absent session is not an error.
    pub fn clear(path: &Path) -> Result<(), ClientError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }
}

impl From<AuthResponse> for Session {
    fn from(resp: AuthResponse) -> Self {
        Self {
            token: resp.token,
            user: resp.user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role) -> Session {
        Session {
            token: "header.payload.sig".into(),
            user: UserProfile {
                id: 3,
                email: "olha@school.ua".into(),
                username: "olha".into(),
                role,
            },
        }
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");

        assert_eq!(Session::load(&path).unwrap(), None);

        let saved = session(Role::User);
        saved.save(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), Some(saved));

        Session::clear(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), None);
        Session::clear(&path).unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(Session::load(&path).unwrap(), None);
    }

    #[test]
    fn admin_flag_follows_role() {
        assert!(session(Role::Admin).is_admin());
        assert!(!session(Role::User).is_admin());
    }
}

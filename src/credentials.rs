//! Credential store: the login to secret mapping used by the handshake.
//!
//! The database is a flat text file with one `login:secret` entry per line.
//! It is loaded once at startup and never modified while sessions run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Read-only lookup capability consumed by the handshake engine.
pub trait CredentialStore {
    /// Whether `login` is a known user.
    fn exists(&self, login: &str) -> bool;

    /// Secret for `login`, present exactly when [`exists`](Self::exists) is true.
    fn secret_of(&self, login: &str) -> Option<&str>;
}

/// In-memory user database.
#[derive(Debug, Default, Clone)]
pub struct UserDb {
    users: HashMap<String, String>,
}

impl UserDb {
    /// Load the user database from a file.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| CredentialError::FileRead {
                path: path.to_path_buf(),
                source,
            })?;

        let db = Self::parse(&contents);
        if db.is_empty() {
            return Err(CredentialError::Empty {
                path: path.to_path_buf(),
            });
        }

        info!(users = db.len(), path = %path.display(), "Loaded user database");
        Ok(db)
    }

    /// Parse database contents, skipping blank lines, comments and
    /// malformed entries.
    pub fn parse(contents: &str) -> Self {
        let mut users = HashMap::new();

        for line in contents.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((login, secret)) = line.split_once(':') else {
                warn!(line, "Malformed line in user database");
                continue;
            };

            let login = login.trim_matches(is_blank);
            let secret = secret.trim_matches(is_blank);

            if login.is_empty() || secret.is_empty() {
                warn!(line, "Invalid user entry in user database");
                continue;
            }

            debug!(login, "Loaded user");
            users.insert(login.to_string(), secret.to_string());
        }

        Self { users }
    }

    /// Add or replace a single user.
    #[cfg(test)]
    pub fn insert(&mut self, login: impl Into<String>, secret: impl Into<String>) {
        self.users.insert(login.into(), secret.into());
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialStore for UserDb {
    fn exists(&self, login: &str) -> bool {
        self.users.contains_key(login)
    }

    fn secret_of(&self, login: &str) -> Option<&str> {
        self.users.get(login).map(String::as_str)
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// User database loading errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read user database '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No valid users found in user database '{}'", .path.display())]
    Empty { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_entries() {
        let db = UserDb::parse("user:P@ssW0rd\nadmin:secret\n");
        assert_eq!(db.len(), 2);
        assert!(db.exists("user"));
        assert_eq!(db.secret_of("user"), Some("P@ssW0rd"));
        assert_eq!(db.secret_of("admin"), Some("secret"));
        assert!(!db.exists("nobody"));
        assert_eq!(db.secret_of("nobody"), None);
    }

    #[test]
    fn test_parse_skips_comments_and_malformed_lines() {
        let contents = "# users\n\nuser:pw\nno separator here\n:nologin\nnosecret:\n";
        let db = UserDb::parse(contents);
        assert_eq!(db.len(), 1);
        assert!(db.exists("user"));
    }

    #[test]
    fn test_parse_trims_blanks() {
        let db = UserDb::parse(" \tuser \t: pass word\t\n");
        assert_eq!(db.secret_of("user"), Some("pass word"));
    }

    #[test]
    fn test_secret_may_contain_colons() {
        let db = UserDb::parse("user:a:b:c\n");
        assert_eq!(db.secret_of("user"), Some("a:b:c"));
    }

    #[test]
    fn test_duplicate_login_last_wins() {
        let db = UserDb::parse("user:first\nuser:second\n");
        assert_eq!(db.len(), 1);
        assert_eq!(db.secret_of("user"), Some("second"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# vcalc users").unwrap();
        writeln!(file, "user:P@ssW0rd").unwrap();

        let db = UserDb::load(file.path()).unwrap();
        assert_eq!(db.secret_of("user"), Some("P@ssW0rd"));
    }

    #[test]
    fn test_load_empty_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();

        match UserDb::load(file.path()) {
            Err(CredentialError::Empty { path }) => assert_eq!(path, file.path()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.conf");
        assert!(matches!(
            UserDb::load(&path),
            Err(CredentialError::FileRead { .. })
        ));
    }
}

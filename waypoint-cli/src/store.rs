//! JSON-file implementations of the engine's storage seams.
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use waypoint_engine::{JourneySource, RawJourney, User, UserStore};

/// One pretty-printed `<username>.json` per user under a root directory.
#[derive(Debug, Clone)]
pub struct FileUserStore {
    root: PathBuf,
}

impl FileUserStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, username: &str) -> io::Result<PathBuf> {
        let usable = !username.is_empty()
            && !username.starts_with('.')
            && !username.contains(['/', '\\', ':']);
        if !usable {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("'{username}' cannot be used as a username"),
            ));
        }
        Ok(self.root.join(format!("{username}.json")))
    }
}

impl UserStore for FileUserStore {
    type Error = io::Error;

    fn load_user(&self, username: &str) -> Result<Option<User>, Self::Error> {
        let path = self.path_for(username)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        serde_json::from_str(&text).map(Some).map_err(|err| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("{}: {err}", path.display()),
            )
        })
    }

    fn save_user(&self, user: &User) -> Result<(), Self::Error> {
        let path = self.path_for(&user.username)?;
        fs::create_dir_all(&self.root)?;
        let payload = serde_json::to_vec_pretty(user)?;
        // Readers never observe a partially written record.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload)?;
        fs::rename(&staging, &path)?;
        log::debug!("saved {}", path.display());
        Ok(())
    }
}

/// Every `*.json` file in a directory, named by file stem.
#[derive(Debug, Clone)]
pub struct DirectoryJourneySource {
    dir: PathBuf,
}

impl DirectoryJourneySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn is_journey_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}

impl JourneySource for DirectoryJourneySource {
    type Error = io::Error;

    fn load_raw_journeys(&self) -> Result<Vec<RawJourney>, Self::Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!("journey directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if is_journey_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut journeys = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(body) => journeys.push(RawJourney::new(name, body)),
                Err(err) => log::warn!("skipping unreadable {}: {err}", path.display()),
            }
        }
        Ok(journeys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "waypoint-store-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    #[test]
    fn users_roundtrip_through_files() {
        let root = temp_path("users");
        let store = FileUserStore::new(&root);
        assert!(store.load_user("quinn").unwrap().is_none());

        let mut user = User::new("quinn");
        user.intro_shown = true;
        store.save_user(&user).unwrap();
        assert!(root.join("quinn.json").is_file());
        assert!(!root.join("quinn.json.tmp").exists());
        assert_eq!(store.load_user("quinn").unwrap(), Some(user));

        fs::write(root.join("broken.json"), "{").unwrap();
        let err = store.load_user("broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn saving_keeps_account_fields_written_by_others() {
        let root = temp_path("account");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("tess.json"),
            r#"{"username": "tess", "salt": "abc", "pw_hash": "def", "timezone": "UTC"}"#,
        )
        .unwrap();
        let store = FileUserStore::new(&root);
        let mut user = store.load_user("tess").unwrap().unwrap();
        user.intro_shown = true;
        store.save_user(&user).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(root.join("tess.json")).unwrap()).unwrap();
        assert_eq!(written["salt"], "abc");
        assert_eq!(written["pw_hash"], "def");
        assert_eq!(written["intro_shown"], true);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn path_like_usernames_are_rejected() {
        let store = FileUserStore::new(temp_path("names"));
        for name in ["", "../etc", "a/b", ".hidden", "c:d"] {
            let err = store.load_user(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{name:?}");
        }
    }

    #[test]
    fn journeys_load_sorted_json_files_only() {
        let dir = temp_path("journeys");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("zeta.json"), "{}").unwrap();
        fs::write(dir.join("alpha.json"), "{}").unwrap();
        fs::write(dir.join("notes.txt"), "ignore me").unwrap();

        let journeys = DirectoryJourneySource::new(&dir).load_raw_journeys().unwrap();
        let names: Vec<&str> = journeys.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);

        let missing = DirectoryJourneySource::new(dir.join("nope"));
        assert!(missing.load_raw_journeys().unwrap().is_empty());
        let _ = fs::remove_dir_all(dir);
    }
}

//! Database backups through the PostgreSQL client tools.
//!
//! Backups are `pg_dump` archives in custom format stored in the backup
//! directory. Restoring closes the connection pool first so that
//! `pg_restore --clean` can drop and recreate the tables.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{error, info};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

use crate::db::Database;
use crate::repository::errors::RepositoryError;

const PG_DUMP: &str = "pg_dump";
const PG_RESTORE: &str = "pg_restore";
const DEFAULT_PG_PORT: u16 = 5432;
const BACKUP_EXTENSIONS: [&str; 2] = ["sql", "dump"];

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("invalid backup file name: {0}")]
    InvalidFileName(String),

    #[error("Backup file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed with exit code {code}: {stderr}")]
    CommandFailed { code: String, stderr: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type BackupResult<T> = Result<T, BackupError>;

/// Connection parameters handed to the client tools.
///
/// Missing user or database names are left to libpq (`PGUSER`,
/// `PGDATABASE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbParams {
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
}

impl DbParams {
    pub fn from_url(database_url: &str) -> BackupResult<Self> {
        let url = Url::parse(database_url).map_err(|e| BackupError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(BackupError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());

        let user = non_empty(decode(url.username()));
        let dbname = non_empty(decode(url.path().trim_start_matches('/'))).or_else(|| user.clone());

        Ok(Self {
            dbname,
            password: url.password().map(decode),
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(DEFAULT_PG_PORT),
            user,
        })
    }

    fn apply(&self, command: &mut Command) {
        if let Some(dbname) = &self.dbname {
            command.arg("--dbname").arg(dbname);
        }
        if let Some(user) = &self.user {
            command.arg("--username").arg(user);
        }
        command
            .arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string());
        if let Some(password) = &self.password {
            command.env("PGPASSWORD", password);
        }
    }
}

/// Name of a backup taken at `at`, e.g. `backup_20240102_030405.dump`.
pub fn backup_file_name(at: NaiveDateTime) -> String {
    format!("backup_{}.dump", at.format("%Y%m%d_%H%M%S"))
}

/// Accepts plain file names only, so callers cannot escape the backup directory.
pub fn validate_file_name(filename: &str) -> BackupResult<&str> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        Err(BackupError::InvalidFileName(filename.to_string()))
    } else {
        Ok(filename)
    }
}

pub struct BackupManager {
    db: Arc<Database>,
    params: DbParams,
    backup_dir: PathBuf,
}

impl BackupManager {
    /// Parses the connection parameters and creates the backup directory.
    pub fn new(db: Arc<Database>, backup_dir: impl Into<PathBuf>) -> BackupResult<Self> {
        let params = DbParams::from_url(db.url())?;
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir)?;
        Ok(Self {
            db,
            params,
            backup_dir,
        })
    }

    /// Full path of a backup file inside the backup directory.
    pub fn resolve(&self, filename: &str) -> BackupResult<PathBuf> {
        Ok(self.backup_dir.join(validate_file_name(filename)?))
    }

    pub fn dump_command(&self, path: &Path) -> Command {
        let mut command = Command::new(PG_DUMP);
        self.params.apply(&mut command);
        command
            .arg("--file")
            .arg(path)
            .args(["--format", "c", "--no-password"]);
        command
    }

    pub fn restore_command(&self, path: &Path) -> Command {
        let mut command = Command::new(PG_RESTORE);
        self.params.apply(&mut command);
        command
            .args(["--clean", "--if-exists", "--no-password"])
            .arg(path);
        command
    }

    /// Dumps the database into `filename` inside the backup directory.
    pub fn backup(&self, filename: &str) -> BackupResult<PathBuf> {
        let path = self.resolve(filename)?;
        info!("Starting database backup to {}...", path.display());
        run_command(self.dump_command(&path))?;
        info!("Backup complete.");
        Ok(path)
    }

    /// Restores the database from `filename`. The pool is closed for the
    /// duration of `pg_restore` and reopened afterwards, also on failure.
    pub fn restore(&self, filename: &str) -> BackupResult<PathBuf> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(BackupError::NotFound(path));
        }

        self.db.close();

        info!("Starting database restore from {}...", path.display());
        let restored = run_command(self.restore_command(&path));
        let reconnected = self.db.connect();

        restored?;
        reconnected?;
        info!("Restore complete.");
        Ok(path)
    }

    /// Most recently modified `.sql` or `.dump` file in the backup directory.
    pub fn latest_backup(&self) -> Option<String> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(
                    "Failed to read backup directory {}: {e}",
                    self.backup_dir.display()
                );
                return None;
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(OsStr::to_str)
                    .is_some_and(|ext| BACKUP_EXTENSIONS.contains(&ext))
            })
            .filter_map(|entry| {
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                let name = entry.file_name().into_string().ok()?;
                Some((modified, name))
            })
            .max()
            .map(|(_, name)| name)
    }
}

/// Runs the command to completion, turning a non-zero exit into an error.
fn run_command(mut command: Command) -> BackupResult<String> {
    let output = command.output()?;
    if !output.status.success() {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(BackupError::CommandFailed { code, stderr });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    use chrono::NaiveDate;

    use super::*;
    use crate::db::PoolOptions;

    const URL: &str = "postgres://colab:s%40cret@db:6543/images";

    fn manager(dir: &Path) -> BackupManager {
        let db = Arc::new(Database::new(URL, PoolOptions::default()));
        BackupManager::new(db, dir).unwrap()
    }

    fn args(command: &Command) -> Vec<OsString> {
        command.get_args().map(OsStr::to_os_string).collect()
    }

    #[test]
    fn parses_database_url() {
        let params = DbParams::from_url(URL).unwrap();
        assert_eq!(
            params,
            DbParams {
                dbname: Some("images".to_string()),
                user: Some("colab".to_string()),
                password: Some("s@cret".to_string()),
                host: "db".to_string(),
                port: 6543,
            }
        );
    }

    #[test]
    fn database_url_defaults() {
        let params = DbParams::from_url("postgresql://alice@localhost").unwrap();
        assert_eq!(params.port, 5432);
        assert_eq!(params.dbname.as_deref(), Some("alice"));
        assert_eq!(params.password, None);
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            DbParams::from_url("mysql://u@h/db"),
            Err(BackupError::InvalidUrl(_))
        ));
        assert!(matches!(
            DbParams::from_url("not a url"),
            Err(BackupError::InvalidUrl(_))
        ));
    }

    #[test]
    fn user_name_is_optional() {
        let params = DbParams::from_url("postgres://localhost/db").unwrap();
        assert_eq!(params.user, None);
        assert_eq!(params.dbname.as_deref(), Some("db"));

        let mut command = Command::new("pg_dump");
        params.apply(&mut command);
        assert_eq!(
            args(&command),
            ["--dbname", "db", "--host", "localhost", "--port", "5432"]
                .iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(command.get_envs().count(), 0);

        let bare = DbParams::from_url("postgres://db-host").unwrap();
        assert_eq!(bare.dbname, None);
        assert_eq!(bare.host, "db-host");
    }

    #[test]
    fn file_name_format() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(backup_file_name(at), "backup_20240102_030405.dump");
    }

    #[test]
    fn rejects_path_like_file_names() {
        for name in ["", ".", "..", "../etc/passwd", "a/b.dump", "a\\b.dump"] {
            assert!(
                matches!(validate_file_name(name), Err(BackupError::InvalidFileName(_))),
                "{name:?} accepted"
            );
        }
        assert_eq!(validate_file_name("backup.dump").unwrap(), "backup.dump");
    }

    #[test]
    fn dump_command_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let path = manager.resolve("x.dump").unwrap();
        let command = manager.dump_command(&path);

        assert_eq!(command.get_program(), "pg_dump");
        let expected: Vec<OsString> = [
            "--dbname", "images", "--username", "colab", "--host", "db", "--port", "6543",
            "--file",
        ]
        .iter()
        .map(OsString::from)
        .chain([path.clone().into_os_string()])
        .chain(["--format", "c", "--no-password"].iter().map(OsString::from))
        .collect();
        assert_eq!(args(&command), expected);

        let envs: Vec<_> = command.get_envs().collect();
        assert_eq!(
            envs,
            vec![(OsStr::new("PGPASSWORD"), Some(OsStr::new("s@cret")))]
        );
    }

    #[test]
    fn restore_command_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let path = manager.resolve("x.dump").unwrap();
        let command = manager.restore_command(&path);

        assert_eq!(command.get_program(), "pg_restore");
        let args = args(&command);
        assert!(args.contains(&OsString::from("--clean")));
        assert!(args.contains(&OsString::from("--if-exists")));
        assert_eq!(args.last(), Some(&path.into_os_string()));
    }

    #[test]
    fn restore_of_missing_file_fails_without_touching_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        match manager.restore("missing.dump") {
            Err(BackupError::NotFound(path)) => assert_eq!(path, dir.path().join("missing.dump")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn latest_backup_picks_newest_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert_eq!(manager.latest_backup(), None);

        let base = SystemTime::now() - Duration::from_secs(3600);
        for (name, age) in [
            ("old.dump", 300),
            ("plain.sql", 200),
            ("newest.txt", 0),
            ("recent.dump", 100),
        ] {
            let file = File::create(dir.path().join(name)).unwrap();
            file.set_modified(base + Duration::from_secs(1000 - age))
                .unwrap();
        }
        fs::create_dir(dir.path().join("folder.dump")).unwrap();

        assert_eq!(manager.latest_backup(), Some("recent.dump".to_string()));
    }

    #[test]
    fn latest_backup_of_missing_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        fs::remove_dir(dir.path()).unwrap();
        assert_eq!(manager.latest_backup(), None);
    }

    #[test]
    fn failed_command_reports_exit_code() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo boom >&2; exit 3"]);
        match run_command(command) {
            Err(BackupError::CommandFailed { code, stderr }) => {
                assert_eq!(code, "3");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

//! Loading session files from disk.

use std::io::Write;

use glide_cli::{CliError, SessionFile, ViewMode};

#[test]
fn loads_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        homeserver = "https://matrix.example.org"
        retry_delay_ms = 500

        [[view]]
        name = "all"
        mode = "growing"
        batch_size = 10
        "#
    )
    .unwrap();

    let session = SessionFile::load(file.path()).unwrap();
    assert_eq!(session.views[0].mode, ViewMode::Growing);
    assert_eq!(session.session_config().retry_delay.as_millis(), 500);
    assert!(session.builder().is_ok());
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = SessionFile::load(&path).unwrap_err();
    assert!(matches!(&err, CliError::Read { path: p, .. } if *p == path));
    assert!(err.to_string().contains("absent.toml"));
}

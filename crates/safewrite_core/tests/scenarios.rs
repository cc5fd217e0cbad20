//! End-to-end tests for transactional sessions against real files.

use safewrite_core::{
    open, writer, Config, DryRun, Error, Outcome, ScopeError, Session, Sink, Staging,
    SymlinkPolicy, STAGING_SUFFIX,
};
use safewrite_testkit::{FailingWriter, Recorder, TempTarget};
use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

fn disk() -> Config {
    Config::new().staging(Staging::Disk)
}

#[test]
fn writes_become_one_file() {
    let target = TempTarget::new("out.txt");

    let mut session = target.session(Config::new());
    session.write_all(b"one").unwrap();
    session.write_all(b"two").unwrap();
    assert!(!target.exists());
    session.commit().unwrap();

    assert_eq!(target.read().unwrap(), b"onetwo");
    assert!(target.stray_files().is_empty());
}

#[test]
fn append_preserves_existing_content() {
    for config in [Config::new(), disk()] {
        let target = TempTarget::with_content("log.txt", b"old");

        let mut session = target.session(config.parse_mode("a").unwrap());
        session.write_all(b"new").unwrap();
        session.commit().unwrap();

        assert_eq!(target.read().unwrap(), b"oldnew");
    }
}

#[test]
fn caller_error_keeps_old_content() {
    let target = TempTarget::with_content("out.txt", b"old");

    let result = target.session(disk()).run(|session| {
        session.write_all(b"new")?;
        Err::<(), _>(io::Error::new(io::ErrorKind::Other, "caller gave up"))
    });

    let err = result.unwrap_err();
    assert_eq!(err.caller().unwrap().to_string(), "caller gave up");
    assert!(matches!(err, ScopeError::Caller { cleanup: None, .. }));
    assert_eq!(target.read().unwrap(), b"old");
    assert!(target.stray_files().is_empty());
}

#[test]
fn missing_parent_is_created() {
    let target = TempTarget::new("nested/deeper/out.txt");

    let mut session = target.session(Config::new().create_parents(true));
    session.write_all(b"made it").unwrap();
    session.commit().unwrap();

    assert_eq!(target.read().unwrap(), b"made it");
}

#[test]
fn missing_parent_without_creation_fails() {
    let target = TempTarget::new("nested/out.txt");

    let mut session = target.session(Config::new());
    session.write_all(b"nowhere").unwrap();

    assert!(matches!(
        session.close(),
        Err(Error::MissingParent { .. })
    ));
    assert!(session.is_failed());
    assert!(!target.exists());
    assert!(target.stray_files().is_empty());
}

#[test]
fn dry_run_never_touches_destination() {
    let target = TempTarget::with_content("out.txt", b"keep");

    let mut session = target.session(disk().dry_run(true));
    session.write_all(b"discarded").unwrap();
    let outcome = session.commit().unwrap();

    assert_eq!(
        outcome,
        Outcome::DryRun {
            bytes: 9,
            redirected: false
        }
    );
    assert_eq!(target.read().unwrap(), b"keep");
    assert!(target.stray_files().is_empty());
}

#[test]
fn dry_run_redirect_receives_payload() {
    let target = TempTarget::with_content("out.txt", b"keep");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let config = disk().chunk_size(2).dry_run(DryRun::redirect(move |chunk| {
        sink.lock().unwrap().extend_from_slice(chunk);
        Ok(())
    }));
    let mut session = target.session(config);
    session.write_all(b"preview").unwrap();
    session.commit().unwrap();

    assert_eq!(*seen.lock().unwrap(), b"preview");
    assert_eq!(target.read().unwrap(), b"keep");
}

#[test]
fn empty_success_creates_empty_file() {
    for config in [Config::new(), disk()] {
        let target = TempTarget::new("empty.txt");
        target.session(config).commit().unwrap();
        assert_eq!(target.read().unwrap(), b"");
    }
}

#[test]
fn empty_failure_leaves_nothing() {
    let target = TempTarget::new("empty.txt");
    target.session(disk()).abort().unwrap();
    assert!(!target.exists());
    assert!(target.stray_files().is_empty());
}

#[test]
fn staging_file_is_hidden_sibling() {
    let target = TempTarget::new("data.csv");
    let mut session = target.session(disk());
    session.write_all(b"a,b\n").unwrap();

    let staging = session.staging_path().unwrap().to_path_buf();
    let name = staging.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(staging.parent(), target.path().parent());
    assert!(name.starts_with(".data.csv."));
    assert!(name.ends_with(STAGING_SUFFIX));

    session.commit().unwrap();
    assert!(!staging.exists());
    assert_eq!(target.read().unwrap(), b"a,b\n");
}

#[test]
fn explicit_staging_path_is_used() {
    let target = TempTarget::new("out.txt");
    let staging = target.dir().join("custom.stage");

    let mut session = target.session(Config::new().staging(Staging::DiskAt(staging.clone())));
    session.write_all(b"via custom").unwrap();
    assert_eq!(session.staging_path(), Some(staging.as_path()));
    session.commit().unwrap();

    assert!(!staging.exists());
    assert_eq!(target.read().unwrap(), b"via custom");
}

#[test]
fn failed_staging_file_can_be_retained() {
    let target = TempTarget::with_content("out.txt", b"old");

    let mut session = target.session(disk().delete_failures(false));
    session.write_all(b"half").unwrap();
    let outcome = session.abort().unwrap();

    let Outcome::Discarded {
        retained: Some(retained),
    } = outcome
    else {
        panic!("expected retained staging file, got {outcome:?}");
    };
    assert_eq!(fs::read(&retained).unwrap(), b"half");
    assert_eq!(target.stray_files(), vec![retained]);
    assert_eq!(target.read().unwrap(), b"old");
}

#[test]
fn panic_discards_output() {
    let target = TempTarget::with_content("out.txt", b"old");
    let path = target.path().to_path_buf();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut session = Config::new().staging(Staging::Disk).open(&path).unwrap();
        session.write_all(b"new").unwrap();
        panic!("boom");
    }));

    assert!(result.is_err());
    assert_eq!(target.read().unwrap(), b"old");
    assert!(target.stray_files().is_empty());
}

#[test]
fn dropped_session_discards_output() {
    let target = TempTarget::with_content("out.txt", b"old");
    {
        let mut session = target.session(disk());
        session.write_all(b"forgotten").unwrap();
    }
    assert_eq!(target.read().unwrap(), b"old");
    assert!(target.stray_files().is_empty());
}

#[test]
fn finishing_twice_is_finishing_once() {
    let target = TempTarget::new("out.txt");
    let mut session = target.session(disk());
    session.write_all(b"once").unwrap();

    let first = session.close().unwrap();
    fs::write(target.path(), b"changed behind our back").unwrap();
    let second = session.close().unwrap();

    assert_eq!(first, second);
    assert_eq!(target.read().unwrap(), b"changed behind our back");
}

#[test]
fn exclusive_mode_refuses_existing() {
    let target = TempTarget::with_content("out.txt", b"mine");
    let result = Config::new().parse_mode("x").unwrap().open(target.path());
    assert!(matches!(result, Err(Error::DestinationExists { .. })));
    assert_eq!(target.read().unwrap(), b"mine");

    let fresh = TempTarget::new("new.txt");
    let mut session = Config::new().parse_mode("x").unwrap().open(fresh.path()).unwrap();
    session.write_all(b"first").unwrap();
    session.commit().unwrap();
    assert_eq!(fresh.read().unwrap(), b"first");
}

#[test]
fn read_update_overwrites_in_place() {
    let target = TempTarget::with_content("out.txt", b"0123456789");

    let mut session = open(target.path(), "r+").unwrap();
    session.seek(SeekFrom::Start(4)).unwrap();
    session.write_all(b"xx").unwrap();
    session.commit().unwrap();

    assert_eq!(target.read().unwrap(), b"0123xx6789");
}

#[test]
fn truncating_mode_ignores_existing() {
    let target = TempTarget::with_content("out.txt", b"a much longer old content");
    let mut session = open(target.path(), "w+").unwrap();
    session.write_all(b"short").unwrap();
    session.commit().unwrap();
    assert_eq!(target.read().unwrap(), b"short");
}

#[cfg(unix)]
#[test]
fn permissions_survive_replacement() {
    use std::os::unix::fs::PermissionsExt;

    let target = TempTarget::with_content("script.sh", b"#!/bin/sh\n");
    fs::set_permissions(target.path(), fs::Permissions::from_mode(0o750)).unwrap();

    let mut session = target.session(disk());
    session.write_all(b"#!/bin/sh\necho hi\n").unwrap();
    session.commit().unwrap();

    let mode = fs::metadata(target.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[cfg(unix)]
#[test]
fn symlink_target_is_replaced() {
    let target = TempTarget::with_content("real.txt", b"old");
    let link = target.dir().join("link.txt");
    std::os::unix::fs::symlink(target.path(), &link).unwrap();

    let mut session = Config::new().open(&link).unwrap();
    session.write_all(b"through link").unwrap();
    session.commit().unwrap();

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(target.read().unwrap(), b"through link");

    let mut session = Config::new()
        .symlinks(SymlinkPolicy::ReplaceLink)
        .open(&link)
        .unwrap();
    session.write_all(b"own file").unwrap();
    session.commit().unwrap();

    assert!(!fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(&link).unwrap(), b"own file");
    assert_eq!(target.read().unwrap(), b"through link");
}

#[test]
fn nested_inner_failure_spares_outer() {
    let target = TempTarget::new("out.txt");
    let mut outer = target.session(Config::new());
    outer.write_all(b"[").unwrap();

    {
        let mut inner = writer(&mut outer).unwrap();
        inner.write_all(b"rejected").unwrap();
        inner.abort().unwrap();
    }
    {
        let mut inner = writer(&mut outer).unwrap();
        inner.write_all(b"accepted").unwrap();
        inner.commit().unwrap();
    }

    outer.write_all(b"]").unwrap();
    assert!(!outer.is_failed());
    outer.commit().unwrap();
    assert_eq!(target.read().unwrap(), b"[accepted]");
}

#[test]
fn stream_delivery_failure_reports_error() {
    let failing = FailingWriter::new(Vec::new());
    let control = failing.control();
    control.fail_after(4);

    let mut session = Session::new(Sink::binary_stream(failing), disk()).unwrap();
    session.write_all(b"too long for the pipe").unwrap();

    assert!(matches!(session.close(), Err(Error::Delivery { .. })));
    assert!(control.has_failed());
    assert!(session.is_failed());
}

#[test]
fn close_hook_sees_failure_flag() {
    let recorder = Recorder::new();

    let config = Config::new().close_on_exit(true);
    let mut session = Session::new(recorder.closing_sink(), config.clone()).unwrap();
    session.write_all(b"ok").unwrap();
    session.commit().unwrap();

    let mut session = Session::new(recorder.closing_sink(), config).unwrap();
    session.write_all(b"bad").unwrap();
    session.abort().unwrap();

    assert_eq!(recorder.closes(), vec![false, true]);
    assert_eq!(recorder.contents(), b"ok");
}

#[test]
fn stream_left_open_without_close_on_exit() {
    let recorder = Recorder::new();
    let mut session = writer(recorder.writer()).unwrap();
    session.write_all(b"data").unwrap();
    session.commit().unwrap();

    assert_eq!(recorder.contents(), b"data");
    assert_eq!(recorder.flushes(), 1);
}

#[test]
fn disabled_session_writes_directly() {
    let target = TempTarget::with_content("out.txt", b"old");
    let mut session = target.session(Config::new().enabled(false));
    session.write_all(b"live").unwrap();
    session.flush().unwrap();
    assert_eq!(target.read().unwrap(), b"live");

    session.fail();
    assert_eq!(
        session.commit().unwrap(),
        Outcome::PassedThrough { bytes: 4 }
    );
    assert_eq!(target.read().unwrap(), b"live");
}

#[test]
fn text_sink_receives_whole_characters() {
    let recorder = Recorder::new();
    let config = disk().chunk_size(3);
    let mut session = Session::new(recorder.text_sink(), config).unwrap();
    assert!(!session.is_binary());
    session.write_all("ééé€".as_bytes()).unwrap();
    session.commit().unwrap();

    for chunk in recorder.chunks() {
        assert!(std::str::from_utf8(&chunk).is_ok());
    }
    assert_eq!(recorder.contents(), "ééé€".as_bytes());
}

#[test]
fn invalid_text_fails_delivery() {
    let recorder = Recorder::new();
    let mut session = Session::new(recorder.text_sink(), disk()).unwrap();
    session.write_all(b"ok\xff").unwrap();

    assert!(matches!(session.close(), Err(Error::Delivery { .. })));
    assert!(session.is_failed());
}

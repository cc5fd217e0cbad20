//! Property tests: committed output is exactly what was written, and
//! failed output never reaches the destination.

use proptest::prelude::*;
use safewrite_core::{Config, Session, Staging};
use safewrite_testkit::{
    chunk_size_strategy, payload_strategy, text_strategy, write_sequence_strategy, Recorder,
    TempTarget,
};
use std::io::Write;

fn staging_strategy() -> impl Strategy<Value = Staging> {
    prop_oneof![Just(Staging::Memory), Just(Staging::Disk)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn committed_file_is_concatenation(
        writes in write_sequence_strategy(),
        staging in staging_strategy(),
    ) {
        let target = TempTarget::new("out.bin");
        let mut session = target.session(Config::new().staging(staging));
        for chunk in &writes {
            session.write_all(chunk).unwrap();
        }
        session.commit().unwrap();

        prop_assert_eq!(target.read().unwrap(), writes.concat());
        prop_assert!(target.stray_files().is_empty());
    }

    #[test]
    fn appended_file_is_preload_then_writes(
        existing in payload_strategy(),
        writes in write_sequence_strategy(),
        staging in staging_strategy(),
    ) {
        let target = TempTarget::with_content("out.bin", &existing);
        let config = Config::new().parse_mode("ab").unwrap().staging(staging);
        let mut session = target.session(config);
        for chunk in &writes {
            session.write_all(chunk).unwrap();
        }
        session.commit().unwrap();

        let mut expected = existing.clone();
        expected.extend(writes.concat());
        prop_assert_eq!(target.read().unwrap(), expected);
    }

    #[test]
    fn failed_session_leaves_destination(
        existing in prop::option::of(payload_strategy()),
        writes in write_sequence_strategy(),
        staging in staging_strategy(),
    ) {
        let target = match &existing {
            Some(content) => TempTarget::with_content("out.bin", content),
            None => TempTarget::new("out.bin"),
        };
        let mut session = target.session(Config::new().staging(staging));
        for chunk in &writes {
            session.write_all(chunk).unwrap();
        }
        session.fail();
        session.commit().unwrap();

        prop_assert_eq!(target.read(), existing);
        prop_assert!(target.stray_files().is_empty());
    }

    #[test]
    fn chunked_delivery_preserves_bytes(
        writes in write_sequence_strategy(),
        chunk_size in chunk_size_strategy(),
    ) {
        let recorder = Recorder::new();
        let config = Config::new().staging(Staging::Disk).chunk_size(chunk_size);
        let mut session = Session::new(recorder.sink(), config).unwrap();
        for chunk in &writes {
            session.write_all(chunk).unwrap();
        }
        session.commit().unwrap();

        for chunk in recorder.chunks() {
            prop_assert!(chunk.len() <= chunk_size);
        }
        prop_assert_eq!(recorder.contents(), writes.concat());
    }

    #[test]
    fn text_delivery_never_splits_characters(
        text in text_strategy(),
        chunk_size in chunk_size_strategy(),
    ) {
        let recorder = Recorder::new();
        let config = Config::new().staging(Staging::Disk).chunk_size(chunk_size);
        let mut session = Session::new(recorder.text_sink(), config).unwrap();
        session.write_all(text.as_bytes()).unwrap();
        session.commit().unwrap();

        for chunk in recorder.chunks() {
            prop_assert!(std::str::from_utf8(&chunk).is_ok());
        }
        prop_assert_eq!(recorder.contents(), text.into_bytes());
    }
}

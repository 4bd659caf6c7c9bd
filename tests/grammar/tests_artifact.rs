//! Artifact loading: round trips and rejection of damaged artifacts

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::{Language, LanguageHandle, LoadError, Parser};

use crate::helpers::grammars::{arithmetic, fenced_handle};

fn arithmetic_bytes() -> Vec<u8> {
    arithmetic().to_bytes()
}

#[test]
fn test_artifact_round_trip_parses_identically() {
    let original = arithmetic();
    let reloaded = Language::from_bytes(&original.to_bytes()).unwrap();
    assert_eq!(reloaded.name(), "arithmetic");
    assert_eq!(reloaded.symbol_count(), original.symbol_count());
    assert_eq!(reloaded.state_count(), original.state_count());

    let text = "1 + 2 * (3 + 4)";
    let from_original = Parser::with_language(original).parse(text, None).unwrap();
    let from_reloaded = Parser::with_language(reloaded).parse(text, None).unwrap();
    assert_eq!(from_original.to_sexp(), from_reloaded.to_sexp());
}

#[rstest]
#[case::empty(0)]
#[case::inside_magic(2)]
#[case::inside_version(5)]
#[case::after_header(6)]
#[case::early_section(20)]
fn test_truncated_artifact_is_corrupt(#[case] len: usize) {
    let bytes = arithmetic_bytes();
    let result = Language::from_bytes(&bytes[..len]);
    assert!(
        matches!(result, Err(LoadError::CorruptArtifact(_))),
        "truncated to {len}: {result:?}"
    );
}

#[test]
fn test_every_truncation_is_rejected_without_panicking() {
    let bytes = arithmetic_bytes();
    for len in (0..bytes.len()).step_by(7) {
        assert!(
            matches!(Language::from_bytes(&bytes[..len]), Err(LoadError::CorruptArtifact(_))),
            "truncated to {len}"
        );
    }
}

#[test]
fn test_trailing_bytes_are_corrupt() {
    let mut bytes = arithmetic_bytes();
    bytes.push(0);
    assert!(matches!(
        Language::from_bytes(&bytes),
        Err(LoadError::CorruptArtifact(_))
    ));
}

#[rstest]
#[case(0)]
#[case(2)]
#[case(0xffff)]
fn test_unsupported_version_is_incompatible(#[case] version: u16) {
    let mut bytes = arithmetic_bytes();
    bytes[4..6].copy_from_slice(&version.to_le_bytes());
    match Language::from_bytes(&bytes) {
        Err(LoadError::IncompatibleVersion { found, min, max }) => {
            assert_eq!(found, version);
            assert!(min <= max);
            assert!(!(min..=max).contains(&version));
        }
        other => panic!("expected IncompatibleVersion, got {other:?}"),
    }
}

#[test]
fn test_bad_magic_is_corrupt() {
    let mut bytes = arithmetic_bytes();
    bytes[0] = b'X';
    assert!(matches!(
        Language::from_bytes(&bytes),
        Err(LoadError::CorruptArtifact(_))
    ));
}

#[test]
fn test_handles_compare_by_artifact() {
    static EMPTY: [u8; 0] = [];
    let handle = fenced_handle();
    assert_eq!(handle, fenced_handle());
    assert_ne!(handle, LanguageHandle::from_static(&EMPTY));
    assert!(matches!(
        LanguageHandle::from_static(&EMPTY).load(),
        Err(LoadError::CorruptArtifact(_))
    ));
    assert!(handle.load().unwrap().has_external_scanner());
}

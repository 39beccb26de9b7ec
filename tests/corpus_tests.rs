//! Integration tests for loading and sampling the request corpus.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

use rust_loadgen::corpus::{CorpusError, RequestCorpus, RequestSpec};

const DEFAULT_URL: &str = "http://default.test/";

fn corpus_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn spec(url: &str, body: &str) -> RequestSpec {
    RequestSpec {
        url: url.to_string(),
        body: body.to_string(),
    }
}

fn single(corpus_json: &str) -> RequestSpec {
    let corpus = RequestCorpus::from_json_str(corpus_json).unwrap();
    assert_eq!(corpus.len(), 1);
    corpus.sample(DEFAULT_URL, &mut StdRng::seed_from_u64(1))
}

#[test]
fn body_only_entry_uses_default_url() {
    assert_eq!(single(r#"["X"]"#), spec(DEFAULT_URL, "X"));
}

#[test]
fn pair_with_empty_url_uses_default_url() {
    assert_eq!(single(r#"[["", "Y"]]"#), spec(DEFAULT_URL, "Y"));
}

#[test]
fn pair_with_url_is_used_verbatim() {
    assert_eq!(
        single(r#"[["http://u.test/z", "Z"]]"#),
        spec("http://u.test/z", "Z")
    );
}

#[test]
fn one_element_inner_array_is_body_only() {
    assert_eq!(single(r#"[["just a body"]]"#), spec(DEFAULT_URL, "just a body"));
}

#[test]
fn empty_corpus_samples_default() {
    let corpus = RequestCorpus::default();
    assert!(corpus.is_empty());
    assert_eq!(
        corpus.sample(DEFAULT_URL, &mut StdRng::seed_from_u64(7)),
        spec(DEFAULT_URL, "")
    );
}

#[test]
fn sampling_reaches_every_entry() {
    let corpus = RequestCorpus::from_json_str(r#"["a", "b", "c", "d"]"#).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let seen: HashSet<String> = (0..400)
        .map(|_| corpus.sample(DEFAULT_URL, &mut rng).body)
        .collect();

    assert_eq!(seen.len(), 4);
}

#[test]
fn load_from_file_reads_pairs() {
    let file = corpus_file(r#"[["http://a.test/", "{\"id\":1}"], ["", "{\"id\":2}"]]"#);
    let corpus = RequestCorpus::from_file(file.path()).unwrap();

    assert_eq!(corpus.len(), 2);

    let mut rng = StdRng::seed_from_u64(3);
    let seen: HashSet<(String, String)> = (0..200)
        .map(|_| {
            let spec = corpus.sample(DEFAULT_URL, &mut rng);
            (spec.url, spec.body)
        })
        .collect();
    let expected: HashSet<(String, String)> = [
        ("http://a.test/".to_string(), r#"{"id":1}"#.to_string()),
        (DEFAULT_URL.to_string(), r#"{"id":2}"#.to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(seen, expected);
}

#[test]
fn oversized_inner_array_is_rejected() {
    let err = RequestCorpus::from_json_str(r#"[["u", "b", "extra"]]"#).unwrap_err();
    assert!(matches!(err, CorpusError::InvalidEntry { index: 0, len: 3 }));
}

#[test]
fn malformed_file_loads_as_empty() {
    let file = corpus_file("{ this is not json");
    assert!(matches!(
        RequestCorpus::from_file(file.path()),
        Err(CorpusError::Parse(_))
    ));
    assert!(RequestCorpus::load_or_empty(file.path()).is_empty());
}

#[test]
fn missing_file_loads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    assert!(matches!(
        RequestCorpus::from_file(&path),
        Err(CorpusError::Io(_))
    ));
    assert!(RequestCorpus::load_or_empty(&path).is_empty());
}

//! Builds the multi-level tree used throughout the fingerprint spec (a root
//! with mixed files, an empty directory, and several levels of nesting) and
//! checks the structural invariants the composite fingerprint is supposed to
//! guarantee.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use datim::hash::fold_hashes;
use datim::{AbsAnyPath, Generator, GeneratorConfig, Hash, Imprint};
use pretty_assertions::assert_eq;

use crate::temp_dir;

fn write_tree(root: &std::path::Path) {
    std::fs::write(root.join("example.txt"), b"example text content").unwrap();
    std::fs::write(root.join("example.bin"), [0xDEu8, 0xAD, 0xBE, 0xEF]).unwrap();

    let foobar = root.join("foobar");
    std::fs::create_dir(&foobar).unwrap();
    std::fs::write(foobar.join("foo.txt"), b"foo").unwrap();
    std::fs::write(foobar.join("bar.txt"), b"bar").unwrap();

    std::fs::create_dir(root.join("empty")).unwrap();

    let level1 = root.join("level-1");
    std::fs::create_dir(&level1).unwrap();
    std::fs::write(level1.join("this.txt"), b"this").unwrap();
    std::fs::write(level1.join("empty.bin"), []).unwrap();
    std::fs::create_dir(level1.join("level-2a")).unwrap();
    let level2b = level1.join("level-2b");
    std::fs::create_dir(&level2b).unwrap();
    let level3 = level2b.join("level-3");
    std::fs::create_dir(&level3).unwrap();
    std::fs::write(level3.join("that.txt"), b"that").unwrap();
}

async fn generate(root: &std::path::Path) -> (Imprint, Vec<Imprint>) {
    let generator = Generator::new(GeneratorConfig::builder().build());
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = emitted.clone();

    let canonical = AbsAnyPath::canonicalize(root).unwrap();
    let root_imprint = generator
        .produce_imprint(canonical, move |imprint| {
            sink.lock().unwrap().push(imprint);
            Ok(())
        })
        .await
        .unwrap();

    let emitted = emitted.lock().unwrap().clone();
    (root_imprint, emitted)
}

#[test_log::test(tokio::test)]
async fn every_path_is_emitted_exactly_once() {
    let (_tmp, root) = temp_dir();
    write_tree(&root);

    let (_root_imprint, emitted) = generate(&root).await;

    // root, example.txt, example.bin, foobar/, foobar/foo.txt, foobar/bar.txt,
    // empty/, level-1/, level-1/this.txt, level-1/empty.bin, level-1/level-2a/,
    // level-1/level-2b/, level-1/level-2b/level-3/, level-1/level-2b/level-3/that.txt
    assert_eq!(emitted.len(), 14);

    let mut seen_paths: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for imprint in &emitted {
        *seen_paths.entry(imprint.path().as_std_path().to_path_buf()).or_default() += 1;
    }
    assert!(seen_paths.values().all(|&count| count == 1), "every path emitted exactly once");
}

#[test_log::test(tokio::test)]
async fn empty_directory_has_empty_content_and_children_fingerprint() {
    let (_tmp, root) = temp_dir();
    write_tree(&root);

    let (_root_imprint, emitted) = generate(&root).await;

    let empty_dir = emitted
        .iter()
        .find(|imprint| imprint.path().file_name_str().as_deref() == Some("empty"))
        .expect("empty/ was emitted");
    assert_eq!(*empty_dir.content_fingerprint(), Hash::empty());
    assert_eq!(empty_dir.children_fingerprint(), &Some(Hash::empty()));
}

#[test_log::test(tokio::test)]
async fn directory_content_fingerprint_folds_sorted_children() {
    let (_tmp, root) = temp_dir();
    write_tree(&root);

    let (_root_imprint, emitted) = generate(&root).await;

    let foobar = emitted
        .iter()
        .find(|imprint| imprint.path().file_name_str().as_deref() == Some("foobar"))
        .expect("foobar/ was emitted");

    // bar.txt sorts before foo.txt lexicographically.
    let bar = Hash::hash_string("bar");
    let foo = Hash::hash_string("foo");
    let expected_content = fold_hashes([&bar, &foo]);
    assert_eq!(*foobar.content_fingerprint(), expected_content);
}

#[test_log::test(tokio::test)]
async fn mutating_a_deeply_nested_file_changes_the_root_fingerprint() {
    let (_tmp, root) = temp_dir();
    write_tree(&root);

    let (before, _) = generate(&root).await;

    let leaf = root.join("level-1/level-2b/level-3/that.txt");
    std::fs::write(&leaf, b"mutated content").unwrap();

    let (after, _) = generate(&root).await;

    assert_ne!(
        before.fingerprint().to_string(),
        after.fingerprint().to_string(),
        "mutating a leaf must change every ancestor fingerprint up to the root"
    );
}

#[test_log::test(tokio::test)]
async fn hashing_is_deterministic_across_independent_runs() {
    let (_tmp, root) = temp_dir();
    write_tree(&root);

    let (first, _) = generate(&root).await;
    let (second, _) = generate(&root).await;

    assert_eq!(first.fingerprint().to_string(), second.fingerprint().to_string());
    assert_eq!(first.content_fingerprint(), second.content_fingerprint());
}

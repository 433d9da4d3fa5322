//! Drives the full generate → serialize → parse → check pipeline against
//! real temporary-directory trees, including rebasing a recorded imprint
//! onto a copy of the tree rooted somewhere else.

use std::sync::{Arc, Mutex};

use datim::{
    check_all, AbsAnyPath, CheckResult, CheckerConfig, DatimReader, DatimWriter, Generator,
    GeneratorConfig, LineTerminator,
};
use pretty_assertions::assert_eq;

use crate::temp_dir;

async fn generate_datim(root: &std::path::Path) -> Vec<u8> {
    let generator = Generator::new(GeneratorConfig::builder().build());
    let base = AbsAnyPath::canonicalize(root).unwrap().into_dir();

    let writer = Arc::new(Mutex::new(DatimWriter::new(Vec::new(), LineTerminator::Lf)));
    writer.lock().unwrap().write_header().unwrap();
    writer.lock().unwrap().write_base_path(&base).unwrap();

    let sink = writer.clone();
    generator
        .produce_imprint(base.erase_kind(), move |imprint| {
            sink.lock()
                .unwrap()
                .write_imprint(&imprint)
                .map_err(|err| datim::Error::ConsumerError(err.to_string()))
        })
        .await
        .unwrap();

    Arc::try_unwrap(writer)
        .unwrap_or_else(|_| panic!("writer still shared after generation completed"))
        .into_inner()
        .unwrap()
        .into_inner()
}

#[test_log::test(tokio::test)]
async fn unmutated_tree_matches_itself_after_rebasing_to_a_copy() {
    // Both roots share the same final path component ("tree") so the
    // root row's own filename comparison matches; only the *parent* of
    // each temp directory differs, which rebasing is precisely meant to
    // paper over.
    let (_src_tmp, src_parent) = temp_dir();
    let (_dst_tmp, dst_parent) = temp_dir();
    let src = src_parent.join("tree");
    let dst = dst_parent.join("tree");
    std::fs::create_dir(&src).unwrap();

    std::fs::write(src.join("a.txt"), b"a").unwrap();
    std::fs::create_dir(src.join("sub")).unwrap();
    std::fs::write(src.join("sub").join("b.txt"), b"b").unwrap();

    let datim_bytes = generate_datim(&src).await;

    // Copy the tree verbatim to a different root so the recorded paths no
    // longer exist; the checker must rebase onto `dst` using the recorded
    // base-path row rather than failing outright.
    copy_tree(&src, &dst);

    let new_root = AbsAnyPath::canonicalize(&dst).unwrap().into_dir();
    let reader = DatimReader::new(datim_bytes.as_slice(), Some(new_root)).unwrap();
    let imprints: Vec<_> = reader.collect();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let config = CheckerConfig::builder().build();
    check_all(imprints, &config, move |result| {
        sink.lock().unwrap().push(result.expect("check should not error"));
        Ok(())
    })
    .await
    .unwrap();

    let results = results.lock().unwrap();
    // root dir, a.txt, sub/, sub/b.txt.
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(CheckResult::is_match), "every rebased path should match: {results:?}");
}

#[test_log::test(tokio::test)]
async fn mutated_file_is_reported_as_content_mismatch_after_rebasing() {
    let (_src_tmp, src) = temp_dir();
    std::fs::write(src.join("a.txt"), b"original").unwrap();

    let datim_bytes = generate_datim(&src).await;

    let (_dst_tmp, dst) = temp_dir();
    copy_tree(&src, &dst);
    std::fs::write(dst.join("a.txt"), b"changed").unwrap();

    let new_root = AbsAnyPath::canonicalize(&dst).unwrap().into_dir();
    let reader = DatimReader::new(datim_bytes.as_slice(), Some(new_root)).unwrap();
    let imprints: Vec<_> = reader.collect();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let config = CheckerConfig::builder().build();
    check_all(imprints, &config, move |result| {
        sink.lock().unwrap().push(result.expect("check should not error"));
        Ok(())
    })
    .await
    .unwrap();

    let results = results.lock().unwrap();
    let file_result = results
        .iter()
        .find(|r| r.path().file_name_str().as_deref() == Some("a.txt"))
        .expect("a.txt was checked");
    assert_eq!(
        file_result.mismatches(),
        &[datim::Mismatch::ContentFingerprint]
    );
}

#[test_log::test(tokio::test)]
async fn deleted_file_is_reported_missing_after_rebasing() {
    let (_src_tmp, src) = temp_dir();
    std::fs::write(src.join("a.txt"), b"a").unwrap();

    let datim_bytes = generate_datim(&src).await;

    let (_dst_tmp, dst) = temp_dir();
    copy_tree(&src, &dst);
    std::fs::remove_file(dst.join("a.txt")).unwrap();

    let new_root = AbsAnyPath::canonicalize(&dst).unwrap().into_dir();
    let reader = DatimReader::new(datim_bytes.as_slice(), Some(new_root)).unwrap();
    let imprints: Vec<_> = reader.collect();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let config = CheckerConfig::builder().build();
    check_all(imprints, &config, move |result| {
        sink.lock().unwrap().push(result.expect("check should not error"));
        Ok(())
    })
    .await
    .unwrap();

    let results = results.lock().unwrap();
    let file_result = results
        .iter()
        .find(|r| r.path().as_std_path().ends_with("a.txt"))
        .expect("a.txt was checked");
    assert!(matches!(file_result, CheckResult::Missing { .. }));
    assert!(!file_result.is_match());
}

fn copy_tree(src: &std::path::Path, dst: &std::path::Path) {
    std::fs::create_dir_all(dst).unwrap();
    for entry in walkdir(src) {
        let relative = entry.strip_prefix(src).unwrap();
        let target = dst.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target).unwrap();
        } else {
            std::fs::copy(&entry, &target).unwrap();
        }
    }
}

fn walkdir(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                out.push(path.clone());
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

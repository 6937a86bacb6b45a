use assert_cmd::cargo::cargo_bin_cmd;
use pdf_engine::fixtures;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Shelf {
    dir: TempDir,
}

impl Shelf {
    fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("temp dir should be created") }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("shelf.db")
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).expect("fixture should be written");
        path
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = cargo_bin_cmd!("readshelf")
            .arg("--db")
            .arg(self.db())
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        serde_json::from_slice(&output).expect("stdout should contain valid json")
    }

    fn upload(&self, path: &Path) -> String {
        let meta = self.json(&["upload", path.to_str().expect("utf-8 path")]);
        meta["id"].as_str().expect("id in upload output").to_owned()
    }
}

#[test]
fn upload_then_list_reports_metadata() {
    let shelf = Shelf::new();
    let pdf = shelf.write("novel.pdf", &fixtures::blank_pdf(4));

    let meta = shelf.json(&["upload", pdf.to_str().expect("utf-8 path"), "--name", "Novel"]);
    assert_eq!(meta["name"], "Novel");
    assert_eq!(meta["lastPage"], 1);
    assert!(meta["sizeLabel"].as_str().expect("size label").ends_with(" MB"));

    let listed = shelf.json(&["list"]);
    let entries = listed.as_array().expect("list prints an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], meta["id"]);
}

#[test]
fn upload_rejects_non_pdf_input() {
    let shelf = Shelf::new();
    let text = shelf.write("notes.txt", b"just some notes");

    cargo_bin_cmd!("readshelf")
        .arg("--db")
        .arg(shelf.db())
        .arg("upload")
        .arg(&text)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));

    assert_eq!(shelf.json(&["list"]), Value::Array(Vec::new()));
}

#[test]
fn upload_fails_for_missing_file() {
    let shelf = Shelf::new();

    cargo_bin_cmd!("readshelf")
        .arg("--db")
        .arg(shelf.db())
        .arg("upload")
        .arg(shelf.dir.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn read_persists_and_restores_the_page() {
    let shelf = Shelf::new();
    let id = shelf.upload(&shelf.write("book.pdf", &fixtures::blank_pdf(10)));

    let first = shelf.json(&["read", &id]);
    assert_eq!(first["page"], 1);
    assert_eq!(first["page_count"], 10);

    let moved = shelf.json(&["read", &id, "--page", "6"]);
    assert_eq!(moved["page"], 6);

    let resumed = shelf.json(&["read", &id]);
    assert_eq!(resumed["page"], 6);

    let listed = shelf.json(&["list"]);
    assert_eq!(listed[0]["lastPage"], 6);
}

#[test]
fn read_clamps_requested_page() {
    let shelf = Shelf::new();
    let id = shelf.upload(&shelf.write("short.pdf", &fixtures::blank_pdf(3)));

    let read = shelf.json(&["read", &id, "--page", "40"]);
    assert_eq!(read["page"], 3);
    assert_eq!(shelf.json(&["list"])[0]["lastPage"], 3);
}

#[test]
fn delete_removes_document() {
    let shelf = Shelf::new();
    let id = shelf.upload(&shelf.write("gone.pdf", &fixtures::blank_pdf(2)));

    cargo_bin_cmd!("readshelf")
        .arg("--db")
        .arg(shelf.db())
        .arg("delete")
        .arg(&id)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("deleted:{id}")));

    assert_eq!(shelf.json(&["list"]), Value::Array(Vec::new()));

    cargo_bin_cmd!("readshelf")
        .arg("--db")
        .arg(shelf.db())
        .arg("read")
        .arg(&id)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn render_writes_png_file() {
    let shelf = Shelf::new();
    let id =
        shelf.upload(&shelf.write("sizes.pdf", &fixtures::pdf_with_page_sizes(&[(612, 792), (200, 100)])));
    let output_path = shelf.dir.path().join("out/page-2.png");

    cargo_bin_cmd!("readshelf")
        .arg("--db")
        .arg(shelf.db())
        .arg("render")
        .arg(&id)
        .arg("--page")
        .arg("2")
        .arg("--output")
        .arg(&output_path)
        .env_remove("READSHELF_RENDER_SCALE")
        .assert()
        .success();

    let image = image::open(&output_path).expect("render should be readable image");
    assert_eq!((image.width(), image.height()), (240, 120));
}

#[test]
fn render_fails_for_page_out_of_range() {
    let shelf = Shelf::new();
    let id = shelf.upload(&shelf.write("one.pdf", &fixtures::blank_pdf(1)));

    cargo_bin_cmd!("readshelf")
        .arg("--db")
        .arg(shelf.db())
        .arg("render")
        .arg(&id)
        .arg("--page")
        .arg("5")
        .arg("--output")
        .arg(shelf.dir.path().join("never.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to render page"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("readshelf")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
